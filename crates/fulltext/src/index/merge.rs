use std::{
    collections::BTreeMap,
    sync::Arc,
};

use store::Directory;

use crate::{
    codec::{
        doc_values,
        field_infos::{
            self,
            FieldInfosBuilder,
        },
        format,
        norms,
        postings::{
            PostingsWriter,
            NO_MORE_DOCS,
        },
        segment_info::{
            self,
            SegmentInfo,
        },
        stored_fields::StoredFieldsWriter,
        term_dict::{
            FieldStats,
            SegmentTermsEnum,
            TermDictWriter,
        },
    },
    document::{
        DocValuesType,
        FieldType,
    },
    error::{
        Error,
        Result,
    },
    index::segment_reader::SegmentReader,
    util::bitset::FixedBitSet,
};

/// Merges `readers` into a single new segment named `segment_name`,
/// remapping doc-ids densely over deleted docs and preserving term order.
pub fn merge_segments(
    directory: &Arc<dyn Directory>,
    readers: &[Arc<SegmentReader>],
    segment_name: &str,
) -> Result<SegmentInfo> {
    // Dense doc-id remap: per source, old local id -> merged id.
    let mut doc_maps: Vec<Vec<Option<u32>>> = Vec::with_capacity(readers.len());
    let mut merged_max_doc = 0u32;
    for reader in readers {
        let mut map = Vec::with_capacity(reader.max_doc() as usize);
        for doc in 0..reader.max_doc() {
            if reader.is_live(doc) {
                map.push(Some(merged_max_doc));
                merged_max_doc += 1;
            } else {
                map.push(None);
            }
        }
        doc_maps.push(map);
    }

    // Merged schema: field numbers reassigned on first appearance, names
    // must agree on their options across sources.
    let mut builder = FieldInfosBuilder::new();
    for reader in readers {
        for field in reader.field_infos().iter() {
            let field_type = FieldType {
                indexed: field.is_indexed(),
                tokenized: field.tokenized,
                stored: field.stored,
                index_options: field.index_options,
                omit_norms: field.omit_norms,
                doc_values: field.doc_values,
            };
            builder.get_or_add(&field.name, &field_type)?;
        }
    }
    let infos = builder.finish()?;
    let mut files = Vec::new();

    let indexed: Vec<_> = infos
        .iter()
        .filter(|f| f.is_indexed())
        .cloned()
        .collect();
    let any_positions = indexed.iter().any(|f| f.index_options.has_positions());

    if !indexed.is_empty() {
        let doc_out = directory.create_output(&format!("{segment_name}.doc"))?;
        files.push(format!("{segment_name}.doc"));
        let pos_out = if any_positions {
            files.push(format!("{segment_name}.pos"));
            Some(directory.create_output(&format!("{segment_name}.pos"))?)
        } else {
            None
        };
        let mut postings_writer = PostingsWriter::new(
            doc_out,
            pos_out,
            format::CODEC_NAME,
            format::FORMAT_VERSION_CURRENT,
        )?;
        let tim_out = directory.create_output(&format!("{segment_name}.tim"))?;
        files.push(format!("{segment_name}.tim"));
        files.push(format!("{segment_name}.tip"));
        let mut dict = TermDictWriter::new(tim_out)?;

        for field in &indexed {
            let options = field.index_options;
            // One enum per source that has this field, primed on its first
            // term; merged in sorted order, sources in segment order.
            let mut sources: Vec<(usize, SegmentTermsEnum)> = Vec::new();
            for (src, reader) in readers.iter().enumerate() {
                if let Some(mut terms_enum) = reader.terms_enum(&field.name) {
                    if terms_enum.next()? {
                        sources.push((src, terms_enum));
                    }
                }
            }
            if sources.is_empty() {
                continue;
            }
            dict.start_field(field.number, options.has_freqs(), options.has_positions())?;

            let mut docs_with_field = FixedBitSet::new_all_clear(merged_max_doc);
            let mut sum_total_term_freq = 0u64;
            let mut sum_doc_freq = 0u64;
            while !sources.is_empty() {
                let min_term: Vec<u8> = sources
                    .iter()
                    .map(|(_, e)| e.term())
                    .min()
                    .expect("non-empty sources")
                    .to_vec();

                let mut docs = Vec::new();
                let mut freqs = Vec::new();
                let mut positions = Vec::new();
                for (src, terms_enum) in sources.iter_mut() {
                    if terms_enum.term() != min_term.as_slice() {
                        continue;
                    }
                    let reader = &readers[*src];
                    let source_field = reader
                        .field_infos()
                        .by_name(&field.name)
                        .expect("field exists in source");
                    let mut postings = reader.postings(source_field, terms_enum.meta())?;
                    loop {
                        let doc = postings.next_doc()?;
                        if doc == NO_MORE_DOCS {
                            break;
                        }
                        let Some(new_doc) = doc_maps[*src][doc as usize] else {
                            continue;
                        };
                        docs.push(new_doc);
                        let freq = postings.freq();
                        freqs.push(freq);
                        if options.has_positions() {
                            positions.extend(postings.positions()?);
                        }
                        docs_with_field.set(new_doc);
                        if options.has_freqs() {
                            sum_total_term_freq += u64::from(freq);
                        } else {
                            sum_total_term_freq += 1;
                        }
                    }
                }

                if !docs.is_empty() {
                    let meta = postings_writer.write_term(options, &docs, &freqs, &positions)?;
                    sum_doc_freq += u64::from(meta.doc_freq);
                    dict.add_term(&min_term, meta)?;
                }

                // Advance every source positioned on the merged term.
                let mut i = 0;
                while i < sources.len() {
                    if sources[i].1.term() == min_term.as_slice() {
                        if sources[i].1.next()? {
                            i += 1;
                        } else {
                            sources.remove(i);
                        }
                    } else {
                        i += 1;
                    }
                }
            }
            dict.finish_field(FieldStats {
                doc_count: docs_with_field.count_ones(),
                sum_total_term_freq,
                sum_doc_freq,
            })?;
        }
        postings_writer.finish()?;
        dict.finish(directory.as_ref(), segment_name)?;
    }

    // Norms: concatenate live docs' bytes in remapped order.
    let mut norm_fields = Vec::new();
    for field in infos.iter().filter(|f| f.has_norms()) {
        let mut merged = vec![0u8; merged_max_doc as usize];
        let mut any = false;
        for (src, reader) in readers.iter().enumerate() {
            let Some(source_norms) = reader.norms(&field.name)? else {
                continue;
            };
            any = true;
            for (old_doc, new_doc) in doc_maps[src].iter().enumerate() {
                if let Some(new_doc) = new_doc {
                    merged[*new_doc as usize] = source_norms[old_doc];
                }
            }
        }
        if any {
            norm_fields.push((field.number, merged));
        }
    }
    if !norm_fields.is_empty() {
        norms::write_norms(directory.as_ref(), segment_name, &norm_fields)?;
        files.push(format!("{segment_name}.nvd"));
        files.push(format!("{segment_name}.nvm"));
    }

    // Numeric doc-values.
    let mut dv_fields = Vec::new();
    for field in infos.iter().filter(|f| f.doc_values == DocValuesType::Numeric) {
        let mut merged: Vec<Option<i64>> = vec![None; merged_max_doc as usize];
        let mut any = false;
        for (src, reader) in readers.iter().enumerate() {
            let Some(dv) = reader.numeric_doc_values(&field.name)? else {
                continue;
            };
            any = true;
            for (old_doc, new_doc) in doc_maps[src].iter().enumerate() {
                if let Some(new_doc) = new_doc {
                    merged[*new_doc as usize] = dv.get(old_doc as u32);
                }
            }
        }
        if any {
            dv_fields.push((field.number, merged));
        }
    }
    if !dv_fields.is_empty() {
        doc_values::write_doc_values(directory.as_ref(), segment_name, merged_max_doc, &dv_fields)?;
        files.push(format!("{segment_name}.dvd"));
        files.push(format!("{segment_name}.dvm"));
    }

    // Stored fields, re-numbered into the merged schema.
    if infos.iter().any(|f| f.stored) {
        let data = directory.create_output(&format!("{segment_name}.fdt"))?;
        let mut writer = StoredFieldsWriter::new(data)?;
        for (src, reader) in readers.iter().enumerate() {
            for (old_doc, new_doc) in doc_maps[src].iter().enumerate() {
                if new_doc.is_none() {
                    continue;
                }
                let stored = reader.document(old_doc as u32)?;
                let mut row = Vec::with_capacity(stored.fields.len());
                for (name, value) in stored.fields {
                    let number = infos
                        .by_name(&name)
                        .ok_or_else(|| {
                            Error::corrupt(format!("stored field \"{name}\" missing from schema"))
                        })?
                        .number;
                    row.push((number, value));
                }
                writer.write_document(&row)?;
            }
        }
        writer.finish(directory.as_ref(), segment_name)?;
        files.push(format!("{segment_name}.fdt"));
        files.push(format!("{segment_name}.fdx"));
    }

    field_infos::write_field_infos(directory.as_ref(), segment_name, &infos)?;
    files.push(format!("{segment_name}.fnm"));

    let info = SegmentInfo {
        name: segment_name.to_string(),
        codec: format::CODEC_NAME.to_string(),
        max_doc: merged_max_doc,
        files,
        diagnostics: BTreeMap::from([
            ("source".to_string(), "merge".to_string()),
            ("max_doc".to_string(), merged_max_doc.to_string()),
        ]),
    };
    segment_info::write_segment_info(directory.as_ref(), &info)?;
    Ok(info)
}
