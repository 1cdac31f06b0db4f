use std::collections::BTreeMap;

use fxhash::FxHashMap;
use store::Directory;

use crate::{
    analysis,
    codec::{
        doc_values,
        field_infos::{
            self,
            FieldInfosBuilder,
        },
        format,
        norms,
        postings::PostingsWriter,
        segment_info::{
            self,
            SegmentInfo,
        },
        stored_fields::StoredFieldsWriter,
        term_dict::{
            FieldStats,
            TermDictWriter,
        },
    },
    document::{
        DocValuesType,
        Document,
        FieldValue,
    },
    error::{
        Error,
        Result,
    },
};

/// In-memory postings for one `(field, term)`: parallel doc/freq arrays
/// plus the flattened position list, appended in doc order.
#[derive(Debug, Default)]
struct PostingList {
    docs: Vec<u32>,
    freqs: Vec<u32>,
    positions: Vec<u32>,
}

#[derive(Debug, Default)]
struct FieldBuffer {
    terms: FxHashMap<Vec<u8>, PostingList>,
    /// Norm byte per doc; zero for docs without the field.
    norms: Vec<u8>,
    /// Numeric doc-values per doc.
    values: Vec<Option<i64>>,
    docs_with_field: u32,
    last_doc_with_field: Option<u32>,
    sum_total_term_freq: u64,
}

/// The single-threaded document buffer: tokenizes incoming documents into
/// per-field term hash maps, tracks approximate RAM, and flushes itself
/// into a fresh segment through the codec.
pub struct DocumentsWriter {
    field_infos: FieldInfosBuilder,
    fields: FxHashMap<u32, FieldBuffer>,
    stored: Vec<Vec<(u32, FieldValue)>>,
    doc_count: u32,
    bytes_used: usize,
}

impl DocumentsWriter {
    pub fn new() -> Self {
        Self {
            field_infos: FieldInfosBuilder::new(),
            fields: FxHashMap::default(),
            stored: Vec::new(),
            doc_count: 0,
            bytes_used: 0,
        }
    }

    pub fn doc_count(&self) -> u32 {
        self.doc_count
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    /// Assigns the next segment-local doc-id to `doc` and inverts it into
    /// the buffer.
    pub fn add_document(&mut self, doc: &Document) -> Result<u32> {
        let doc_id = self.doc_count;
        // Positions continue across repeated instances of the same field
        // within one document.
        let mut token_counts: FxHashMap<u32, u32> = FxHashMap::default();
        let mut stored_row = Vec::new();

        for field in doc.fields() {
            let number = self.field_infos.get_or_add(&field.name, &field.field_type)?;

            if field.field_type.stored {
                stored_row.push((number, field.value.clone()));
                self.bytes_used += field_value_bytes(&field.value) + 16;
            }

            match field.field_type.doc_values {
                DocValuesType::None => {},
                DocValuesType::Numeric => {
                    let value = field.value.as_i64().ok_or_else(|| {
                        Error::InvalidArgument(format!(
                            "field \"{}\" has numeric doc-values but a non-integer value",
                            field.name
                        ))
                    })?;
                    let buffer = self.fields.entry(number).or_default();
                    if buffer.values.len() <= doc_id as usize {
                        buffer.values.resize(doc_id as usize + 1, None);
                    }
                    buffer.values[doc_id as usize] = Some(value);
                    self.bytes_used += 16;
                },
                DocValuesType::Binary | DocValuesType::Sorted => {
                    return Err(Error::IllegalState(format!(
                        "doc-values type {:?} is not supported",
                        field.field_type.doc_values
                    )));
                },
            }

            if field.field_type.indexed {
                let text = field.value.as_text().ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "indexed field \"{}\" has a non-text value",
                        field.name
                    ))
                })?;
                let base = *token_counts.get(&number).unwrap_or(&0);
                let mut count = 0u32;
                if field.field_type.tokenized {
                    for (token, position) in analysis::tokenize(text) {
                        self.add_token(number, token.as_bytes(), doc_id, base + position);
                        count += 1;
                    }
                } else {
                    self.add_token(number, text.as_bytes(), doc_id, base);
                    count = 1;
                }
                token_counts.insert(number, base + count);
            }
        }

        // One norm byte per doc for every field that saw tokens.
        for (&number, &token_count) in &token_counts {
            let info = self.field_infos.by_number(number).expect("field registered");
            if !info.has_norms() {
                continue;
            }
            let buffer = self.fields.entry(number).or_default();
            if buffer.norms.len() <= doc_id as usize {
                buffer.norms.resize(doc_id as usize + 1, 0);
            }
            buffer.norms[doc_id as usize] = norms::encode_norm(token_count);
        }

        self.stored.push(stored_row);
        self.doc_count += 1;
        Ok(doc_id)
    }

    fn add_token(&mut self, field_number: u32, term: &[u8], doc_id: u32, position: u32) {
        let buffer = self.fields.entry(field_number).or_default();
        if buffer.last_doc_with_field != Some(doc_id) {
            buffer.last_doc_with_field = Some(doc_id);
            buffer.docs_with_field += 1;
        }
        buffer.sum_total_term_freq += 1;

        if !buffer.terms.contains_key(term) {
            buffer.terms.insert(term.to_vec(), PostingList::default());
            self.bytes_used += term.len() + 48;
        }
        let posting = buffer.terms.get_mut(term).expect("inserted above");
        if posting.docs.last() == Some(&doc_id) {
            *posting.freqs.last_mut().expect("docs and freqs run parallel") += 1;
        } else {
            posting.docs.push(doc_id);
            posting.freqs.push(1);
            self.bytes_used += 8;
        }
        posting.positions.push(position);
        self.bytes_used += 4;
    }

    /// Writes the buffered docs as segment `segment_name` and resets the
    /// buffer. Returns `None` when nothing was buffered.
    pub fn flush(
        &mut self,
        directory: &dyn Directory,
        segment_name: &str,
    ) -> Result<Option<SegmentInfo>> {
        if self.doc_count == 0 {
            return Ok(None);
        }
        let result = self.flush_inner(directory, segment_name);
        self.reset();
        result.map(Some)
    }

    fn flush_inner(&mut self, directory: &dyn Directory, segment: &str) -> Result<SegmentInfo> {
        let max_doc = self.doc_count;
        let infos = self.field_infos.finish()?;
        let mut files = Vec::new();

        let indexed: Vec<u32> = infos
            .iter()
            .filter(|f| f.is_indexed())
            .map(|f| f.number)
            .collect();
        let any_positions = infos
            .iter()
            .any(|f| f.index_options.has_positions());

        if !indexed.is_empty() {
            let doc_out = directory.create_output(&format!("{segment}.doc"))?;
            files.push(format!("{segment}.doc"));
            let pos_out = if any_positions {
                files.push(format!("{segment}.pos"));
                Some(directory.create_output(&format!("{segment}.pos"))?)
            } else {
                None
            };
            let mut postings_writer = PostingsWriter::new(
                doc_out,
                pos_out,
                format::CODEC_NAME,
                format::FORMAT_VERSION_CURRENT,
            )?;

            let tim_out = directory.create_output(&format!("{segment}.tim"))?;
            files.push(format!("{segment}.tim"));
            files.push(format!("{segment}.tip"));
            let mut dict = TermDictWriter::new(tim_out)?;

            for &number in &indexed {
                let info = infos.by_number(number).expect("indexed field");
                let Some(buffer) = self.fields.get(&number) else {
                    continue;
                };
                if buffer.terms.is_empty() {
                    continue;
                }
                let options = info.index_options;
                dict.start_field(number, options.has_freqs(), options.has_positions())?;

                let mut sorted: Vec<(&Vec<u8>, &PostingList)> = buffer.terms.iter().collect();
                sorted.sort_unstable_by(|a, b| a.0.cmp(b.0));

                let mut sum_doc_freq = 0u64;
                for (term, posting) in sorted {
                    let meta = postings_writer.write_term(
                        options,
                        &posting.docs,
                        &posting.freqs,
                        &posting.positions,
                    )?;
                    sum_doc_freq += u64::from(meta.doc_freq);
                    dict.add_term(term, meta)?;
                }
                dict.finish_field(FieldStats {
                    doc_count: buffer.docs_with_field,
                    sum_total_term_freq: buffer.sum_total_term_freq,
                    sum_doc_freq,
                })?;
            }

            postings_writer.finish()?;
            dict.finish(directory, segment)?;
        }

        let norm_fields: Vec<(u32, Vec<u8>)> = infos
            .iter()
            .filter(|f| f.has_norms())
            .filter_map(|f| {
                let buffer = self.fields.get(&f.number)?;
                let mut bytes = buffer.norms.clone();
                bytes.resize(max_doc as usize, 0);
                Some((f.number, bytes))
            })
            .collect();
        if !norm_fields.is_empty() {
            norms::write_norms(directory, segment, &norm_fields)?;
            files.push(format!("{segment}.nvd"));
            files.push(format!("{segment}.nvm"));
        }

        let dv_fields: Vec<(u32, Vec<Option<i64>>)> = infos
            .iter()
            .filter(|f| f.doc_values == DocValuesType::Numeric)
            .filter_map(|f| {
                let buffer = self.fields.get(&f.number)?;
                let mut values = buffer.values.clone();
                values.resize(max_doc as usize, None);
                Some((f.number, values))
            })
            .collect();
        if !dv_fields.is_empty() {
            doc_values::write_doc_values(directory, segment, max_doc, &dv_fields)?;
            files.push(format!("{segment}.dvd"));
            files.push(format!("{segment}.dvm"));
        }

        if infos.iter().any(|f| f.stored) {
            let data = directory.create_output(&format!("{segment}.fdt"))?;
            let mut writer = StoredFieldsWriter::new(data)?;
            for row in &self.stored {
                writer.write_document(row)?;
            }
            writer.finish(directory, segment)?;
            files.push(format!("{segment}.fdt"));
            files.push(format!("{segment}.fdx"));
        }

        field_infos::write_field_infos(directory, segment, &infos)?;
        files.push(format!("{segment}.fnm"));

        let info = SegmentInfo {
            name: segment.to_string(),
            codec: format::CODEC_NAME.to_string(),
            max_doc,
            files,
            diagnostics: BTreeMap::from([
                ("source".to_string(), "flush".to_string()),
                ("max_doc".to_string(), max_doc.to_string()),
            ]),
        };
        segment_info::write_segment_info(directory, &info)?;
        Ok(info)
    }

    /// Drops all buffered state, keeping the field-number assignments.
    pub fn reset(&mut self) {
        self.fields.clear();
        self.stored.clear();
        self.doc_count = 0;
        self.bytes_used = 0;
    }

    /// Drops everything including field numbers; used by rollback.
    pub fn abort(&mut self) {
        self.reset();
        self.field_infos.clear();
    }
}

fn field_value_bytes(value: &FieldValue) -> usize {
    match value {
        FieldValue::Text(s) | FieldValue::ExactString(s) => s.len(),
        FieldValue::Int64(_) | FieldValue::Float(_) => 8,
        FieldValue::Bytes(b) => b.len(),
    }
}

#[cfg(test)]
mod tests {
    use store::FsDirectory;

    use super::*;
    use crate::{
        codec::term_dict::TermDictReader,
        document::Field,
    };

    #[test]
    fn test_flush_empty_buffer_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let mut writer = DocumentsWriter::new();
        assert!(writer.flush(&dir, "_0").unwrap().is_none());
    }

    #[test]
    fn test_flush_writes_sorted_terms_and_stats() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let mut writer = DocumentsWriter::new();
        for text in ["banana apple", "apple apple cherry", "banana"] {
            let mut doc = Document::new();
            doc.add(Field::text("content", text));
            writer.add_document(&doc).unwrap();
        }
        assert_eq!(writer.doc_count(), 3);
        assert!(writer.bytes_used() > 0);
        let info = writer.flush(&dir, "_0").unwrap().unwrap();
        assert_eq!(info.max_doc, 3);
        assert_eq!(writer.doc_count(), 0);

        let dict = TermDictReader::open(&dir, "_0").unwrap();
        let field = dict.field(0).unwrap();
        assert_eq!(field.num_terms, 3);
        assert_eq!(field.stats.doc_count, 3);
        assert_eq!(field.stats.sum_total_term_freq, 6);

        let mut terms_enum = dict.terms_enum(0).unwrap();
        let mut seen = Vec::new();
        while terms_enum.next().unwrap() {
            seen.push(String::from_utf8(terms_enum.term().to_vec()).unwrap());
        }
        assert_eq!(seen, ["apple", "banana", "cherry"]);

        assert!(terms_enum.seek_exact(b"apple").unwrap());
        assert_eq!(terms_enum.doc_freq(), 2);
        assert_eq!(terms_enum.total_term_freq(), 3);
    }

    #[test]
    fn test_repeated_field_instances_extend_positions() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let mut writer = DocumentsWriter::new();
        let mut doc = Document::new();
        doc.add(Field::text("content", "alpha beta"));
        doc.add(Field::text("content", "alpha"));
        writer.add_document(&doc).unwrap();
        writer.flush(&dir, "_0").unwrap().unwrap();

        let dict = TermDictReader::open(&dir, "_0").unwrap();
        let mut terms_enum = dict.terms_enum(0).unwrap();
        assert!(terms_enum.seek_exact(b"alpha").unwrap());
        let meta = *terms_enum.meta();
        assert_eq!(meta.total_term_freq, 2);

        let doc_in = dir.open_input("_0.doc", store::IoContext::Read).unwrap();
        let pos_in = dir.open_input("_0.pos", store::IoContext::Read).unwrap();
        let mut postings = crate::codec::postings::SegmentPostings::new(
            doc_in.as_ref(),
            Some(pos_in.as_ref()),
            crate::document::IndexOptions::DocsAndFreqsAndPositions,
            &meta,
        )
        .unwrap();
        assert_eq!(postings.next_doc().unwrap(), 0);
        // "alpha" at position 0 (first instance) and 2 (second instance,
        // offset past "beta").
        assert_eq!(postings.positions().unwrap(), vec![0, 2]);
    }

    #[test]
    fn test_mixed_field_kinds_in_one_segment() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let mut writer = DocumentsWriter::new();
        for i in 0..5i64 {
            let mut doc = Document::new();
            doc.add(Field::text("content", format!("doc number {i}")));
            doc.add(Field::string("id", format!("id-{i}")));
            doc.add(Field::numeric("rank", i * 10));
            writer.add_document(&doc).unwrap();
        }
        let info = writer.flush(&dir, "_7").unwrap().unwrap();
        for ext in ["doc", "pos", "tim", "tip", "nvd", "nvm", "dvd", "dvm", "fnm"] {
            assert!(
                info.files.contains(&format!("_7.{ext}")),
                "missing .{ext} in {:?}",
                info.files
            );
        }
        for file in &info.files {
            assert!(dir.file_exists(file), "{file} not written");
            assert!(dir.file_length(file).unwrap() > 0);
        }
    }
}
