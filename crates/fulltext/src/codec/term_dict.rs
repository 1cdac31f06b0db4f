use std::sync::Arc;

use fst::{
    Map,
    MapBuilder,
};
use fxhash::FxHashMap;
use store::{
    Directory,
    IndexInput,
    IndexOutput,
    IoContext,
};

use crate::{
    codec::{
        format::{
            self,
            BytesReader,
        },
        fst_util,
        postings::TermMeta,
    },
    error::{
        Error,
        Result,
    },
};

/// Terms per leaf block of the dictionary.
pub const TERMS_PER_BLOCK: usize = 48;

/// Result of positioning a terms enumerator at a target.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SeekStatus {
    /// The exact term exists and the enum is on it.
    Found,
    /// The enum is on the smallest term greater than the target.
    NotFound,
    /// All terms compare less than the target.
    End,
}

/// Collection-level statistics for one field, recorded with its dictionary.
#[derive(Clone, Copy, Debug, Default)]
pub struct FieldStats {
    /// Docs with at least one term in this field.
    pub doc_count: u32,
    pub sum_total_term_freq: u64,
    pub sum_doc_freq: u64,
}

/// Writes the `.tim` term blocks and the `.tip` FST index.
///
/// Fields arrive in field-number order, terms within a field in strict
/// byte order. Blocks of up to `TERMS_PER_BLOCK` terms are front-coded on
/// their shared prefix; the FST maps each block's first term to its block
/// ordinal, and a parallel offset table maps ordinals to `.tim` offsets.
pub struct TermDictWriter {
    tim_out: Box<dyn IndexOutput>,
    finished: Vec<FieldDict>,
    current: Option<FieldState>,
}

struct FieldState {
    field_number: u32,
    has_freqs: bool,
    has_positions: bool,
    pending: Vec<(Vec<u8>, TermMeta)>,
    blocks: Vec<(Vec<u8>, u64)>,
    last_term: Option<Vec<u8>>,
    num_terms: u64,
}

struct FieldDict {
    field_number: u32,
    has_freqs: bool,
    has_positions: bool,
    stats: FieldStats,
    num_terms: u64,
    blocks: Vec<(Vec<u8>, u64)>,
}

impl TermDictWriter {
    pub fn new(mut tim_out: Box<dyn IndexOutput>) -> Result<Self> {
        format::write_header(
            tim_out.as_mut(),
            format::CODEC_NAME,
            format::FORMAT_VERSION_CURRENT,
        )?;
        Ok(Self {
            tim_out,
            finished: Vec::new(),
            current: None,
        })
    }

    pub fn start_field(
        &mut self,
        field_number: u32,
        has_freqs: bool,
        has_positions: bool,
    ) -> Result<()> {
        if self.current.is_some() {
            return Err(Error::IllegalState(
                "previous field not finished before start_field".into(),
            ));
        }
        if let Some(last) = self.finished.last() {
            if last.field_number >= field_number {
                return Err(Error::IllegalState(format!(
                    "fields must arrive in increasing number order ({} then {field_number})",
                    last.field_number
                )));
            }
        }
        self.current = Some(FieldState {
            field_number,
            has_freqs,
            has_positions,
            pending: Vec::with_capacity(TERMS_PER_BLOCK),
            blocks: Vec::new(),
            last_term: None,
            num_terms: 0,
        });
        Ok(())
    }

    pub fn add_term(&mut self, term: &[u8], meta: TermMeta) -> Result<()> {
        let state = self
            .current
            .as_mut()
            .ok_or_else(|| Error::IllegalState("add_term outside a field".into()))?;
        if let Some(last) = &state.last_term {
            if last.as_slice() >= term {
                return Err(Error::IllegalState(format!(
                    "terms out of order: {:?} then {:?}",
                    String::from_utf8_lossy(last),
                    String::from_utf8_lossy(term)
                )));
            }
        }
        state.last_term = Some(term.to_vec());
        state.num_terms += 1;
        state.pending.push((term.to_vec(), meta));
        if state.pending.len() == TERMS_PER_BLOCK {
            Self::flush_block(self.tim_out.as_mut(), state)?;
        }
        Ok(())
    }

    fn flush_block(out: &mut dyn IndexOutput, state: &mut FieldState) -> Result<()> {
        if state.pending.is_empty() {
            return Ok(());
        }
        let offset = out.file_pointer();
        let first = state.pending.first().expect("non-empty block").0.clone();
        let last = &state.pending.last().expect("non-empty block").0;
        let prefix_len = common_prefix(&first, last);

        out.write_vint(state.pending.len() as u32)?;
        out.write_vint(prefix_len as u32)?;
        out.write_bytes(&first[..prefix_len])?;
        for (term, meta) in &state.pending {
            let suffix = &term[prefix_len..];
            out.write_vint(suffix.len() as u32)?;
            out.write_bytes(suffix)?;
            out.write_vlong(u64::from(meta.doc_freq))?;
            out.write_vlong(meta.total_term_freq)?;
            out.write_vlong(meta.doc_offset)?;
            if state.has_positions {
                out.write_vlong(meta.pos_offset)?;
            }
        }
        state.blocks.push((first, offset));
        state.pending.clear();
        Ok(())
    }

    pub fn finish_field(&mut self, stats: FieldStats) -> Result<()> {
        let mut state = self
            .current
            .take()
            .ok_or_else(|| Error::IllegalState("finish_field outside a field".into()))?;
        Self::flush_block(self.tim_out.as_mut(), &mut state)?;
        self.finished.push(FieldDict {
            field_number: state.field_number,
            has_freqs: state.has_freqs,
            has_positions: state.has_positions,
            stats,
            num_terms: state.num_terms,
            blocks: state.blocks,
        });
        Ok(())
    }

    /// Closes `.tim` and writes the whole `.tip` index file.
    pub fn finish(mut self, directory: &dyn Directory, segment: &str) -> Result<()> {
        if self.current.is_some() {
            return Err(Error::IllegalState("unfinished field at finish".into()));
        }
        format::write_footer(self.tim_out.as_mut())?;
        self.tim_out.close()?;

        let mut tip = directory.create_output(&format!("{segment}.tip"))?;
        format::write_header(tip.as_mut(), format::CODEC_NAME, format::FORMAT_VERSION_CURRENT)?;
        tip.write_vint(self.finished.len() as u32)?;
        for field in &self.finished {
            tip.write_vint(field.field_number)?;
            let flags = u8::from(field.has_freqs) | (u8::from(field.has_positions) << 1);
            tip.write_byte(flags)?;
            tip.write_vint(field.stats.doc_count)?;
            tip.write_vlong(field.stats.sum_total_term_freq)?;
            tip.write_vlong(field.stats.sum_doc_freq)?;
            tip.write_vlong(field.num_terms)?;

            tip.write_vint(field.blocks.len() as u32)?;
            let mut prev_offset = 0u64;
            for (_, offset) in &field.blocks {
                tip.write_vlong(offset - prev_offset)?;
                prev_offset = *offset;
            }

            let mut builder = MapBuilder::memory();
            for (ord, (first_term, _)) in field.blocks.iter().enumerate() {
                builder
                    .insert(first_term, ord as u64)
                    .map_err(|e| Error::IllegalState(format!("fst build: {e}")))?;
            }
            let fst_bytes = builder
                .into_inner()
                .map_err(|e| Error::IllegalState(format!("fst build: {e}")))?;
            tip.write_vint(fst_bytes.len() as u32)?;
            tip.write_bytes(&fst_bytes)?;
        }
        format::write_footer(tip.as_mut())?;
        tip.close()?;
        Ok(())
    }
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// One field's dictionary: block index plus collection statistics.
pub struct FieldTerms {
    pub field_number: u32,
    pub has_freqs: bool,
    pub has_positions: bool,
    pub stats: FieldStats,
    pub num_terms: u64,
    block_offsets: Vec<u64>,
    fst: Map<Vec<u8>>,
}

/// Open dictionary for one segment: `.tip` parsed up front, `.tim` read
/// on demand through cloned inputs.
pub struct TermDictReader {
    tim: Box<dyn IndexInput>,
    fields: FxHashMap<u32, Arc<FieldTerms>>,
}

impl TermDictReader {
    pub fn open(directory: &dyn Directory, segment: &str) -> Result<Self> {
        let tip_name = format!("{segment}.tip");
        let payload = format::read_checksummed_file(directory, &tip_name)?;
        let mut reader = BytesReader::new(&payload, &tip_name);
        reader.check_header(format::CODEC_NAME)?;

        let num_fields = reader.read_vint()?;
        let mut fields = FxHashMap::default();
        for _ in 0..num_fields {
            let field_number = reader.read_vint()?;
            let flags = reader.read_u8()?;
            let stats = FieldStats {
                doc_count: reader.read_vint()?,
                sum_total_term_freq: reader.read_vlong()?,
                sum_doc_freq: reader.read_vlong()?,
            };
            let num_terms = reader.read_vlong()?;

            let num_blocks = reader.read_vint()?;
            let mut block_offsets = Vec::with_capacity(num_blocks as usize);
            let mut offset = 0u64;
            for _ in 0..num_blocks {
                offset += reader.read_vlong()?;
                block_offsets.push(offset);
            }

            let fst_len = reader.read_vint()? as usize;
            let fst_bytes = reader.read_bytes(fst_len)?;
            let fst = Map::new(fst_bytes)
                .map_err(|e| Error::corrupt(format!("{tip_name}: bad fst: {e}")))?;

            fields.insert(
                field_number,
                Arc::new(FieldTerms {
                    field_number,
                    has_freqs: flags & 1 != 0,
                    has_positions: flags & 2 != 0,
                    stats,
                    num_terms,
                    block_offsets,
                    fst,
                }),
            );
        }

        let mut tim = directory.open_input(&format!("{segment}.tim"), IoContext::Read)?;
        format::check_input_header(tim.as_mut(), &format!("{segment}.tim"), format::CODEC_NAME)?;
        Ok(Self { tim, fields })
    }

    pub fn field(&self, field_number: u32) -> Option<Arc<FieldTerms>> {
        self.fields.get(&field_number).cloned()
    }

    pub fn fields(&self) -> impl Iterator<Item = &Arc<FieldTerms>> {
        self.fields.values()
    }

    /// A fresh enumerator over one field's terms, or `None` if the field
    /// has no postings in this segment.
    pub fn terms_enum(&self, field_number: u32) -> Option<SegmentTermsEnum> {
        let field = self.field(field_number)?;
        Some(SegmentTermsEnum {
            field,
            tim: self.tim.clone_input(),
            block_ord: None,
            terms: Vec::new(),
            idx: 0,
            done: false,
        })
    }
}

/// Sorted cursor over one field's terms. Seeks route through the FST;
/// iteration walks blocks sequentially.
pub struct SegmentTermsEnum {
    field: Arc<FieldTerms>,
    tim: Box<dyn IndexInput>,
    block_ord: Option<usize>,
    terms: Vec<(Vec<u8>, TermMeta)>,
    idx: usize,
    done: bool,
}

impl SegmentTermsEnum {
    pub fn field(&self) -> &Arc<FieldTerms> {
        &self.field
    }

    fn load_block(&mut self, ord: usize) -> Result<()> {
        let offset = self.field.block_offsets[ord];
        self.tim.seek(offset)?;
        let num_terms = self.tim.read_vint()? as usize;
        let prefix_len = self.tim.read_vint()? as usize;
        let mut prefix = vec![0u8; prefix_len];
        self.tim.read_bytes(&mut prefix)?;

        self.terms.clear();
        self.terms.reserve(num_terms);
        for _ in 0..num_terms {
            let suffix_len = self.tim.read_vint()? as usize;
            let mut term = Vec::with_capacity(prefix_len + suffix_len);
            term.extend_from_slice(&prefix);
            let start = term.len();
            term.resize(start + suffix_len, 0);
            self.tim.read_bytes(&mut term[start..])?;

            let doc_freq = self.tim.read_vlong()? as u32;
            let total_term_freq = self.tim.read_vlong()?;
            let doc_offset = self.tim.read_vlong()?;
            let pos_offset = if self.field.has_positions {
                self.tim.read_vlong()?
            } else {
                0
            };
            self.terms.push((
                term,
                TermMeta {
                    doc_freq,
                    total_term_freq,
                    doc_offset,
                    pos_offset,
                },
            ));
        }
        self.block_ord = Some(ord);
        self.idx = 0;
        Ok(())
    }

    /// Advances to the next term in sorted order; `false` once exhausted.
    pub fn next(&mut self) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        match self.block_ord {
            None => {
                if self.field.block_offsets.is_empty() {
                    self.done = true;
                    return Ok(false);
                }
                self.load_block(0)?;
            },
            Some(ord) => {
                if self.idx + 1 < self.terms.len() {
                    self.idx += 1;
                } else if ord + 1 < self.field.block_offsets.len() {
                    self.load_block(ord + 1)?;
                } else {
                    self.done = true;
                    return Ok(false);
                }
            },
        }
        Ok(true)
    }

    /// Positions at the smallest term `>=` target.
    pub fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus> {
        self.done = false;
        let ord = fst_util::floor_lookup(&self.field.fst, target).map(|v| v as usize);
        // Below the first block's first term: position at the very start.
        let ord = ord.unwrap_or(0);
        if self.block_ord != Some(ord) {
            if self.field.block_offsets.is_empty() {
                self.done = true;
                return Ok(SeekStatus::End);
            }
            self.load_block(ord)?;
        }
        match self
            .terms
            .binary_search_by(|(term, _)| term.as_slice().cmp(target))
        {
            Ok(i) => {
                self.idx = i;
                Ok(SeekStatus::Found)
            },
            Err(i) if i < self.terms.len() => {
                self.idx = i;
                Ok(SeekStatus::NotFound)
            },
            Err(_) => {
                // Target sorts after this block's last term; the ceiling,
                // if any, is the next block's first term.
                if ord + 1 < self.field.block_offsets.len() {
                    self.load_block(ord + 1)?;
                    Ok(SeekStatus::NotFound)
                } else {
                    self.done = true;
                    Ok(SeekStatus::End)
                }
            },
        }
    }

    pub fn seek_exact(&mut self, target: &[u8]) -> Result<bool> {
        Ok(self.seek_ceil(target)? == SeekStatus::Found)
    }

    /// Current term bytes. Only valid while positioned.
    pub fn term(&self) -> &[u8] {
        debug_assert!(!self.done && self.block_ord.is_some());
        &self.terms[self.idx].0
    }

    pub fn meta(&self) -> &TermMeta {
        debug_assert!(!self.done && self.block_ord.is_some());
        &self.terms[self.idx].1
    }

    pub fn doc_freq(&self) -> u32 {
        self.meta().doc_freq
    }

    pub fn total_term_freq(&self) -> u64 {
        self.meta().total_term_freq
    }
}

#[cfg(test)]
mod tests {
    use store::FsDirectory;

    use super::*;

    fn meta_for(i: u64) -> TermMeta {
        TermMeta {
            doc_freq: (i as u32 % 97) + 1,
            total_term_freq: i + 100,
            doc_offset: i * 13,
            pos_offset: i * 29,
        }
    }

    /// Writes one field with `terms`, returns an open reader.
    fn write_dict(directory: &dyn Directory, terms: &[Vec<u8>]) -> TermDictReader {
        let tim_out = directory.create_output("_0.tim").unwrap();
        let mut writer = TermDictWriter::new(tim_out).unwrap();
        writer.start_field(0, true, true).unwrap();
        for (i, term) in terms.iter().enumerate() {
            writer.add_term(term, meta_for(i as u64)).unwrap();
        }
        writer
            .finish_field(FieldStats {
                doc_count: 10,
                sum_total_term_freq: 1000,
                sum_doc_freq: 500,
            })
            .unwrap();
        writer.finish(directory, "_0").unwrap();
        TermDictReader::open(directory, "_0").unwrap()
    }

    fn term_list(n: usize) -> Vec<Vec<u8>> {
        // Shared prefixes so front-coding and multi-block paths both run.
        let mut terms: Vec<Vec<u8>> = (0..n)
            .map(|i| format!("term{:05}", i * 3).into_bytes())
            .collect();
        terms.sort();
        terms
    }

    #[test]
    fn test_full_iteration_is_sorted_and_complete() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let terms = term_list(200);
        let reader = write_dict(&dir, &terms);

        let field = reader.field(0).unwrap();
        assert_eq!(field.num_terms, 200);
        assert_eq!(field.stats.doc_count, 10);

        let mut terms_enum = reader.terms_enum(0).unwrap();
        let mut seen = Vec::new();
        while terms_enum.next().unwrap() {
            seen.push(terms_enum.term().to_vec());
        }
        assert_eq!(seen, terms);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_seek_exact_finds_every_term_with_meta() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let terms = term_list(150);
        let reader = write_dict(&dir, &terms);
        let mut terms_enum = reader.terms_enum(0).unwrap();
        for (i, term) in terms.iter().enumerate() {
            assert!(terms_enum.seek_exact(term).unwrap(), "term #{i}");
            assert_eq!(terms_enum.meta(), &meta_for(i as u64));
        }
        assert!(!terms_enum.seek_exact(b"zzzz").unwrap());
        assert!(!terms_enum.seek_exact(b"").unwrap());
    }

    #[test]
    fn test_seek_ceil_contract() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let terms = term_list(100);
        let reader = write_dict(&dir, &terms);
        let mut terms_enum = reader.terms_enum(0).unwrap();

        // Exact hit.
        assert_eq!(
            terms_enum.seek_ceil(&terms[57]).unwrap(),
            SeekStatus::Found
        );
        assert_eq!(terms_enum.term(), terms[57].as_slice());

        // Between two terms: lands on the next one, across the whole range
        // including block boundaries.
        for i in 0..terms.len() - 1 {
            let mut probe = terms[i].clone();
            probe.push(0);
            assert_eq!(
                terms_enum.seek_ceil(&probe).unwrap(),
                SeekStatus::NotFound,
                "probe after #{i}"
            );
            assert_eq!(terms_enum.term(), terms[i + 1].as_slice(), "probe after #{i}");
        }

        // Before everything.
        assert_eq!(terms_enum.seek_ceil(b"a").unwrap(), SeekStatus::NotFound);
        assert_eq!(terms_enum.term(), terms[0].as_slice());

        // Past everything.
        assert_eq!(terms_enum.seek_ceil(b"zzz").unwrap(), SeekStatus::End);
    }

    #[test]
    fn test_seek_then_next_crosses_block_boundary() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let terms = term_list(3 * TERMS_PER_BLOCK);
        let reader = write_dict(&dir, &terms);
        let mut terms_enum = reader.terms_enum(0).unwrap();

        // Position on the last term of the first block, then iterate into
        // the second block.
        let last_of_first = &terms[TERMS_PER_BLOCK - 1];
        assert_eq!(
            terms_enum.seek_ceil(last_of_first).unwrap(),
            SeekStatus::Found
        );
        assert!(terms_enum.next().unwrap());
        assert_eq!(terms_enum.term(), terms[TERMS_PER_BLOCK].as_slice());
    }

    #[test]
    fn test_missing_field_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let terms = term_list(10);
        let reader = write_dict(&dir, &terms);
        assert!(reader.terms_enum(7).is_none());
    }
}
