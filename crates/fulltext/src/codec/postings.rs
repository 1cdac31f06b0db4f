use store::{
    IndexInput,
    IndexOutput,
};

use crate::{
    codec::for_util::{
        self,
        BLOCK_SIZE,
    },
    document::IndexOptions,
    error::{
        Error,
        Result,
    },
    search::bm25,
};

/// Sentinel returned by posting iterators once exhausted.
pub const NO_MORE_DOCS: u32 = u32::MAX;

/// Where a term's postings live, recorded in the term dictionary.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TermMeta {
    pub doc_freq: u32,
    pub total_term_freq: u64,
    /// Absolute offset of the term's first block in `.doc`.
    pub doc_offset: u64,
    /// Absolute offset of the term's first position byte in `.pos`;
    /// 0 when the field carries no positions.
    pub pos_offset: u64,
}

/// Streams per-term postings into the `.doc` / `.pos` pair.
///
/// Layout per term: a sequence of blocks, each preceded by a skip entry
/// `(vint last_doc, f32 block_max_score, vlong pos_offset?)`. Blocks of
/// exactly `BLOCK_SIZE` docs are bit-packed (deltas, then freqs); the final
/// short block is vint-coded. The stored block max is the BM25
/// frequency-saturation bound for the block's largest freq, which stays an
/// upper bound under any collection-average length.
pub struct PostingsWriter {
    doc_out: Box<dyn IndexOutput>,
    pos_out: Option<Box<dyn IndexOutput>>,
}

impl PostingsWriter {
    pub fn new(
        mut doc_out: Box<dyn IndexOutput>,
        mut pos_out: Option<Box<dyn IndexOutput>>,
        codec: &str,
        version: u32,
    ) -> Result<Self> {
        super::format::write_header(doc_out.as_mut(), codec, version)?;
        if let Some(out) = pos_out.as_mut() {
            super::format::write_header(out.as_mut(), codec, version)?;
        }
        Ok(Self { doc_out, pos_out })
    }

    /// Writes one term's postings. `docs` must be strictly increasing;
    /// `freqs` runs parallel to `docs`; `positions` is the concatenation of
    /// each doc's position list (lengths given by `freqs`).
    pub fn write_term(
        &mut self,
        options: IndexOptions,
        docs: &[u32],
        freqs: &[u32],
        positions: &[u32],
    ) -> Result<TermMeta> {
        debug_assert!(docs.windows(2).all(|w| w[0] < w[1]));
        debug_assert_eq!(docs.len(), freqs.len());

        let has_freqs = options.has_freqs();
        let has_positions = options.has_positions();
        let doc_offset = self.doc_out.file_pointer();
        let term_pos_offset = match (&self.pos_out, has_positions) {
            (Some(out), true) => out.file_pointer(),
            _ => 0,
        };

        let mut prev_doc = 0u32;
        let mut pos_cursor = 0usize;
        let mut start = 0usize;
        while start < docs.len() {
            let block_len = BLOCK_SIZE.min(docs.len() - start);
            let block_docs = &docs[start..start + block_len];
            let block_freqs = &freqs[start..start + block_len];
            let last_doc = block_docs[block_len - 1];
            let max_freq = if has_freqs {
                *block_freqs.iter().max().expect("non-empty block")
            } else {
                1
            };

            self.doc_out.write_vint(last_doc)?;
            self.doc_out
                .write_f32(bm25::term_saturation_bound(max_freq))?;
            if has_positions {
                let out = self
                    .pos_out
                    .as_ref()
                    .ok_or_else(|| Error::IllegalState("positions without .pos output".into()))?;
                self.doc_out.write_vlong(out.file_pointer())?;
            }

            if block_len == BLOCK_SIZE {
                let mut deltas = [0u32; BLOCK_SIZE];
                for (i, &doc) in block_docs.iter().enumerate() {
                    deltas[i] = doc - prev_doc;
                    prev_doc = doc;
                }
                for_util::write_block(self.doc_out.as_mut(), &deltas)?;
                if has_freqs {
                    let mut packed = [0u32; BLOCK_SIZE];
                    packed[..block_len].copy_from_slice(block_freqs);
                    for_util::write_block(self.doc_out.as_mut(), &packed)?;
                }
            } else {
                for (i, &doc) in block_docs.iter().enumerate() {
                    self.doc_out.write_vint(doc - prev_doc)?;
                    prev_doc = doc;
                    if has_freqs {
                        self.doc_out.write_vint(block_freqs[i])?;
                    }
                }
            }

            if has_positions {
                let out = self.pos_out.as_mut().expect("checked above");
                for &freq in block_freqs {
                    let doc_positions = &positions[pos_cursor..pos_cursor + freq as usize];
                    let mut prev_pos = 0u32;
                    for &pos in doc_positions {
                        out.write_vint(pos - prev_pos)?;
                        prev_pos = pos;
                    }
                    pos_cursor += freq as usize;
                }
            }

            start += block_len;
        }

        let total_term_freq = if has_freqs {
            freqs.iter().map(|&f| u64::from(f)).sum()
        } else {
            docs.len() as u64
        };
        Ok(TermMeta {
            doc_freq: docs.len() as u32,
            total_term_freq,
            doc_offset,
            pos_offset: term_pos_offset,
        })
    }

    /// Writes footers and closes both outputs.
    pub fn finish(mut self) -> Result<()> {
        super::format::write_footer(self.doc_out.as_mut())?;
        self.doc_out.close()?;
        if let Some(mut out) = self.pos_out.take() {
            super::format::write_footer(out.as_mut())?;
            out.close()?;
        }
        Ok(())
    }
}

/// Pull iterator over one term's postings, with block-max skip support.
pub struct SegmentPostings {
    doc_in: Box<dyn IndexInput>,
    pos_in: Option<Box<dyn IndexInput>>,
    has_freqs: bool,
    has_positions: bool,
    doc_freq: u32,

    /// Docs consumed from the stream, decoded or skipped.
    docs_read: u32,
    /// Delta base for the next block: last doc of the previous block.
    delta_base: u32,

    buf_docs: [u32; BLOCK_SIZE],
    buf_freqs: [u32; BLOCK_SIZE],
    buf_len: usize,
    idx: usize,
    exhausted: bool,
    positioned: bool,

    block_last_doc: u32,
    block_max_score: f32,
    block_pos_offset: u64,

    /// Offset the position stream is currently aligned to, and how many
    /// position vints were consumed since.
    pos_seeked_offset: u64,
    pos_consumed: u32,
    /// Positions left to deliver for the current doc via `next_position`.
    pending_positions: u32,
    last_position: u32,
}

struct BlockHeader {
    block_len: usize,
    is_full: bool,
}

impl SegmentPostings {
    /// `doc_in` must be an input over `.doc` (a clone is taken internally
    /// positioned at the term start); `pos_in` likewise for `.pos`.
    pub fn new(
        doc_in: &dyn IndexInput,
        pos_in: Option<&dyn IndexInput>,
        options: IndexOptions,
        meta: &TermMeta,
    ) -> Result<Self> {
        let mut doc_in = doc_in.clone_input();
        doc_in.seek(meta.doc_offset)?;
        let pos_in = match (pos_in, options.has_positions()) {
            (Some(input), true) => {
                let mut input = input.clone_input();
                input.seek(meta.pos_offset)?;
                Some(input)
            },
            _ => None,
        };
        Ok(Self {
            doc_in,
            pos_in,
            has_freqs: options.has_freqs(),
            has_positions: options.has_positions(),
            doc_freq: meta.doc_freq,
            docs_read: 0,
            delta_base: 0,
            buf_docs: [0; BLOCK_SIZE],
            buf_freqs: [1; BLOCK_SIZE],
            buf_len: 0,
            idx: 0,
            exhausted: false,
            positioned: false,
            block_last_doc: 0,
            block_max_score: f32::INFINITY,
            block_pos_offset: 0,
            pos_seeked_offset: u64::MAX,
            pos_consumed: 0,
            pending_positions: 0,
            last_position: 0,
        })
    }

    /// Current doc, or `NO_MORE_DOCS` when exhausted or not yet
    /// positioned; drive with `next_doc`/`advance` first.
    pub fn doc_id(&self) -> u32 {
        if self.positioned && !self.exhausted {
            self.buf_docs[self.idx]
        } else {
            NO_MORE_DOCS
        }
    }

    pub fn freq(&self) -> u32 {
        debug_assert!(self.positioned && !self.exhausted);
        self.buf_freqs[self.idx]
    }

    pub fn cost(&self) -> u64 {
        u64::from(self.doc_freq)
    }

    /// Last doc-id covered by the current skip block.
    pub fn block_max_doc_id(&self) -> u32 {
        if self.exhausted {
            NO_MORE_DOCS
        } else {
            self.block_last_doc
        }
    }

    /// Upper bound on the BM25 frequency contribution within the current
    /// skip block.
    pub fn block_max_score(&self) -> f32 {
        self.block_max_score
    }

    fn begin_block(&mut self) -> Result<Option<BlockHeader>> {
        let remaining = self.doc_freq - self.docs_read;
        if remaining == 0 {
            return Ok(None);
        }
        self.block_last_doc = self.doc_in.read_vint()?;
        self.block_max_score = self.doc_in.read_f32()?;
        if self.has_positions {
            self.block_pos_offset = self.doc_in.read_vlong()?;
        }
        let block_len = BLOCK_SIZE.min(remaining as usize);
        Ok(Some(BlockHeader {
            block_len,
            is_full: block_len == BLOCK_SIZE,
        }))
    }

    fn decode_block(&mut self, header: &BlockHeader) -> Result<()> {
        if header.is_full {
            let mut deltas = [0u32; BLOCK_SIZE];
            for_util::read_block(self.doc_in.as_mut(), &mut deltas)?;
            let mut doc = self.delta_base;
            for (i, &delta) in deltas.iter().enumerate() {
                doc += delta;
                self.buf_docs[i] = doc;
            }
            if self.has_freqs {
                for_util::read_block(self.doc_in.as_mut(), &mut self.buf_freqs)?;
            } else {
                self.buf_freqs.fill(1);
            }
        } else {
            let mut doc = self.delta_base;
            for i in 0..header.block_len {
                doc += self.doc_in.read_vint()?;
                self.buf_docs[i] = doc;
                self.buf_freqs[i] = if self.has_freqs {
                    self.doc_in.read_vint()?
                } else {
                    1
                };
            }
        }
        self.buf_len = header.block_len;
        self.idx = 0;
        self.docs_read += header.block_len as u32;
        self.delta_base = self.block_last_doc;
        let decoded_last = self.buf_docs[header.block_len - 1];
        if decoded_last != self.block_last_doc {
            return Err(Error::corrupt(format!(
                "postings block last doc {decoded_last} does not match skip entry {}",
                self.block_last_doc
            )));
        }
        Ok(())
    }

    fn skip_block(&mut self, header: &BlockHeader) -> Result<()> {
        debug_assert!(header.is_full);
        for_util::skip_block(self.doc_in.as_mut())?;
        if self.has_freqs {
            for_util::skip_block(self.doc_in.as_mut())?;
        }
        self.buf_len = 0;
        self.docs_read += header.block_len as u32;
        self.delta_base = self.block_last_doc;
        Ok(())
    }

    fn set_exhausted(&mut self) {
        self.exhausted = true;
        self.positioned = true;
        self.block_max_score = 0.0;
    }

    fn on_doc_changed(&mut self) {
        self.pending_positions = 0;
    }

    pub fn next_doc(&mut self) -> Result<u32> {
        if self.exhausted {
            return Ok(NO_MORE_DOCS);
        }
        if self.positioned && self.idx + 1 < self.buf_len {
            self.idx += 1;
        } else {
            match self.begin_block()? {
                Some(header) => self.decode_block(&header)?,
                None => {
                    self.set_exhausted();
                    return Ok(NO_MORE_DOCS);
                },
            }
        }
        self.positioned = true;
        self.on_doc_changed();
        Ok(self.buf_docs[self.idx])
    }

    /// Skips to the first doc-id `>= target`, using skip entries to jump
    /// whole blocks without decoding them.
    pub fn advance(&mut self, target: u32) -> Result<u32> {
        if self.exhausted {
            return Ok(NO_MORE_DOCS);
        }
        if self.positioned && self.buf_len > 0 && self.buf_docs[self.idx] >= target {
            return Ok(self.buf_docs[self.idx]);
        }
        // Scan within the current block if the target lies inside it.
        if self.positioned && self.buf_len > 0 && target <= self.block_last_doc {
            while self.buf_docs[self.idx] < target {
                self.idx += 1;
                debug_assert!(self.idx < self.buf_len);
            }
            self.on_doc_changed();
            return Ok(self.buf_docs[self.idx]);
        }
        loop {
            let Some(header) = self.begin_block()? else {
                self.set_exhausted();
                return Ok(NO_MORE_DOCS);
            };
            if header.is_full && target > self.block_last_doc {
                self.skip_block(&header)?;
                continue;
            }
            self.decode_block(&header)?;
            while self.idx < self.buf_len && self.buf_docs[self.idx] < target {
                self.idx += 1;
            }
            if self.idx < self.buf_len {
                self.positioned = true;
                self.on_doc_changed();
                return Ok(self.buf_docs[self.idx]);
            }
            // Tail exhausted below target.
            debug_assert_eq!(self.docs_read, self.doc_freq);
            self.set_exhausted();
            return Ok(NO_MORE_DOCS);
        }
    }

    /// Next position of the current doc; callable `freq()` times per doc.
    pub fn next_position(&mut self) -> Result<u32> {
        if !self.has_positions {
            return Err(Error::IllegalState(
                "positions were not indexed for this field".into(),
            ));
        }
        if self.pending_positions == 0 {
            self.align_positions()?;
        }
        let pos_in = self.pos_in.as_mut().expect("has_positions implies pos_in");
        let delta = pos_in.read_vint()?;
        self.pos_consumed += 1;
        self.pending_positions -= 1;
        self.last_position += delta;
        Ok(self.last_position)
    }

    /// All positions of the current doc.
    pub fn positions(&mut self) -> Result<Vec<u32>> {
        let freq = self.freq();
        let mut out = Vec::with_capacity(freq as usize);
        for _ in 0..freq {
            out.push(self.next_position()?);
        }
        Ok(out)
    }

    /// Seeks the position stream to the current doc's first position,
    /// skipping over earlier docs' positions in this block.
    fn align_positions(&mut self) -> Result<()> {
        debug_assert!(self.positioned && !self.exhausted);
        let needed_before: u32 = self.buf_freqs[..self.idx].iter().sum();
        let pos_in = self.pos_in.as_mut().expect("has_positions implies pos_in");
        if self.pos_seeked_offset != self.block_pos_offset || self.pos_consumed > needed_before {
            pos_in.seek(self.block_pos_offset)?;
            self.pos_seeked_offset = self.block_pos_offset;
            self.pos_consumed = 0;
        }
        while self.pos_consumed < needed_before {
            pos_in.read_vint()?;
            self.pos_consumed += 1;
        }
        self.pending_positions = self.buf_freqs[self.idx];
        self.last_position = 0;
        Ok(())
    }
}
