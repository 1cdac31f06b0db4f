use std::sync::Arc;

use crate::{
    codec::postings::{
        SegmentPostings,
        NO_MORE_DOCS,
    },
    error::Result,
    search::{
        bm25::Bm25Scorer,
        scorer::Scorer,
    },
};

/// Exact-phrase matcher: a conjunction over the phrase terms' postings
/// plus a lock-step position check. `phrase_freq` (occurrences of the
/// whole phrase) feeds BM25 with the field's usual length normalization.
pub struct PhraseScorer {
    /// One posting stream per phrase term with its expected offset,
    /// ordered rarest first for cheap intersection.
    postings: Vec<(SegmentPostings, u32)>,
    sim: Bm25Scorer,
    norms: Option<Arc<Vec<u8>>>,
    doc: u32,
    phrase_freq: f32,
    initialized: bool,
}

impl PhraseScorer {
    pub fn new(
        mut postings: Vec<(SegmentPostings, u32)>,
        sim: Bm25Scorer,
        norms: Option<Arc<Vec<u8>>>,
    ) -> Self {
        assert!(postings.len() >= 2, "single-term phrases rewrite to TermQuery");
        postings.sort_by_key(|(p, _)| p.cost());
        Self {
            postings,
            sim,
            norms,
            doc: NO_MORE_DOCS,
            phrase_freq: 0.0,
            initialized: false,
        }
    }

    /// Aligns all posting streams on a doc `>= candidate` and stops on the
    /// first alignment where the phrase actually occurs.
    fn settle(&mut self, mut candidate: u32) -> Result<u32> {
        'outer: loop {
            if candidate == NO_MORE_DOCS {
                self.doc = NO_MORE_DOCS;
                return Ok(NO_MORE_DOCS);
            }
            for i in 1..self.postings.len() {
                let other = self.postings[i].0.advance(candidate)?;
                if other > candidate {
                    candidate = self.postings[0].0.advance(other)?;
                    continue 'outer;
                }
            }
            let freq = self.count_phrase_matches()?;
            if freq > 0 {
                self.doc = candidate;
                self.phrase_freq = freq as f32;
                return Ok(candidate);
            }
            candidate = self.postings[0].0.next_doc()?;
        }
    }

    /// Counts positions `p` of the first stream such that every stream
    /// `i` has a position `p - offset_0 + offset_i`.
    fn count_phrase_matches(&mut self) -> Result<u32> {
        let base_offset = self.postings[0].1;
        let mut all_positions = Vec::with_capacity(self.postings.len());
        for (postings, _) in self.postings.iter_mut() {
            all_positions.push(postings.positions()?);
        }
        let mut count = 0u32;
        'candidate: for &p in &all_positions[0] {
            // Positions left of the base offset cannot start a phrase.
            if p < base_offset {
                continue;
            }
            let start = p - base_offset;
            for (i, (_, offset)) in self.postings.iter().enumerate().skip(1) {
                let want = start + offset;
                if all_positions[i].binary_search(&want).is_err() {
                    continue 'candidate;
                }
            }
            count += 1;
        }
        Ok(count)
    }
}

impl Scorer for PhraseScorer {
    fn doc_id(&self) -> u32 {
        self.doc
    }

    fn next_doc(&mut self) -> Result<u32> {
        if self.initialized && self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        self.initialized = true;
        let candidate = self.postings[0].0.next_doc()?;
        self.settle(candidate)
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        if self.initialized && self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        self.initialized = true;
        let candidate = self.postings[0].0.advance(target)?;
        self.settle(candidate)
    }

    fn cost(&self) -> u64 {
        self.postings[0].0.cost()
    }

    fn score(&mut self) -> Result<f32> {
        let norm = self
            .norms
            .as_ref()
            .map_or(0, |norms| norms[self.doc as usize]);
        Ok(self.sim.score(self.phrase_freq, norm))
    }
}
