use std::sync::Arc;

use crate::{
    codec::postings::SegmentPostings,
    error::Result,
    search::{
        bm25::{
            self,
            Bm25Scorer,
        },
        scorer::Scorer,
    },
};

/// BM25-scored iterator over one term's postings in one segment.
pub struct TermScorer {
    postings: SegmentPostings,
    sim: Bm25Scorer,
    norms: Option<Arc<Vec<u8>>>,
    /// Saturation bound from the term's highest conceivable freq in this
    /// segment; refined per block by the stored skip metadata.
    term_bound: f32,
}

impl TermScorer {
    pub fn new(
        postings: SegmentPostings,
        sim: Bm25Scorer,
        norms: Option<Arc<Vec<u8>>>,
        total_term_freq: u64,
    ) -> Self {
        let max_freq = u32::try_from(total_term_freq).unwrap_or(u32::MAX);
        Self {
            postings,
            sim,
            norms,
            term_bound: bm25::term_saturation_bound(max_freq),
        }
    }

    pub fn freq(&self) -> u32 {
        self.postings.freq()
    }
}

impl Scorer for TermScorer {
    fn doc_id(&self) -> u32 {
        self.postings.doc_id()
    }

    fn next_doc(&mut self) -> Result<u32> {
        Ok(self.postings.next_doc()?)
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        Ok(self.postings.advance(target)?)
    }

    fn cost(&self) -> u64 {
        self.postings.cost()
    }

    fn score(&mut self) -> Result<f32> {
        let freq = self.postings.freq() as f32;
        let doc = self.postings.doc_id();
        let norm = self
            .norms
            .as_ref()
            .map_or(0, |norms| norms[doc as usize]);
        Ok(self.sim.score(freq, norm))
    }

    fn max_score(&mut self, upto: u32) -> f32 {
        // The stored block max only covers up to the block boundary; past
        // it, fall back to the term-wide bound.
        if upto <= self.postings.block_max_doc_id() {
            self.sim
                .max_score(self.postings.block_max_score().min(self.term_bound))
        } else {
            self.sim.max_score(self.term_bound)
        }
    }

    fn block_max_doc(&self) -> u32 {
        self.postings.block_max_doc_id()
    }
}
