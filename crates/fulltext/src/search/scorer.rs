use crate::{
    codec::postings::NO_MORE_DOCS,
    error::Result,
};

/// How results will be consumed, which controls what evaluation may skip.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ScoreMode {
    /// Visit and score every match.
    Complete,
    /// Only the top of the ranking matters; scorers may prune
    /// non-competitive documents.
    #[default]
    TopScores,
    /// Matches are counted, never scored.
    CountOnly,
}

/// A per-segment match iterator that can score the current doc.
///
/// Scorers start unpositioned; drive them with `next_doc`/`advance` and
/// stop at `NO_MORE_DOCS`. A scorer must never be shared across threads.
pub trait Scorer {
    fn doc_id(&self) -> u32;

    fn next_doc(&mut self) -> Result<u32>;

    /// First match `>= target`.
    fn advance(&mut self, target: u32) -> Result<u32>;

    /// Upper bound on matches, used to pick conjunction leads.
    fn cost(&self) -> u64;

    fn score(&mut self) -> Result<f32>;

    /// Upper bound on `score()` for any doc in `[doc_id(), upto]`.
    /// `f32::INFINITY` (the default) disables pruning for this scorer.
    fn max_score(&mut self, _upto: u32) -> f32 {
        f32::INFINITY
    }

    /// Last doc covered by the current block-max region, if the scorer
    /// tracks one.
    fn block_max_doc(&self) -> u32 {
        NO_MORE_DOCS
    }

    /// The collector's current top-K floor; scorers that can prune use it.
    fn set_min_competitive_score(&mut self, _score: f32) {}
}

/// Intersection of several scorers. Only children flagged as scoring
/// contribute to `score()`; the rest (FILTER clauses) gate matching.
pub struct ConjunctionScorer {
    /// Lead (fewest docs) first.
    children: Vec<(Box<dyn Scorer>, bool)>,
    doc: u32,
    initialized: bool,
}

impl ConjunctionScorer {
    /// `children` are `(scorer, contributes_to_score)`.
    pub fn new(mut children: Vec<(Box<dyn Scorer>, bool)>) -> Self {
        assert!(!children.is_empty());
        children.sort_by_key(|(scorer, _)| scorer.cost());
        Self {
            children,
            doc: NO_MORE_DOCS,
            initialized: false,
        }
    }

    /// Aligns every child on the same doc `>= candidate`.
    fn align(&mut self, mut candidate: u32) -> Result<u32> {
        'outer: loop {
            if candidate == NO_MORE_DOCS {
                self.doc = NO_MORE_DOCS;
                return Ok(NO_MORE_DOCS);
            }
            for i in 1..self.children.len() {
                let other = self.children[i].0.advance(candidate)?;
                if other > candidate {
                    candidate = self.children[0].0.advance(other)?;
                    continue 'outer;
                }
            }
            self.doc = candidate;
            return Ok(candidate);
        }
    }
}

impl Scorer for ConjunctionScorer {
    fn doc_id(&self) -> u32 {
        self.doc
    }

    fn next_doc(&mut self) -> Result<u32> {
        if self.initialized && self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        self.initialized = true;
        let candidate = self.children[0].0.next_doc()?;
        self.align(candidate)
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        if self.initialized && self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        self.initialized = true;
        let candidate = self.children[0].0.advance(target)?;
        self.align(candidate)
    }

    fn cost(&self) -> u64 {
        self.children[0].0.cost()
    }

    fn score(&mut self) -> Result<f32> {
        let mut total = 0.0;
        for (child, scoring) in &mut self.children {
            if *scoring {
                total += child.score()?;
            }
        }
        Ok(total)
    }
}

/// Exhaustive union of scorers, scoring by summing the children that match
/// the current doc. Optionally requires a minimum number of matching
/// children.
pub struct DisjunctionSumScorer {
    children: Vec<Box<dyn Scorer>>,
    min_should_match: usize,
    doc: u32,
    initialized: bool,
}

impl DisjunctionSumScorer {
    pub fn new(children: Vec<Box<dyn Scorer>>, min_should_match: usize) -> Self {
        assert!(!children.is_empty());
        Self {
            children,
            min_should_match: min_should_match.max(1),
            doc: NO_MORE_DOCS,
            initialized: false,
        }
    }

    fn init(&mut self) -> Result<()> {
        if !self.initialized {
            for child in &mut self.children {
                child.next_doc()?;
            }
            self.initialized = true;
        }
        Ok(())
    }

    fn current_min(&self) -> u32 {
        self.children.iter().map(|c| c.doc_id()).min().unwrap_or(NO_MORE_DOCS)
    }

    fn settle(&mut self, mut candidate: u32) -> Result<u32> {
        loop {
            if candidate == NO_MORE_DOCS {
                self.doc = NO_MORE_DOCS;
                return Ok(NO_MORE_DOCS);
            }
            let matching = self
                .children
                .iter()
                .filter(|c| c.doc_id() == candidate)
                .count();
            if matching >= self.min_should_match {
                self.doc = candidate;
                return Ok(candidate);
            }
            for child in &mut self.children {
                if child.doc_id() == candidate {
                    child.next_doc()?;
                }
            }
            candidate = self.current_min();
        }
    }

    fn advance_past_current(&mut self) -> Result<u32> {
        if self.doc != NO_MORE_DOCS {
            let doc = self.doc;
            for child in &mut self.children {
                if child.doc_id() == doc {
                    child.next_doc()?;
                }
            }
        }
        Ok(self.current_min())
    }
}

impl Scorer for DisjunctionSumScorer {
    fn doc_id(&self) -> u32 {
        self.doc
    }

    fn next_doc(&mut self) -> Result<u32> {
        if self.initialized && self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        let candidate = if self.initialized {
            self.advance_past_current()?
        } else {
            self.init()?;
            self.current_min()
        };
        self.settle(candidate)
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        self.init()?;
        for child in &mut self.children {
            if child.doc_id() < target {
                child.advance(target)?;
            }
        }
        let candidate = self.current_min();
        self.settle(candidate)
    }

    fn cost(&self) -> u64 {
        self.children.iter().map(|c| c.cost()).sum()
    }

    fn score(&mut self) -> Result<f32> {
        let doc = self.doc;
        let mut total = 0.0;
        for child in &mut self.children {
            if child.doc_id() == doc {
                total += child.score()?;
            }
        }
        Ok(total)
    }

    fn max_score(&mut self, upto: u32) -> f32 {
        self.children.iter_mut().map(|c| c.max_score(upto)).sum()
    }
}

/// Matches of `primary` minus docs matched by `prohibited`.
pub struct ReqExclScorer {
    primary: Box<dyn Scorer>,
    prohibited: Box<dyn Scorer>,
}

impl ReqExclScorer {
    pub fn new(primary: Box<dyn Scorer>, prohibited: Box<dyn Scorer>) -> Self {
        Self {
            primary,
            prohibited,
        }
    }

    fn skip_excluded(&mut self, mut doc: u32) -> Result<u32> {
        loop {
            if doc == NO_MORE_DOCS {
                return Ok(NO_MORE_DOCS);
            }
            // NO_MORE_DOCS may also mean "not started yet"; advance
            // handles both and is a no-op once truly exhausted.
            let excl = if self.prohibited.doc_id() >= doc
                && self.prohibited.doc_id() != NO_MORE_DOCS
            {
                self.prohibited.doc_id()
            } else {
                self.prohibited.advance(doc)?
            };
            if excl != doc {
                return Ok(doc);
            }
            doc = self.primary.next_doc()?;
        }
    }
}

impl Scorer for ReqExclScorer {
    fn doc_id(&self) -> u32 {
        self.primary.doc_id()
    }

    fn next_doc(&mut self) -> Result<u32> {
        let doc = self.primary.next_doc()?;
        self.skip_excluded(doc)
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        let doc = self.primary.advance(target)?;
        self.skip_excluded(doc)
    }

    fn cost(&self) -> u64 {
        self.primary.cost()
    }

    fn score(&mut self) -> Result<f32> {
        self.primary.score()
    }

    fn max_score(&mut self, upto: u32) -> f32 {
        self.primary.max_score(upto)
    }
}

/// Required scorer plus optional scoring clauses, with an optional
/// minimum number of optional matches.
pub struct ReqOptScorer {
    required: Box<dyn Scorer>,
    optional: Vec<Box<dyn Scorer>>,
    min_should_match: usize,
    optional_sum: f32,
    /// Optional scorers report `NO_MORE_DOCS` until first driven, which
    /// is indistinguishable from exhaustion; drive them all once.
    optional_started: bool,
}

impl ReqOptScorer {
    pub fn new(
        required: Box<dyn Scorer>,
        optional: Vec<Box<dyn Scorer>>,
        min_should_match: usize,
    ) -> Self {
        Self {
            required,
            optional,
            min_should_match,
            optional_sum: 0.0,
            optional_started: false,
        }
    }

    fn settle(&mut self, mut doc: u32) -> Result<u32> {
        loop {
            if doc == NO_MORE_DOCS {
                return Ok(NO_MORE_DOCS);
            }
            let mut matching = 0usize;
            let mut sum = 0.0;
            for optional in &mut self.optional {
                if !self.optional_started || optional.doc_id() < doc {
                    optional.advance(doc)?;
                }
                if optional.doc_id() == doc {
                    matching += 1;
                    sum += optional.score()?;
                }
            }
            self.optional_started = true;
            if matching >= self.min_should_match {
                self.optional_sum = sum;
                return Ok(doc);
            }
            doc = self.required.next_doc()?;
        }
    }
}

impl Scorer for ReqOptScorer {
    fn doc_id(&self) -> u32 {
        self.required.doc_id()
    }

    fn next_doc(&mut self) -> Result<u32> {
        let doc = self.required.next_doc()?;
        self.settle(doc)
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        let doc = self.required.advance(target)?;
        self.settle(doc)
    }

    fn cost(&self) -> u64 {
        self.required.cost()
    }

    fn score(&mut self) -> Result<f32> {
        Ok(self.required.score()? + self.optional_sum)
    }
}
