use crate::{
    codec::postings::NO_MORE_DOCS,
    error::Result,
    search::scorer::Scorer,
};

/// Block-max WAND disjunction.
///
/// Keeps children sorted by current doc-id. Each round, the cumulative
/// per-scorer upper bounds pick a pivot: the first position where the sum
/// could beat the collector's floor. Docs before the pivot cannot be
/// competitive and are skipped by whole blocks where the skip metadata
/// allows. With no floor yet (or children that cannot bound their score)
/// this degenerates gracefully into an exhaustive disjunction; matched
/// docs are scored in clause order, so the pruned and exhaustive paths
/// produce identical scores.
pub struct WandScorer {
    /// `(clause ordinal, scorer)`; reordered by current doc-id.
    children: Vec<(usize, Box<dyn Scorer>)>,
    doc: u32,
    min_competitive: f32,
    initialized: bool,
}

impl WandScorer {
    pub fn new(children: Vec<Box<dyn Scorer>>) -> Self {
        assert!(!children.is_empty());
        Self {
            children: children.into_iter().enumerate().collect(),
            doc: NO_MORE_DOCS,
            min_competitive: f32::NEG_INFINITY,
            initialized: false,
        }
    }

    fn init(&mut self) -> Result<()> {
        if !self.initialized {
            for (_, child) in &mut self.children {
                child.next_doc()?;
            }
            self.initialized = true;
        }
        Ok(())
    }

    fn sort_children(&mut self) {
        self.children.sort_by_key(|(_, c)| c.doc_id());
    }

    /// Runs pivot selection until a competitive aligned doc emerges.
    fn find_next(&mut self) -> Result<u32> {
        loop {
            self.sort_children();
            if self.children[0].1.doc_id() == NO_MORE_DOCS {
                self.doc = NO_MORE_DOCS;
                return Ok(NO_MORE_DOCS);
            }

            // Pivot: first scorer where the running sum of term-level
            // upper bounds exceeds the floor.
            let mut acc = 0.0f32;
            let mut pivot_idx = None;
            for (i, (_, child)) in self.children.iter_mut().enumerate() {
                if child.doc_id() == NO_MORE_DOCS {
                    break;
                }
                acc += child.max_score(NO_MORE_DOCS);
                if acc > self.min_competitive {
                    pivot_idx = Some(i);
                    break;
                }
            }
            let Some(pivot_idx) = pivot_idx else {
                // Even all scorers together cannot beat the floor.
                self.doc = NO_MORE_DOCS;
                return Ok(NO_MORE_DOCS);
            };
            let pivot_doc = self.children[pivot_idx].1.doc_id();

            if self.children[0].1.doc_id() == pivot_doc {
                // Every scorer on the pivot doc is a contributor; extend
                // the prefix over ties so none is overlooked.
                let mut ext = pivot_idx;
                while ext + 1 < self.children.len()
                    && self.children[ext + 1].1.doc_id() == pivot_doc
                {
                    ext += 1;
                }
                // Refine with block-level maxima before scoring.
                let mut block_sum = 0.0f32;
                for (_, child) in self.children[..=ext].iter_mut() {
                    block_sum += child.max_score(pivot_doc);
                }
                if block_sum > self.min_competitive {
                    self.doc = pivot_doc;
                    return Ok(pivot_doc);
                }
                // The current blocks cannot reach the floor anywhere up
                // to the earliest block end, and scorers beyond the
                // prefix only start at their current doc; skip the whole
                // provably-dead range.
                let block_end = self.children[..=ext]
                    .iter()
                    .map(|(_, c)| c.block_max_doc())
                    .min()
                    .expect("non-empty prefix");
                let next_other = self
                    .children
                    .get(ext + 1)
                    .map_or(NO_MORE_DOCS, |(_, c)| c.doc_id());
                let target = block_end
                    .saturating_add(1)
                    .min(next_other)
                    .max(pivot_doc.saturating_add(1));
                for (_, child) in self.children[..=ext].iter_mut() {
                    if child.doc_id() < target {
                        child.advance(target)?;
                    }
                }
            } else {
                // Advance an earlier scorer up to the pivot doc; prefer
                // the one whose block ends first.
                let idx = self.children[..pivot_idx]
                    .iter()
                    .enumerate()
                    .filter(|(_, (_, c))| c.doc_id() < pivot_doc)
                    .min_by_key(|(_, (_, c))| c.block_max_doc())
                    .map(|(i, _)| i)
                    .expect("pivot implies an earlier scorer");
                self.children[idx].1.advance(pivot_doc)?;
            }
        }
    }
}

impl Scorer for WandScorer {
    fn doc_id(&self) -> u32 {
        self.doc
    }

    fn next_doc(&mut self) -> Result<u32> {
        if self.initialized && self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        if self.initialized {
            let doc = self.doc;
            for (_, child) in &mut self.children {
                if child.doc_id() == doc {
                    child.next_doc()?;
                }
            }
        } else {
            self.init()?;
        }
        self.find_next()
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        self.init()?;
        if self.doc != NO_MORE_DOCS && self.doc >= target {
            return Ok(self.doc);
        }
        for (_, child) in &mut self.children {
            if child.doc_id() < target {
                child.advance(target)?;
            }
        }
        self.find_next()
    }

    fn cost(&self) -> u64 {
        self.children.iter().map(|(_, c)| c.cost()).sum()
    }

    fn score(&mut self) -> Result<f32> {
        let doc = self.doc;
        // Sum in clause order regardless of the current doc-id sort, so
        // the result is bit-identical to the exhaustive disjunction's.
        let mut contributions: Vec<(usize, f32)> = Vec::with_capacity(self.children.len());
        for (ord, child) in &mut self.children {
            if child.doc_id() == doc {
                contributions.push((*ord, child.score()?));
            }
        }
        contributions.sort_unstable_by_key(|(ord, _)| *ord);
        Ok(contributions.into_iter().map(|(_, s)| s).sum())
    }

    fn max_score(&mut self, upto: u32) -> f32 {
        self.children.iter_mut().map(|(_, c)| c.max_score(upto)).sum()
    }

    fn set_min_competitive_score(&mut self, score: f32) {
        self.min_competitive = score;
    }
}
