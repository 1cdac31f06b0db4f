use std::collections::BinaryHeap;

/// One ranked hit. `doc` is a global doc-id.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreDoc {
    pub doc: u32,
    pub score: f32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TopDocs {
    /// Matches seen by the collector. Under `TopScores` pruning this is a
    /// lower bound; `Complete` and `CountOnly` make it exact.
    pub total_hits: u64,
    /// Ranked best-first: score descending, doc-id ascending on ties.
    pub score_docs: Vec<ScoreDoc>,
    pub max_score: f32,
}

/// Heap entry ordered weakest-first: the root is the lowest score, ties
/// resolved so the larger doc-id is evicted first.
#[derive(Clone, Copy, Debug)]
struct HeapEntry {
    score: f32,
    doc: u32,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.doc == other.doc
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; "greater" here means weaker.
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.doc.cmp(&other.doc))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded min-heap of the best `k` `(score, doc)` pairs. The heap floor
/// feeds back into WAND as the pruning threshold.
pub struct TopScoreDocCollector {
    k: usize,
    heap: BinaryHeap<HeapEntry>,
    total_hits: u64,
    max_score: f32,
}

impl TopScoreDocCollector {
    pub fn new(k: usize) -> Self {
        assert!(k > 0);
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
            total_hits: 0,
            max_score: f32::NEG_INFINITY,
        }
    }

    /// Current k-th best score; documents scoring at or below this can
    /// never enter the heap.
    pub fn threshold(&self) -> f32 {
        if self.heap.len() == self.k {
            self.heap.peek().expect("heap is full").score
        } else {
            f32::NEG_INFINITY
        }
    }

    pub fn collect(&mut self, doc: u32, score: f32) {
        self.total_hits += 1;
        if score > self.max_score {
            self.max_score = score;
        }
        if self.heap.len() < self.k {
            self.heap.push(HeapEntry { score, doc });
            return;
        }
        let root = *self.heap.peek().expect("heap is full");
        // Strictly better, or equal score with a smaller doc-id.
        if score > root.score || (score == root.score && doc < root.doc) {
            self.heap.pop();
            self.heap.push(HeapEntry { score, doc });
        }
    }

    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }

    pub fn into_top_docs(self) -> TopDocs {
        let mut score_docs: Vec<ScoreDoc> = self
            .heap
            .into_iter()
            .map(|e| ScoreDoc {
                doc: e.doc,
                score: e.score,
            })
            .collect();
        score_docs.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.doc.cmp(&b.doc))
        });
        let max_score = if score_docs.is_empty() {
            0.0
        } else {
            self.max_score
        };
        TopDocs {
            total_hits: self.total_hits,
            score_docs,
            max_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_best_k_sorted() {
        let mut collector = TopScoreDocCollector::new(3);
        for (doc, score) in [(0, 1.0f32), (1, 5.0), (2, 3.0), (3, 4.0), (4, 0.5)] {
            collector.collect(doc, score);
        }
        let top = collector.into_top_docs();
        assert_eq!(top.total_hits, 5);
        assert_eq!(top.max_score, 5.0);
        let docs: Vec<u32> = top.score_docs.iter().map(|d| d.doc).collect();
        assert_eq!(docs, vec![1, 3, 2]);
    }

    #[test]
    fn test_ties_prefer_smaller_doc() {
        let mut collector = TopScoreDocCollector::new(2);
        for doc in 0..5 {
            collector.collect(doc, 2.5);
        }
        let top = collector.into_top_docs();
        let docs: Vec<u32> = top.score_docs.iter().map(|d| d.doc).collect();
        assert_eq!(docs, vec![0, 1]);
    }

    #[test]
    fn test_threshold_tracks_heap_floor() {
        let mut collector = TopScoreDocCollector::new(2);
        assert_eq!(collector.threshold(), f32::NEG_INFINITY);
        collector.collect(0, 1.0);
        assert_eq!(collector.threshold(), f32::NEG_INFINITY);
        collector.collect(1, 3.0);
        assert_eq!(collector.threshold(), 1.0);
        collector.collect(2, 2.0);
        assert_eq!(collector.threshold(), 2.0);
        collector.collect(3, 0.5);
        assert_eq!(collector.threshold(), 2.0);
    }
}
