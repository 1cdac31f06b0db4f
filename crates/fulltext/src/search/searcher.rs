use crate::{
    codec::postings::NO_MORE_DOCS,
    error::{
        Error,
        Result,
    },
    index::DirectoryReader,
    search::{
        collector::{
            TopDocs,
            TopScoreDocCollector,
        },
        query::Query,
        scorer::ScoreMode,
        weight::Weight,
    },
};

/// Drives a query over every segment of a reader and merges the
/// per-segment hits into one ranked result.
pub struct IndexSearcher<'a> {
    reader: &'a DirectoryReader,
}

impl<'a> IndexSearcher<'a> {
    pub fn new(reader: &'a DirectoryReader) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &DirectoryReader {
        self.reader
    }

    /// Top-`k` hits, ranked by score then doc-id. Uses the pruning
    /// (`TopScores`) evaluation path.
    pub fn search(&self, query: &Query, k: usize) -> Result<TopDocs> {
        self.search_with_mode(query, k, ScoreMode::TopScores)
    }

    /// Like `search` but with an explicit score mode; `Complete` forces
    /// exhaustive evaluation (and an exact `total_hits`).
    pub fn search_with_mode(&self, query: &Query, k: usize, mode: ScoreMode) -> Result<TopDocs> {
        if k == 0 {
            return Err(Error::InvalidArgument("k must be positive".to_string()));
        }
        let query = query.rewritten();
        let weight = Weight::new(&query, self.reader, mode, 1.0)?;
        let mut collector = TopScoreDocCollector::new(k);

        for leaf in self.reader.leaves() {
            let Some(mut scorer) = weight.scorer(leaf)? else {
                continue;
            };
            let live_docs = leaf.reader.live_docs().cloned();
            let mut threshold = collector.threshold();
            scorer.set_min_competitive_score(threshold);
            loop {
                let doc = scorer.next_doc()?;
                if doc == NO_MORE_DOCS {
                    break;
                }
                if let Some(live) = &live_docs {
                    if !live.get(doc) {
                        continue;
                    }
                }
                let score = if mode == ScoreMode::CountOnly {
                    0.0
                } else {
                    scorer.score()?
                };
                collector.collect(leaf.doc_base + doc, score);
                let updated = collector.threshold();
                if mode == ScoreMode::TopScores && updated > threshold {
                    threshold = updated;
                    scorer.set_min_competitive_score(threshold);
                }
            }
        }
        Ok(collector.into_top_docs())
    }

    /// Number of live documents matching `query`. Term queries against
    /// deletion-free segments short-circuit to the stored doc freq.
    pub fn count(&self, query: &Query) -> Result<u64> {
        let query = query.rewritten();
        if let Query::MatchNone = query {
            return Ok(0);
        }

        if let Query::Term(term_query) = &query {
            let mut total = 0u64;
            let mut structural = true;
            for leaf in self.reader.leaves() {
                if leaf.reader.has_deletions() {
                    structural = false;
                    break;
                }
                if let Some(mut terms_enum) = leaf.reader.terms_enum(&term_query.term.field) {
                    if terms_enum.seek_exact(&term_query.term.bytes)? {
                        total += u64::from(terms_enum.doc_freq());
                    }
                }
            }
            if structural {
                return Ok(total);
            }
        }

        let weight = Weight::new(&query, self.reader, ScoreMode::CountOnly, 1.0)?;
        let mut total = 0u64;
        for leaf in self.reader.leaves() {
            let Some(mut scorer) = weight.scorer(leaf)? else {
                continue;
            };
            let live_docs = leaf.reader.live_docs().cloned();
            loop {
                let doc = scorer.next_doc()?;
                if doc == NO_MORE_DOCS {
                    break;
                }
                if let Some(live) = &live_docs {
                    if !live.get(doc) {
                        continue;
                    }
                }
                total += 1;
            }
        }
        Ok(total)
    }
}
