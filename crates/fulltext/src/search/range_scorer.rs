use crate::{
    codec::{
        doc_values::NumericDocValues,
        postings::NO_MORE_DOCS,
    },
    error::Result,
    search::scorer::Scorer,
};

/// Walks the numeric doc-values of `[0, max_doc)`, admitting docs whose
/// value falls in the closed range. Constant score.
pub struct DocValuesRangeScorer {
    values: NumericDocValues,
    lower: i64,
    upper: i64,
    max_doc: u32,
    score: f32,
    doc: u32,
    initialized: bool,
}

impl DocValuesRangeScorer {
    pub fn new(
        values: NumericDocValues,
        lower: i64,
        upper: i64,
        max_doc: u32,
        score: f32,
    ) -> Self {
        Self {
            values,
            lower,
            upper,
            max_doc,
            score,
            doc: NO_MORE_DOCS,
            initialized: false,
        }
    }

    fn scan_from(&mut self, start: u32) -> u32 {
        for doc in start..self.max_doc {
            if let Some(value) = self.values.get(doc) {
                if (self.lower..=self.upper).contains(&value) {
                    self.doc = doc;
                    return doc;
                }
            }
        }
        self.doc = NO_MORE_DOCS;
        NO_MORE_DOCS
    }
}

impl Scorer for DocValuesRangeScorer {
    fn doc_id(&self) -> u32 {
        self.doc
    }

    fn next_doc(&mut self) -> Result<u32> {
        let start = if self.initialized {
            if self.doc == NO_MORE_DOCS {
                return Ok(NO_MORE_DOCS);
            }
            self.doc + 1
        } else {
            self.initialized = true;
            0
        };
        Ok(self.scan_from(start))
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        if self.initialized && self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        self.initialized = true;
        if self.doc != NO_MORE_DOCS && self.doc >= target {
            return Ok(self.doc);
        }
        Ok(self.scan_from(target))
    }

    fn cost(&self) -> u64 {
        u64::from(self.max_doc)
    }

    fn score(&mut self) -> Result<f32> {
        Ok(self.score)
    }

    fn max_score(&mut self, _upto: u32) -> f32 {
        self.score
    }
}
