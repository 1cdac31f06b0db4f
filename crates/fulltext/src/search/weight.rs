use crate::{
    error::{
        Error,
        Result,
    },
    index::{
        DirectoryReader,
        LeafReader,
        Term,
    },
    search::{
        bm25::{
            self,
            Bm25Scorer,
        },
        phrase_scorer::PhraseScorer,
        query::{
            BooleanQuery,
            NumericRangeQuery,
            Occur,
            PhraseQuery,
            Query,
            TermQuery,
        },
        range_scorer::DocValuesRangeScorer,
        scorer::{
            ConjunctionScorer,
            DisjunctionSumScorer,
            ReqExclScorer,
            ReqOptScorer,
            ScoreMode,
            Scorer,
        },
        term_scorer::TermScorer,
        wand::WandScorer,
    },
};

/// Query-level state reused across segments: IDF, boost, collection-wide
/// length statistics. Built once per search, then asked for one scorer
/// per leaf.
pub enum Weight {
    Term(TermWeight),
    Boolean(BooleanWeight),
    Phrase(PhraseWeight),
    NumericRange(RangeWeight),
    MatchNone,
}

impl Weight {
    pub fn new(
        query: &Query,
        reader: &DirectoryReader,
        score_mode: ScoreMode,
        boost: f32,
    ) -> Result<Weight> {
        Ok(match query {
            Query::Term(q) => Weight::Term(TermWeight::new(q, reader, boost)?),
            Query::Boolean(q) => Weight::Boolean(BooleanWeight::new(q, reader, score_mode, boost)?),
            Query::Phrase(q) => Weight::Phrase(PhraseWeight::new(q, reader, boost)?),
            Query::NumericRange(q) => Weight::NumericRange(RangeWeight::new(q, score_mode, boost)),
            Query::MatchNone => Weight::MatchNone,
        })
    }

    /// A per-segment iterator, or `None` when the segment provably has no
    /// matches.
    pub fn scorer(&self, leaf: &LeafReader) -> Result<Option<Box<dyn Scorer>>> {
        match self {
            Weight::Term(w) => w.scorer(leaf),
            Weight::Boolean(w) => w.scorer(leaf),
            Weight::Phrase(w) => w.scorer(leaf),
            Weight::NumericRange(w) => w.scorer(leaf),
            Weight::MatchNone => Ok(None),
        }
    }
}

/// Collection-wide stats for one field: docs carrying the field and the
/// average tokenized length, aggregated over all segments.
fn field_stats(reader: &DirectoryReader, field: &str) -> (u64, f32) {
    let mut doc_count = 0u64;
    let mut sum_total_term_freq = 0u64;
    for leaf in reader.leaves() {
        if let Some(terms) = leaf.reader.terms(field) {
            doc_count += u64::from(terms.stats.doc_count);
            sum_total_term_freq += terms.stats.sum_total_term_freq;
        }
    }
    let avg_doc_length = if doc_count > 0 {
        sum_total_term_freq as f32 / doc_count as f32
    } else {
        1.0
    };
    (doc_count, avg_doc_length)
}

/// Collection-wide doc freq of one term.
fn term_doc_freq(reader: &DirectoryReader, term: &Term) -> Result<u64> {
    let mut doc_freq = 0u64;
    for leaf in reader.leaves() {
        if let Some(mut terms_enum) = leaf.reader.terms_enum(&term.field) {
            if terms_enum.seek_exact(&term.bytes)? {
                doc_freq += u64::from(terms_enum.doc_freq());
            }
        }
    }
    Ok(doc_freq)
}

pub struct TermWeight {
    term: Term,
    sim: Bm25Scorer,
}

impl TermWeight {
    fn new(query: &TermQuery, reader: &DirectoryReader, boost: f32) -> Result<Self> {
        let doc_freq = term_doc_freq(reader, &query.term)?;
        let (doc_count, avg_doc_length) = field_stats(reader, &query.term.field);
        let idf = bm25::idf(doc_freq, doc_count);
        Ok(Self {
            term: query.term.clone(),
            sim: Bm25Scorer::new(boost, idf, avg_doc_length),
        })
    }

    fn scorer(&self, leaf: &LeafReader) -> Result<Option<Box<dyn Scorer>>> {
        let Some(mut terms_enum) = leaf.reader.terms_enum(&self.term.field) else {
            return Ok(None);
        };
        if !terms_enum.seek_exact(&self.term.bytes)? {
            return Ok(None);
        }
        let meta = *terms_enum.meta();
        let field = leaf
            .reader
            .field_infos()
            .by_name(&self.term.field)
            .expect("terms imply field info");
        let postings = leaf.reader.postings(field, &meta)?;
        let norms = leaf.reader.norms(&self.term.field)?;
        Ok(Some(Box::new(TermScorer::new(
            postings,
            self.sim.clone(),
            norms,
            meta.total_term_freq,
        ))))
    }
}

pub struct BooleanWeight {
    must: Vec<Weight>,
    filter: Vec<Weight>,
    should: Vec<Weight>,
    must_not: Vec<Weight>,
    min_should_match: usize,
    score_mode: ScoreMode,
}

impl BooleanWeight {
    fn new(
        query: &BooleanQuery,
        reader: &DirectoryReader,
        score_mode: ScoreMode,
        boost: f32,
    ) -> Result<Self> {
        let mut must = Vec::new();
        let mut filter = Vec::new();
        let mut should = Vec::new();
        let mut must_not = Vec::new();
        for clause in &query.clauses {
            match clause.occur {
                Occur::Must => must.push(Weight::new(&clause.query, reader, score_mode, boost)?),
                Occur::Should => {
                    should.push(Weight::new(&clause.query, reader, score_mode, boost)?)
                },
                // Gating clauses are never scored.
                Occur::Filter => filter.push(Weight::new(
                    &clause.query,
                    reader,
                    ScoreMode::CountOnly,
                    0.0,
                )?),
                Occur::MustNot => must_not.push(Weight::new(
                    &clause.query,
                    reader,
                    ScoreMode::CountOnly,
                    0.0,
                )?),
            }
        }
        Ok(Self {
            must,
            filter,
            should,
            must_not,
            min_should_match: query.min_should_match as usize,
            score_mode,
        })
    }

    fn scorer(&self, leaf: &LeafReader) -> Result<Option<Box<dyn Scorer>>> {
        // Required set: MUST scores, FILTER gates.
        let mut required: Vec<(Box<dyn Scorer>, bool)> = Vec::new();
        for weight in &self.must {
            match weight.scorer(leaf)? {
                Some(scorer) => required.push((scorer, true)),
                None => return Ok(None),
            }
        }
        for weight in &self.filter {
            match weight.scorer(leaf)? {
                Some(scorer) => required.push((scorer, false)),
                None => return Ok(None),
            }
        }

        let mut optional: Vec<Box<dyn Scorer>> = Vec::new();
        for weight in &self.should {
            if let Some(scorer) = weight.scorer(leaf)? {
                optional.push(scorer);
            }
        }
        if optional.len() < self.min_should_match {
            return Ok(None);
        }

        let positive: Box<dyn Scorer> = if !required.is_empty() {
            let conjunction = Box::new(ConjunctionScorer::new(required));
            if optional.is_empty() {
                conjunction
            } else {
                Box::new(ReqOptScorer::new(
                    conjunction,
                    optional,
                    self.min_should_match,
                ))
            }
        } else {
            if optional.is_empty() {
                return Ok(None);
            }
            if self.score_mode == ScoreMode::TopScores
                && self.must_not.is_empty()
                && self.min_should_match <= 1
            {
                Box::new(WandScorer::new(optional))
            } else {
                Box::new(DisjunctionSumScorer::new(
                    optional,
                    self.min_should_match.max(1),
                ))
            }
        };

        let mut prohibited: Vec<Box<dyn Scorer>> = Vec::new();
        for weight in &self.must_not {
            if let Some(scorer) = weight.scorer(leaf)? {
                prohibited.push(scorer);
            }
        }
        if prohibited.is_empty() {
            return Ok(Some(positive));
        }
        let exclusion: Box<dyn Scorer> = if prohibited.len() == 1 {
            prohibited.pop().expect("one prohibited scorer")
        } else {
            Box::new(DisjunctionSumScorer::new(prohibited, 1))
        };
        Ok(Some(Box::new(ReqExclScorer::new(positive, exclusion))))
    }
}

pub struct PhraseWeight {
    field: String,
    terms: Vec<(Vec<u8>, u32)>,
    sim: Bm25Scorer,
}

impl PhraseWeight {
    fn new(query: &PhraseQuery, reader: &DirectoryReader, boost: f32) -> Result<Self> {
        debug_assert!(query.terms.len() >= 2, "rewrite collapses short phrases");
        // The phrase weight sums the member terms' IDFs, scoring the
        // phrase like a pseudo-term with that combined rarity.
        let (doc_count, avg_doc_length) = field_stats(reader, &query.field);
        let mut idf = 0.0;
        for (bytes, _) in &query.terms {
            let term = Term::new(query.field.clone(), bytes.clone());
            let doc_freq = term_doc_freq(reader, &term)?;
            idf += bm25::idf(doc_freq, doc_count);
        }
        Ok(Self {
            field: query.field.clone(),
            terms: query.terms.clone(),
            sim: Bm25Scorer::new(boost, idf, avg_doc_length),
        })
    }

    fn scorer(&self, leaf: &LeafReader) -> Result<Option<Box<dyn Scorer>>> {
        let Some(field) = leaf.reader.field_infos().by_name(&self.field) else {
            return Ok(None);
        };
        if !field.index_options.has_positions() {
            return Err(Error::IllegalState(format!(
                "phrase query on field \"{}\" which has no positions",
                self.field
            )));
        }
        let Some(mut terms_enum) = leaf.reader.terms_enum(&self.field) else {
            return Ok(None);
        };
        let mut postings = Vec::with_capacity(self.terms.len());
        for (bytes, offset) in &self.terms {
            if !terms_enum.seek_exact(bytes)? {
                return Ok(None);
            }
            postings.push((leaf.reader.postings(field, terms_enum.meta())?, *offset));
        }
        let norms = leaf.reader.norms(&self.field)?;
        Ok(Some(Box::new(PhraseScorer::new(
            postings,
            self.sim.clone(),
            norms,
        ))))
    }
}

pub struct RangeWeight {
    field: String,
    bounds: Option<(i64, i64)>,
    score: f32,
}

impl RangeWeight {
    fn new(query: &NumericRangeQuery, score_mode: ScoreMode, boost: f32) -> Self {
        Self {
            field: query.field.clone(),
            bounds: query.closed_bounds(),
            score: if score_mode == ScoreMode::CountOnly {
                0.0
            } else {
                boost
            },
        }
    }

    fn scorer(&self, leaf: &LeafReader) -> Result<Option<Box<dyn Scorer>>> {
        let Some((lower, upper)) = self.bounds else {
            return Ok(None);
        };
        let Some(values) = leaf.reader.numeric_doc_values(&self.field)? else {
            return Ok(None);
        };
        Ok(Some(Box::new(DocValuesRangeScorer::new(
            values,
            lower,
            upper,
            leaf.reader.max_doc(),
            self.score,
        ))))
    }
}
