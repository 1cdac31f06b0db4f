//! Query evaluation: the query tree, BM25 scoring, per-segment scorers
//! with block-max WAND pruning, and top-K collection.

pub mod bm25;
mod collector;
mod phrase_scorer;
mod query;
mod range_scorer;
mod scorer;
mod searcher;
mod term_scorer;
mod wand;
mod weight;

pub use collector::{
    ScoreDoc,
    TopDocs,
    TopScoreDocCollector,
};
pub use query::{
    BooleanClause,
    BooleanQuery,
    BooleanQueryBuilder,
    NumericRangeQuery,
    Occur,
    PhraseQuery,
    PhraseQueryBuilder,
    Query,
    TermQuery,
};
pub use scorer::{
    ScoreMode,
    Scorer,
};
pub use searcher::IndexSearcher;
pub use weight::Weight;
