//! An embeddable full-text search engine: documents are tokenized into
//! immutable on-disk segments (postings, term dictionary, norms, numeric
//! doc-values), commits publish atomically via generation-numbered
//! manifests, and ranked Boolean/phrase/range queries evaluate with BM25
//! scoring and block-max WAND pruning.
//!
//! Storage goes through the [`store`] crate's `Directory` abstraction;
//! both the buffered and memory-mapped backends work:
//!
//! ```ignore
//! let dir: Arc<dyn Directory> = Arc::new(MmapDirectory::open(path)?);
//! let writer = IndexWriter::new(dir.clone(), IndexWriterConfig::default())?;
//! let mut doc = Document::new();
//! doc.add(Field::text("content", "quick brown fox"));
//! writer.add_document(&doc)?;
//! writer.commit()?;
//!
//! let reader = DirectoryReader::open(dir)?;
//! let searcher = IndexSearcher::new(&reader);
//! let top = searcher.search(&Query::term("content", "fox"), 10)?;
//! ```

pub mod analysis;
pub mod codec;
pub mod document;
mod error;
pub mod index;
pub mod search;
pub mod util;

pub use document::{
    DocValuesType,
    Document,
    Field,
    FieldType,
    FieldValue,
    IndexOptions,
    StoredDocument,
};
pub use error::{
    Error,
    Result,
};
pub use index::{
    DirectoryReader,
    IndexWriter,
    IndexWriterConfig,
    OpenMode,
    Term,
};
pub use search::{
    BooleanQuery,
    IndexSearcher,
    NumericRangeQuery,
    Occur,
    PhraseQuery,
    Query,
    ScoreDoc,
    ScoreMode,
    TermQuery,
    TopDocs,
};
