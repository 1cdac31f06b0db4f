//! The segment lifecycle: buffering documents into segments, committing
//! them atomically, reading them back, and deleting from them.

mod directory_reader;
mod dwpt;
mod merge;
mod segment_infos;
mod segment_reader;
mod term;
mod writer;

pub use directory_reader::{
    DirectoryReader,
    LeafReader,
};
pub use dwpt::DocumentsWriter;
pub use merge::merge_segments;
pub use segment_infos::{
    pending_segments_file_name,
    segments_file_name,
    SegmentInfos,
};
pub use segment_reader::{
    CacheKey,
    SegmentCoreReaders,
    SegmentReader,
};
pub use term::Term;
pub use writer::{
    IndexWriter,
    IndexWriterConfig,
    OpenMode,
    WRITE_LOCK_NAME,
};
