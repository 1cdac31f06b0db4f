use crate::{
    error::Result,
    input::IndexInput,
    lock::DirectoryLock,
    output::IndexOutput,
};

/// Access-pattern hint attached to `open_input`, used by backends to tune
/// readahead behavior.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum IoContext {
    #[default]
    Default,
    /// Random-access reads (query evaluation).
    Read,
    /// The file will be read once, front to back.
    ReadOnce,
    /// Sequential scan feeding a merge.
    Merge,
}

/// Flat name-to-file store of append-only binary files.
///
/// A directory owns the atomic-commit primitive: writers stage
/// `pending_segments_<gen>` on a temp name, fsync, then `rename` onto the
/// final name, which concurrent readers observe atomically.
pub trait Directory: Send + Sync {
    /// Names of all files in the directory, sorted.
    fn list_all(&self) -> Result<Vec<String>>;

    fn file_exists(&self, name: &str) -> bool;

    fn file_length(&self, name: &str) -> Result<u64>;

    fn delete_file(&self, name: &str) -> Result<()>;

    /// Creates a new file for writing. The name must not already exist.
    fn create_output(&self, name: &str) -> Result<Box<dyn IndexOutput>>;

    /// Creates a uniquely-named file `<prefix>_<n>.<suffix>.tmp`.
    fn create_temp_output(&self, prefix: &str, suffix: &str) -> Result<Box<dyn IndexOutput>>;

    fn open_input(&self, name: &str, context: IoContext) -> Result<Box<dyn IndexInput>>;

    /// Atomically replaces `dest` with `source`.
    fn rename(&self, source: &str, dest: &str) -> Result<()>;

    /// Flushes the named files to stable storage.
    fn sync(&self, names: &[String]) -> Result<()>;

    /// Flushes directory metadata (file creations and renames).
    fn sync_metadata(&self) -> Result<()>;

    /// Acquires the named advisory lock, failing fast if another process
    /// (or another handle in this process) holds it.
    fn obtain_lock(&self, name: &str) -> Result<DirectoryLock>;

    /// Marks the directory closed; later operations fail with
    /// `AlreadyClosed`. Open inputs remain usable.
    fn close(&self) -> Result<()>;
}
