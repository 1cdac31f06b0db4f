use std::sync::{
    atomic::{
        AtomicU64,
        Ordering,
    },
    Arc,
};

use parking_lot::Mutex;
use store::Directory;

use crate::{
    codec::{
        format,
        live_docs,
        postings::NO_MORE_DOCS,
        segment_info::SegmentCommitInfo,
    },
    document::Document,
    error::{
        Error,
        Result,
    },
    index::{
        dwpt::DocumentsWriter,
        merge,
        segment_infos::SegmentInfos,
        segment_reader::SegmentReader,
        term::Term,
    },
    util::bitset::FixedBitSet,
};

pub const WRITE_LOCK_NAME: &str = "write.lock";

/// Extensions a partially-flushed segment may have left behind.
const SEGMENT_EXTENSIONS: &[&str] = &[
    "doc", "pos", "tim", "tip", "nvd", "nvm", "dvd", "dvm", "fdt", "fdx", "fnm", "si",
];

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OpenMode {
    /// Start from an empty index, shadowing any existing commit.
    Create,
    /// Fail unless a commit already exists.
    Append,
    #[default]
    CreateOrAppend,
}

#[derive(Clone, Debug)]
pub struct IndexWriterConfig {
    /// Flush once the buffer's estimated RAM crosses this many MiB.
    pub ram_buffer_mb: f64,
    /// Flush once this many docs are buffered; `None` disables the count
    /// trigger.
    pub max_buffered_docs: Option<u32>,
    pub open_mode: OpenMode,
    pub commit_on_close: bool,
    pub codec_name: String,
    /// Accepted for compatibility; compound-file packing is not performed.
    pub use_compound_file: bool,
}

impl Default for IndexWriterConfig {
    fn default() -> Self {
        Self {
            ram_buffer_mb: 16.0,
            max_buffered_docs: None,
            open_mode: OpenMode::CreateOrAppend,
            commit_on_close: true,
            codec_name: format::CODEC_NAME.to_string(),
            use_compound_file: true,
        }
    }
}

/// A term delete buffered at the writer, scoped so documents added after
/// the delete survive it: it fully affects segments flushed before it was
/// buffered, and within the first segment flushed afterwards only the
/// docs that were already in the buffer.
#[derive(Debug)]
struct BufferedDelete {
    term: Term,
    segment_count: usize,
    dwpt_limit: u32,
}

struct WriterState {
    segment_infos: SegmentInfos,
    dwpt: DocumentsWriter,
    buffered_deletes: Vec<BufferedDelete>,
    /// Whether anything would make the next commit differ from the last.
    changed: bool,
    _lock: store::DirectoryLock,
}

/// The single writer for a directory, enforced by `write.lock`.
///
/// All mutation serializes on one internal mutex; `commit` additionally
/// holds a commit mutex so readers can refresh concurrently while only one
/// commit is in flight.
pub struct IndexWriter {
    directory: Arc<dyn Directory>,
    config: IndexWriterConfig,
    state: Mutex<Option<WriterState>>,
    commit_lock: Mutex<()>,
    seq_no: AtomicU64,
}

impl IndexWriter {
    pub fn new(directory: Arc<dyn Directory>, config: IndexWriterConfig) -> Result<Self> {
        if config.codec_name != format::CODEC_NAME {
            return Err(Error::IllegalState(format!(
                "unknown codec \"{}\"",
                config.codec_name
            )));
        }
        let lock = directory.obtain_lock(WRITE_LOCK_NAME)?;

        let latest = SegmentInfos::latest_generation(directory.as_ref())?;
        // Create mode must publish a commit even if nothing gets indexed,
        // so the fresh (empty) index shadows whatever was there.
        let force_commit = config.open_mode == OpenMode::Create && latest.is_some();
        let segment_infos = match (config.open_mode, latest) {
            (OpenMode::Create, _) => SegmentInfos {
                // Keep the next commit generation above anything present
                // so the fresh index shadows the old one atomically.
                generation: latest.unwrap_or(0),
                counter: highest_segment_number(directory.as_ref())?,
                segments: Vec::new(),
            },
            (OpenMode::Append, None) => {
                return Err(Error::Store(store::Error::FileNotFound(
                    "segments_*".to_string(),
                )));
            },
            (OpenMode::Append, Some(_)) => SegmentInfos::read_latest(directory.as_ref())?,
            (OpenMode::CreateOrAppend, None) => SegmentInfos::default(),
            (OpenMode::CreateOrAppend, Some(_)) => SegmentInfos::read_latest(directory.as_ref())?,
        };

        Ok(Self {
            directory,
            config,
            state: Mutex::new(Some(WriterState {
                segment_infos,
                dwpt: DocumentsWriter::new(),
                buffered_deletes: Vec::new(),
                changed: force_commit,
                _lock: lock,
            })),
            commit_lock: Mutex::new(()),
            seq_no: AtomicU64::new(0),
        })
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    fn next_seq(&self) -> u64 {
        self.seq_no.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut WriterState) -> Result<T>) -> Result<T> {
        let mut guard = self.state.lock();
        let state = guard
            .as_mut()
            .ok_or_else(|| Error::AlreadyClosed("index writer".to_string()))?;
        f(state)
    }

    /// Buffers one document; flushes the buffer into a new segment when a
    /// threshold trips. Returns a sequence number that only orders
    /// operations.
    pub fn add_document(&self, doc: &Document) -> Result<u64> {
        self.with_state(|state| {
            state.dwpt.add_document(doc)?;
            if self.needs_flush(state) {
                self.flush_locked(state)?;
            }
            Ok(self.next_seq())
        })
    }

    /// Buffers "delete every doc containing `term`"; applied at commit.
    pub fn delete_documents(&self, term: Term) -> Result<u64> {
        self.with_state(|state| {
            Self::buffer_delete(state, term);
            Ok(self.next_seq())
        })
    }

    /// Delete-by-term then add, atomic at the commit boundary: the delete
    /// never touches the replacement doc.
    pub fn update_document(&self, term: Term, doc: &Document) -> Result<u64> {
        self.with_state(|state| {
            Self::buffer_delete(state, term);
            state.dwpt.add_document(doc)?;
            if self.needs_flush(state) {
                self.flush_locked(state)?;
            }
            Ok(self.next_seq())
        })
    }

    fn buffer_delete(state: &mut WriterState, term: Term) {
        state.changed = true;
        state.buffered_deletes.push(BufferedDelete {
            term,
            segment_count: state.segment_infos.segments.len(),
            dwpt_limit: state.dwpt.doc_count(),
        });
    }

    fn needs_flush(&self, state: &WriterState) -> bool {
        if let Some(max_docs) = self.config.max_buffered_docs {
            if state.dwpt.doc_count() >= max_docs {
                return true;
            }
        }
        state.dwpt.bytes_used() as f64 >= self.config.ram_buffer_mb * 1024.0 * 1024.0
    }

    /// Flushes the buffer into a new segment without committing.
    pub fn flush(&self) -> Result<()> {
        self.with_state(|state| self.flush_locked(state))
    }

    fn flush_locked(&self, state: &mut WriterState) -> Result<()> {
        if state.dwpt.doc_count() == 0 {
            return Ok(());
        }
        let name = format!("_{:x}", state.segment_infos.counter);
        state.segment_infos.counter += 1;
        match state.dwpt.flush(self.directory.as_ref(), &name) {
            Ok(Some(info)) => {
                tracing::debug!(
                    segment = %info.name,
                    max_doc = info.max_doc,
                    "flushed segment"
                );
                state
                    .segment_infos
                    .segments
                    .push(SegmentCommitInfo::new(info));
                state.changed = true;
                Ok(())
            },
            Ok(None) => Ok(()),
            Err(e) => {
                // The aborted buffer's docs are lost; earlier segments are
                // untouched. Sweep any partial files.
                state.dwpt.reset();
                for ext in SEGMENT_EXTENSIONS {
                    let _ = self.directory.delete_file(&format!("{name}.{ext}"));
                }
                Err(e)
            },
        }
    }

    /// Resolves buffered term deletes into per-segment live-docs updates.
    fn apply_deletes(&self, state: &mut WriterState) -> Result<()> {
        if state.buffered_deletes.is_empty() {
            return Ok(());
        }
        let deletes = std::mem::take(&mut state.buffered_deletes);
        for (seg_idx, commit) in state.segment_infos.segments.iter_mut().enumerate() {
            let applicable: Vec<&BufferedDelete> = deletes
                .iter()
                .filter(|d| seg_idx <= d.segment_count)
                .collect();
            if applicable.is_empty() {
                continue;
            }
            let reader = SegmentReader::open(self.directory.clone(), commit)?;
            let mut live = match reader.live_docs() {
                Some(bits) => (**bits).clone(),
                None => FixedBitSet::new_all_set(commit.info.max_doc),
            };
            let mut cleared = 0u32;
            for delete in applicable {
                // Docs buffered after the delete are out of its scope.
                let limit = if seg_idx < delete.segment_count {
                    u32::MAX
                } else {
                    delete.dwpt_limit
                };
                if limit == 0 {
                    continue;
                }
                let Some(mut terms_enum) = reader.terms_enum(&delete.term.field) else {
                    continue;
                };
                if !terms_enum.seek_exact(&delete.term.bytes)? {
                    continue;
                }
                let field = reader
                    .field_infos()
                    .by_name(&delete.term.field)
                    .expect("terms imply field info");
                let mut postings = reader.postings(field, terms_enum.meta())?;
                loop {
                    let doc = postings.next_doc()?;
                    if doc == NO_MORE_DOCS || doc >= limit {
                        break;
                    }
                    if live.clear(doc) {
                        cleared += 1;
                    }
                }
            }
            if cleared > 0 {
                state.changed = true;
                let generation = commit.live_docs_gen + 1;
                live_docs::write_live_docs(
                    self.directory.as_ref(),
                    &commit.info.name,
                    generation,
                    &live,
                )?;
                commit.del_count += cleared;
                commit.live_docs_gen = generation;
                tracing::debug!(
                    segment = %commit.info.name,
                    cleared,
                    generation,
                    "applied deletes"
                );
            }
        }
        Ok(())
    }

    /// Flushes, applies buffered deletes, fsyncs every referenced file,
    /// and publishes the next `segments_<gen>` atomically. Returns the new
    /// generation.
    pub fn commit(&self) -> Result<u64> {
        let _commit_guard = self.commit_lock.lock();
        self.with_state(|state| self.commit_locked(state))
    }

    fn commit_locked(&self, state: &mut WriterState) -> Result<u64> {
        self.flush_locked(state)?;
        self.apply_deletes(state)?;
        // Nothing new since the last published commit.
        if !state.changed && state.segment_infos.generation > 0 {
            return Ok(state.segment_infos.generation);
        }
        let files = state.segment_infos.all_segment_files();
        self.directory.sync(&files)?;
        let generation = state.segment_infos.commit(self.directory.as_ref())?;
        tracing::debug!(generation, "committed");
        state.changed = false;
        state
            .segment_infos
            .prune_unreferenced(self.directory.as_ref())?;
        Ok(generation)
    }

    /// Merges until at most `max_segments` remain, smallest pair first,
    /// then commits.
    pub fn force_merge(&self, max_segments: usize) -> Result<()> {
        if max_segments == 0 {
            return Err(Error::InvalidArgument(
                "force_merge requires max_segments >= 1".to_string(),
            ));
        }
        let _commit_guard = self.commit_lock.lock();
        self.with_state(|state| {
            self.flush_locked(state)?;
            self.apply_deletes(state)?;
            while state.segment_infos.segments.len() > max_segments {
                // Greedy: merge the two smallest segments.
                let mut ordered: Vec<usize> = (0..state.segment_infos.segments.len()).collect();
                ordered.sort_by_key(|&i| state.segment_infos.segments[i].num_docs());
                let (a, b) = (ordered[0].min(ordered[1]), ordered[0].max(ordered[1]));

                let second = state.segment_infos.segments.remove(b);
                let first = state.segment_infos.segments.remove(a);
                let sources = vec![
                    Arc::new(SegmentReader::open(self.directory.clone(), &first)?),
                    Arc::new(SegmentReader::open(self.directory.clone(), &second)?),
                ];
                let name = format!("_{:x}", state.segment_infos.counter);
                state.segment_infos.counter += 1;
                let info = merge::merge_segments(&self.directory, &sources, &name)?;
                state.changed = true;
                tracing::debug!(
                    merged = %info.name,
                    from = %first.info.name,
                    and = %second.info.name,
                    max_doc = info.max_doc,
                    "merged segments"
                );
                if info.max_doc > 0 {
                    state
                        .segment_infos
                        .segments
                        .push(SegmentCommitInfo::new(info));
                } else {
                    // Every source doc was deleted; drop the empty shell.
                    for file in info.all_files() {
                        let _ = self.directory.delete_file(&file);
                    }
                }
            }
            self.commit_locked(state)?;
            Ok(())
        })
    }

    /// Discards everything since the last commit and closes the writer.
    pub fn rollback(&self) -> Result<()> {
        let mut guard = self.state.lock();
        let Some(state) = guard.take() else {
            return Ok(());
        };
        let restored = match SegmentInfos::latest_generation(self.directory.as_ref())? {
            Some(_) => SegmentInfos::read_latest(self.directory.as_ref())?,
            None => SegmentInfos::default(),
        };
        // Sweep files created since that commit, then release the lock.
        restored.prune_unreferenced(self.directory.as_ref())?;
        tracing::debug!(generation = restored.generation, "rolled back");
        drop(state);
        Ok(())
    }

    /// Commits (when configured) and releases the write lock. Idempotent:
    /// closing twice is not an error.
    pub fn close(&self) -> Result<()> {
        if self.state.lock().is_none() {
            return Ok(());
        }
        if self.config.commit_on_close {
            let _commit_guard = self.commit_lock.lock();
            let mut guard = self.state.lock();
            if let Some(state) = guard.as_mut() {
                self.commit_locked(state)?;
            }
        }
        self.state.lock().take();
        Ok(())
    }
}

impl Drop for IndexWriter {
    fn drop(&mut self) {
        if self.state.lock().is_some() {
            if let Err(e) = self.close() {
                tracing::warn!("close on drop failed: {e}");
            }
        }
    }
}

/// Highest `_<hex>` segment number among existing files, plus one.
fn highest_segment_number(directory: &dyn Directory) -> Result<u64> {
    let mut highest = 0u64;
    for name in directory.list_all()? {
        let stem = name.split('.').next().unwrap_or(&name);
        let stem = stem.split('_').take(2).collect::<Vec<_>>().join("_");
        if let Some(hex) = stem.strip_prefix('_') {
            if let Ok(number) = u64::from_str_radix(hex, 16) {
                highest = highest.max(number + 1);
            }
        }
    }
    Ok(highest)
}
