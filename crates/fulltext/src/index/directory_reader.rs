use std::sync::Arc;

use store::Directory;

use crate::{
    document::StoredDocument,
    error::{
        Error,
        Result,
    },
    index::{
        segment_infos::SegmentInfos,
        segment_reader::SegmentReader,
    },
};

/// One segment reader plus its position in the composite doc-id space.
#[derive(Clone)]
pub struct LeafReader {
    pub reader: Arc<SegmentReader>,
    /// Global doc-id = `doc_base` + segment-local doc-id.
    pub doc_base: u32,
    pub ord: usize,
}

/// Point-in-time view of one commit: a `SegmentReader` per live segment,
/// ordered as the manifest lists them. Immutable after construction and
/// safe to share across threads; per-query state lives in scorers and
/// cloned inputs.
pub struct DirectoryReader {
    directory: Arc<dyn Directory>,
    segment_infos: SegmentInfos,
    leaves: Vec<LeafReader>,
    max_doc: u32,
    num_docs: u32,
}

impl DirectoryReader {
    /// Opens the newest commit in the directory.
    pub fn open(directory: Arc<dyn Directory>) -> Result<Self> {
        let infos = SegmentInfos::read_latest(directory.as_ref())?;
        Self::from_infos(directory, infos)
    }

    pub(crate) fn from_infos(
        directory: Arc<dyn Directory>,
        segment_infos: SegmentInfos,
    ) -> Result<Self> {
        let mut leaves = Vec::with_capacity(segment_infos.segments.len());
        let mut doc_base = 0u32;
        for (ord, commit) in segment_infos.segments.iter().enumerate() {
            let reader = Arc::new(SegmentReader::open(directory.clone(), commit)?);
            leaves.push(LeafReader {
                reader,
                doc_base,
                ord,
            });
            doc_base += commit.info.max_doc;
        }
        Ok(Self::assemble(directory, segment_infos, leaves))
    }

    fn assemble(
        directory: Arc<dyn Directory>,
        segment_infos: SegmentInfos,
        leaves: Vec<LeafReader>,
    ) -> Self {
        let max_doc = leaves
            .iter()
            .map(|l| l.reader.max_doc())
            .sum();
        let num_docs = leaves.iter().map(|l| l.reader.num_docs()).sum();
        Self {
            directory,
            segment_infos,
            leaves,
            max_doc,
            num_docs,
        }
    }

    pub fn generation(&self) -> u64 {
        self.segment_infos.generation
    }

    pub fn leaves(&self) -> &[LeafReader] {
        &self.leaves
    }

    pub fn max_doc(&self) -> u32 {
        self.max_doc
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn has_deletions(&self) -> bool {
        self.leaves.iter().any(|l| l.reader.has_deletions())
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    /// Re-opens against the newest commit, returning `None` when nothing
    /// changed. Unchanged segments (same name and live-docs generation)
    /// share their `SegmentReader`; segments whose deletions advanced
    /// share the immutable core and reload only the live-docs bitmap.
    pub fn open_if_changed(&self) -> Result<Option<DirectoryReader>> {
        let latest = SegmentInfos::latest_generation(self.directory.as_ref())?;
        if latest == Some(self.segment_infos.generation) {
            return Ok(None);
        }
        let infos = SegmentInfos::read_latest(self.directory.as_ref())?;
        if infos.generation == self.segment_infos.generation {
            return Ok(None);
        }

        let mut leaves = Vec::with_capacity(infos.segments.len());
        let mut doc_base = 0u32;
        for (ord, commit) in infos.segments.iter().enumerate() {
            let existing = self
                .leaves
                .iter()
                .find(|l| l.reader.segment_name() == commit.info.name);
            let reader = match existing {
                Some(leaf) if leaf.reader.commit_info().live_docs_gen == commit.live_docs_gen => {
                    leaf.reader.clone()
                },
                Some(leaf) => Arc::new(SegmentReader::open_with_core(
                    leaf.reader.core().clone(),
                    commit,
                )?),
                None => Arc::new(SegmentReader::open(self.directory.clone(), commit)?),
            };
            leaves.push(LeafReader {
                reader,
                doc_base,
                ord,
            });
            doc_base += commit.info.max_doc;
        }
        Ok(Some(Self::assemble(
            self.directory.clone(),
            infos,
            leaves,
        )))
    }

    /// Resolves a global doc-id to its leaf and segment-local id.
    pub fn leaf_for_doc(&self, doc: u32) -> Result<(&LeafReader, u32)> {
        if doc >= self.max_doc {
            return Err(Error::InvalidArgument(format!(
                "doc {doc} out of range [0, {})",
                self.max_doc
            )));
        }
        let idx = match self
            .leaves
            .binary_search_by(|l| l.doc_base.cmp(&doc))
        {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let leaf = &self.leaves[idx];
        Ok((leaf, doc - leaf.doc_base))
    }

    /// Stored fields for a global doc-id.
    pub fn document(&self, doc: u32) -> Result<StoredDocument> {
        let (leaf, local) = self.leaf_for_doc(doc)?;
        leaf.reader.document(local)
    }
}
