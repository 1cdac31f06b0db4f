use std::sync::Arc;

use store::{
    Directory,
    IndexInput,
    IoContext,
};

use crate::{
    codec::{
        doc_values::{
            DocValuesReader,
            NumericDocValues,
        },
        field_infos::{
            self,
            FieldInfo,
            FieldInfos,
        },
        format,
        live_docs,
        norms::NormsReader,
        postings::{
            SegmentPostings,
            TermMeta,
        },
        segment_info::SegmentCommitInfo,
        stored_fields::StoredFieldsReader,
        term_dict::{
            FieldTerms,
            SegmentTermsEnum,
            TermDictReader,
        },
    },
    document::StoredDocument,
    error::{
        Error,
        Result,
    },
    util::bitset::FixedBitSet,
};

/// Identity-comparable cache key. Core keys survive deletion cycles;
/// reader keys change with every live-docs generation.
#[derive(Clone, Debug)]
pub struct CacheKey(Arc<()>);

impl CacheKey {
    fn new() -> Self {
        CacheKey(Arc::new(()))
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for CacheKey {}

impl std::hash::Hash for CacheKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

/// The immutable parts of an open segment: term dictionary, postings
/// inputs, norms, doc-values, stored fields. Shared across live-docs
/// generations; file handles release when the last reference drops.
pub struct SegmentCoreReaders {
    pub field_infos: FieldInfos,
    term_dict: Option<TermDictReader>,
    norms: Option<NormsReader>,
    doc_values: Option<DocValuesReader>,
    stored: Option<StoredFieldsReader>,
    doc_in: Option<Box<dyn IndexInput>>,
    pos_in: Option<Box<dyn IndexInput>>,
    core_key: CacheKey,
    /// Streaming files whose footers `check_integrity` verifies.
    streaming_files: Vec<String>,
    directory: Arc<dyn Directory>,
}

impl SegmentCoreReaders {
    pub fn open(directory: Arc<dyn Directory>, commit: &SegmentCommitInfo) -> Result<Self> {
        let info = &commit.info;
        if info.codec != format::CODEC_NAME {
            return Err(Error::IllegalState(format!(
                "segment {} uses unknown codec \"{}\"",
                info.name, info.codec
            )));
        }
        let segment = info.name.as_str();
        let field_infos = field_infos::read_field_infos(directory.as_ref(), segment)?;

        let has_file = |ext: &str| info.files.iter().any(|f| f == &format!("{segment}.{ext}"));

        let mut streaming_files = Vec::new();
        let term_dict = if has_file("tim") {
            streaming_files.push(format!("{segment}.tim"));
            Some(TermDictReader::open(directory.as_ref(), segment)?)
        } else {
            None
        };
        let doc_in = if has_file("doc") {
            streaming_files.push(format!("{segment}.doc"));
            let name = format!("{segment}.doc");
            let mut input = directory.open_input(&name, IoContext::Read)?;
            format::check_input_header(input.as_mut(), &name, format::CODEC_NAME)?;
            Some(input)
        } else {
            None
        };
        let pos_in = if has_file("pos") {
            streaming_files.push(format!("{segment}.pos"));
            let name = format!("{segment}.pos");
            let mut input = directory.open_input(&name, IoContext::Read)?;
            format::check_input_header(input.as_mut(), &name, format::CODEC_NAME)?;
            Some(input)
        } else {
            None
        };
        let norms = if has_file("nvm") {
            streaming_files.push(format!("{segment}.nvd"));
            Some(NormsReader::open(directory.as_ref(), segment)?)
        } else {
            None
        };
        let doc_values = if has_file("dvm") {
            streaming_files.push(format!("{segment}.dvd"));
            Some(DocValuesReader::open(directory.as_ref(), segment, info.max_doc)?)
        } else {
            None
        };
        let stored = if has_file("fdx") {
            streaming_files.push(format!("{segment}.fdt"));
            Some(StoredFieldsReader::open(directory.as_ref(), segment)?)
        } else {
            None
        };

        Ok(Self {
            field_infos,
            term_dict,
            norms,
            doc_values,
            stored,
            doc_in,
            pos_in,
            core_key: CacheKey::new(),
            streaming_files,
            directory,
        })
    }
}

/// Read view of one segment at one live-docs generation.
pub struct SegmentReader {
    commit: SegmentCommitInfo,
    core: Arc<SegmentCoreReaders>,
    live_docs: Option<Arc<FixedBitSet>>,
    reader_key: CacheKey,
}

impl SegmentReader {
    pub fn open(directory: Arc<dyn Directory>, commit: &SegmentCommitInfo) -> Result<Self> {
        let core = Arc::new(SegmentCoreReaders::open(directory, commit)?);
        Self::open_with_core(core, commit)
    }

    /// Opens a new generation over an already-open core; used by reader
    /// refresh when only deletions changed.
    pub fn open_with_core(
        core: Arc<SegmentCoreReaders>,
        commit: &SegmentCommitInfo,
    ) -> Result<Self> {
        let live_docs = if commit.live_docs_gen > 0 {
            let bits = live_docs::read_live_docs(
                core.directory.as_ref(),
                &commit.info.name,
                commit.live_docs_gen,
                commit.info.max_doc,
            )?;
            if bits.count_ones() + commit.del_count != commit.info.max_doc {
                return Err(Error::corrupt(format!(
                    "segment {}: live bits {} + del_count {} != max_doc {}",
                    commit.info.name,
                    bits.count_ones(),
                    commit.del_count,
                    commit.info.max_doc
                )));
            }
            Some(Arc::new(bits))
        } else {
            None
        };
        Ok(Self {
            commit: commit.clone(),
            core,
            live_docs,
            reader_key: CacheKey::new(),
        })
    }

    pub fn segment_name(&self) -> &str {
        &self.commit.info.name
    }

    pub fn commit_info(&self) -> &SegmentCommitInfo {
        &self.commit
    }

    pub fn max_doc(&self) -> u32 {
        self.commit.info.max_doc
    }

    pub fn num_docs(&self) -> u32 {
        self.commit.num_docs()
    }

    pub fn has_deletions(&self) -> bool {
        self.commit.has_deletions()
    }

    /// Set bit = live. `None` means every doc is live.
    pub fn live_docs(&self) -> Option<&Arc<FixedBitSet>> {
        self.live_docs.as_ref()
    }

    pub fn is_live(&self, doc: u32) -> bool {
        self.live_docs.as_ref().is_none_or(|bits| bits.get(doc))
    }

    pub fn field_infos(&self) -> &FieldInfos {
        &self.core.field_infos
    }

    pub fn core(&self) -> &Arc<SegmentCoreReaders> {
        &self.core
    }

    /// Stable while the segment's immutable files are open.
    pub fn core_cache_key(&self) -> &CacheKey {
        &self.core.core_key
    }

    /// Changes whenever the live-docs generation does.
    pub fn reader_cache_key(&self) -> &CacheKey {
        &self.reader_key
    }

    /// Dictionary handle for a field, or `None` when the field has no
    /// postings in this segment.
    pub fn terms(&self, field: &str) -> Option<Arc<FieldTerms>> {
        let info = self.core.field_infos.by_name(field)?;
        self.core.term_dict.as_ref()?.field(info.number)
    }

    pub fn terms_enum(&self, field: &str) -> Option<SegmentTermsEnum> {
        let info = self.core.field_infos.by_name(field)?;
        self.core.term_dict.as_ref()?.terms_enum(info.number)
    }

    /// Opens a postings iterator for a term located via the dictionary.
    pub fn postings(&self, field: &FieldInfo, meta: &TermMeta) -> Result<SegmentPostings> {
        let doc_in = self
            .core
            .doc_in
            .as_ref()
            .ok_or_else(|| Error::IllegalState("segment has no postings".into()))?;
        SegmentPostings::new(
            doc_in.as_ref(),
            self.core.pos_in.as_deref(),
            field.index_options,
            meta,
        )
    }

    pub fn norms(&self, field: &str) -> Result<Option<Arc<Vec<u8>>>> {
        let Some(info) = self.core.field_infos.by_name(field) else {
            return Ok(None);
        };
        match &self.core.norms {
            Some(norms) => norms.norms(info.number),
            None => Ok(None),
        }
    }

    pub fn numeric_doc_values(&self, field: &str) -> Result<Option<NumericDocValues>> {
        let Some(info) = self.core.field_infos.by_name(field) else {
            return Ok(None);
        };
        match &self.core.doc_values {
            Some(dv) => dv.numeric(info.number),
            None => Ok(None),
        }
    }

    /// Stored fields of a live or deleted doc; deletion does not unstore.
    pub fn document(&self, doc: u32) -> Result<StoredDocument> {
        if doc >= self.max_doc() {
            return Err(Error::InvalidArgument(format!(
                "doc {doc} out of range [0, {})",
                self.max_doc()
            )));
        }
        match &self.core.stored {
            Some(stored) => stored.document(doc, &self.core.field_infos),
            None => Ok(StoredDocument::default()),
        }
    }

    /// Verifies the checksum footers of the segment's streaming files.
    pub fn check_integrity(&self) -> Result<()> {
        for name in &self.core.streaming_files {
            format::read_checksummed_file(self.core.directory.as_ref(), name)?;
        }
        Ok(())
    }
}
