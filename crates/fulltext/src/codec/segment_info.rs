use std::collections::BTreeMap;

use store::Directory;

use crate::{
    codec::format::{
        self,
        BytesReader,
    },
    error::{
        Error,
        Result,
    },
};

/// Immutable description of one segment, persisted standalone as `.si` so
/// a crashed index can still be inventoried without a manifest.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SegmentInfo {
    /// Segment name, `_<hex counter>`.
    pub name: String,
    /// Codec identity, e.g. "Lucene104". Readers reject unknown codecs.
    pub codec: String,
    /// Doc-ids run over `[0, max_doc)`.
    pub max_doc: u32,
    /// Files belonging to the segment, excluding the `.si` itself.
    pub files: Vec<String>,
    pub diagnostics: BTreeMap<String, String>,
}

impl SegmentInfo {
    pub fn si_file_name(&self) -> String {
        format!("{}.si", self.name)
    }

    /// All files of the segment including the `.si`.
    pub fn all_files(&self) -> Vec<String> {
        let mut files = self.files.clone();
        files.push(self.si_file_name());
        files
    }
}

/// A segment plus its mutable commit state: deletions and the live-docs
/// generation, which advance without rewriting the segment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SegmentCommitInfo {
    pub info: SegmentInfo,
    pub del_count: u32,
    /// 0 while the segment has never had deletions.
    pub live_docs_gen: u64,
}

impl SegmentCommitInfo {
    pub fn new(info: SegmentInfo) -> Self {
        Self {
            info,
            del_count: 0,
            live_docs_gen: 0,
        }
    }

    pub fn num_docs(&self) -> u32 {
        self.info.max_doc - self.del_count
    }

    pub fn has_deletions(&self) -> bool {
        self.del_count > 0
    }

    pub fn live_docs_file_name(&self) -> Option<String> {
        (self.live_docs_gen > 0)
            .then(|| format!("{}_{}.liv", self.info.name, self.live_docs_gen))
    }

    /// Every file this commit of the segment references.
    pub fn all_files(&self) -> Vec<String> {
        let mut files = self.info.all_files();
        if let Some(liv) = self.live_docs_file_name() {
            files.push(liv);
        }
        files
    }
}

pub fn write_segment_info(directory: &dyn Directory, info: &SegmentInfo) -> Result<()> {
    let mut out = directory.create_output(&info.si_file_name())?;
    format::write_header(out.as_mut(), format::CODEC_NAME, format::FORMAT_VERSION_CURRENT)?;
    out.write_string(&info.name)?;
    out.write_string(&info.codec)?;
    out.write_u32(info.max_doc)?;
    out.write_u32(info.files.len() as u32)?;
    for file in &info.files {
        out.write_string(file)?;
    }
    out.write_u32(info.diagnostics.len() as u32)?;
    for (key, value) in &info.diagnostics {
        out.write_string(key)?;
        out.write_string(value)?;
    }
    format::write_footer(out.as_mut())?;
    out.close()?;
    Ok(())
}

pub fn read_segment_info(directory: &dyn Directory, segment: &str) -> Result<SegmentInfo> {
    let file_name = format!("{segment}.si");
    let payload = format::read_checksummed_file(directory, &file_name)?;
    let mut reader = BytesReader::new(&payload, &file_name);
    reader.check_header(format::CODEC_NAME)?;
    let name = reader.read_string()?;
    if name != segment {
        return Err(Error::corrupt(format!(
            "{file_name}: segment name mismatch, found {name}"
        )));
    }
    let codec = reader.read_string()?;
    let max_doc = reader.read_u32()?;
    let file_count = reader.read_u32()?;
    let mut files = Vec::with_capacity(file_count as usize);
    for _ in 0..file_count {
        files.push(reader.read_string()?);
    }
    let diag_count = reader.read_u32()?;
    let mut diagnostics = BTreeMap::new();
    for _ in 0..diag_count {
        let key = reader.read_string()?;
        let value = reader.read_string()?;
        diagnostics.insert(key, value);
    }
    Ok(SegmentInfo {
        name,
        codec,
        max_doc,
        files,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use store::FsDirectory;

    use super::*;

    #[test]
    fn test_si_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let info = SegmentInfo {
            name: "_a".to_string(),
            codec: format::CODEC_NAME.to_string(),
            max_doc: 1234,
            files: vec![
                "_a.doc".to_string(),
                "_a.tim".to_string(),
                "_a.tip".to_string(),
                "_a.fnm".to_string(),
            ],
            diagnostics: BTreeMap::from([
                ("source".to_string(), "flush".to_string()),
                ("max_doc".to_string(), "1234".to_string()),
            ]),
        };
        write_segment_info(&dir, &info).unwrap();
        let read = read_segment_info(&dir, "_a").unwrap();
        assert_eq!(read, info);
        assert!(read.all_files().contains(&"_a.si".to_string()));
    }

    #[test]
    fn test_live_docs_file_name_generation() {
        let info = SegmentInfo {
            name: "_1".to_string(),
            codec: format::CODEC_NAME.to_string(),
            max_doc: 10,
            files: vec![],
            diagnostics: BTreeMap::new(),
        };
        let mut commit = SegmentCommitInfo::new(info);
        assert_eq!(commit.live_docs_file_name(), None);
        commit.del_count = 2;
        commit.live_docs_gen = 3;
        assert_eq!(commit.live_docs_file_name(), Some("_1_3.liv".to_string()));
        assert_eq!(commit.num_docs(), 8);
    }
}
