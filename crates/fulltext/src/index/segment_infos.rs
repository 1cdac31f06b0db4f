use std::collections::BTreeMap;

use store::Directory;

use crate::{
    codec::{
        format::{
            self,
            BytesReader,
        },
        segment_info::{
            SegmentCommitInfo,
            SegmentInfo,
        },
    },
    error::{
        Error,
        Result,
    },
};

/// The set of live segments at one commit generation, serialized as
/// `segments_<gen>`. The commit with the highest parseable generation is
/// the current one.
#[derive(Clone, Debug, Default)]
pub struct SegmentInfos {
    pub generation: u64,
    /// Names the next flushed segment; derived from the manifest contents,
    /// scoped to this index.
    pub counter: u64,
    pub segments: Vec<SegmentCommitInfo>,
}

pub fn segments_file_name(generation: u64) -> String {
    format!("segments_{generation}")
}

pub fn pending_segments_file_name(generation: u64) -> String {
    format!("pending_segments_{generation}")
}

fn parse_generation(name: &str) -> Option<u64> {
    name.strip_prefix("segments_")?.parse().ok()
}

fn parse_segment_number(name: &str) -> Option<u64> {
    u64::from_str_radix(name.strip_prefix('_')?, 16).ok()
}

impl SegmentInfos {
    pub fn total_max_doc(&self) -> u64 {
        self.segments.iter().map(|s| u64::from(s.info.max_doc)).sum()
    }

    /// Every file referenced by this commit, manifest excluded.
    pub fn all_segment_files(&self) -> Vec<String> {
        self.segments.iter().flat_map(|s| s.all_files()).collect()
    }

    /// Highest commit generation present in the directory, parseable or
    /// not. `pending_segments_*` files are ignored.
    pub fn latest_generation(directory: &dyn Directory) -> Result<Option<u64>> {
        let mut latest = None;
        for name in directory.list_all()? {
            if let Some(generation) = parse_generation(&name) {
                latest = latest.max(Some(generation));
            }
        }
        Ok(latest)
    }

    /// Loads the newest commit whose manifest parses, skipping corrupt
    /// ones left by torn writes.
    pub fn read_latest(directory: &dyn Directory) -> Result<SegmentInfos> {
        let mut generations: Vec<u64> = directory
            .list_all()?
            .iter()
            .filter_map(|name| parse_generation(name))
            .collect();
        generations.sort_unstable_by(|a, b| b.cmp(a));
        if generations.is_empty() {
            return Err(Error::Store(store::Error::FileNotFound(
                "segments_*".to_string(),
            )));
        }
        let mut first_error = None;
        for generation in generations {
            match Self::read(directory, generation) {
                Ok(infos) => return Ok(infos),
                Err(e) => {
                    tracing::warn!("skipping unreadable commit generation {generation}: {e}");
                    first_error.get_or_insert(e);
                },
            }
        }
        Err(first_error.expect("at least one generation attempted"))
    }

    pub fn read(directory: &dyn Directory, generation: u64) -> Result<SegmentInfos> {
        let name = segments_file_name(generation);
        let payload = format::read_checksummed_file(directory, &name)?;
        let mut reader = BytesReader::new(&payload, &name);

        let magic = reader.read_u32()?;
        if magic != format::MAGIC {
            return Err(Error::corrupt(format!("{name}: bad magic {magic:#010x}")));
        }
        let version = reader.read_u32()?;
        if !(format::FORMAT_VERSION_MIN..=format::FORMAT_VERSION_CURRENT).contains(&version) {
            return Err(Error::corrupt(format!(
                "{name}: unsupported format version {version}"
            )));
        }
        let file_generation = reader.read_u64()?;
        if file_generation != generation {
            return Err(Error::corrupt(format!(
                "{name}: generation mismatch, file says {file_generation}"
            )));
        }

        let segment_count = reader.read_u32()?;
        let mut segments = Vec::with_capacity(segment_count as usize);
        let mut counter = 0u64;
        for _ in 0..segment_count {
            let seg_name = reader.read_string()?;
            let codec = reader.read_string()?;
            let max_doc = reader.read_u32()?;
            let del_count = reader.read_u32()?;
            let live_docs_gen = reader.read_u64()?;
            if del_count > max_doc {
                return Err(Error::corrupt(format!(
                    "{name}: segment {seg_name} has del_count {del_count} > max_doc {max_doc}"
                )));
            }
            let file_count = reader.read_u32()?;
            let mut files = Vec::with_capacity(file_count as usize);
            for _ in 0..file_count {
                files.push(reader.read_string()?);
            }
            // `all_files` re-derives the `.si` and live-docs entries.
            let si_name = format!("{seg_name}.si");
            files.retain(|f| f != &si_name && !f.ends_with(".liv"));
            let diag_count = reader.read_u32()?;
            let mut diagnostics = BTreeMap::new();
            for _ in 0..diag_count {
                let key = reader.read_string()?;
                let value = reader.read_string()?;
                diagnostics.insert(key, value);
            }
            if let Some(number) = parse_segment_number(&seg_name) {
                counter = counter.max(number + 1);
            }
            segments.push(SegmentCommitInfo {
                info: SegmentInfo {
                    name: seg_name,
                    codec,
                    max_doc,
                    files,
                    diagnostics,
                },
                del_count,
                live_docs_gen,
            });
        }

        Ok(SegmentInfos {
            generation,
            counter,
            segments,
        })
    }

    /// Publishes the next commit generation: stage `pending_segments_<g>`,
    /// fsync it, then atomically rename it over `segments_<g>`. A failure
    /// before the rename leaves the previous commit current; the pending
    /// file is removed best-effort.
    pub fn commit(&mut self, directory: &dyn Directory) -> Result<u64> {
        let next_gen = self.generation + 1;
        let pending = pending_segments_file_name(next_gen);
        // A crash may have left a stale pending file at this generation.
        if directory.file_exists(&pending) {
            directory.delete_file(&pending)?;
        }
        let staged = self
            .write_pending(directory, &pending, next_gen)
            .and_then(|()| Ok(directory.sync(std::slice::from_ref(&pending))?))
            .and_then(|()| Ok(directory.rename(&pending, &segments_file_name(next_gen))?));
        if let Err(e) = staged {
            let _ = directory.delete_file(&pending);
            return Err(e);
        }
        self.generation = next_gen;
        Ok(next_gen)
    }

    fn write_pending(&self, directory: &dyn Directory, name: &str, generation: u64) -> Result<()> {
        let mut out = directory.create_output(name)?;
        out.write_u32(format::MAGIC)?;
        out.write_u32(format::FORMAT_VERSION_CURRENT)?;
        out.write_u64(generation)?;
        out.write_u32(self.segments.len() as u32)?;
        for segment in &self.segments {
            out.write_string(&segment.info.name)?;
            out.write_string(&segment.info.codec)?;
            out.write_u32(segment.info.max_doc)?;
            out.write_u32(segment.del_count)?;
            out.write_u64(segment.live_docs_gen)?;
            let files = segment.all_files();
            out.write_u32(files.len() as u32)?;
            for file in &files {
                out.write_string(file)?;
            }
            out.write_u32(segment.info.diagnostics.len() as u32)?;
            for (key, value) in &segment.info.diagnostics {
                out.write_string(key)?;
                out.write_string(value)?;
            }
        }
        format::write_footer(out.as_mut())?;
        out.close()?;
        Ok(())
    }

    /// Deletes files belonging to no live segment: stale manifests, stale
    /// live-docs generations, and orphan segments from aborted flushes.
    /// The current manifest and everything it references survive.
    pub fn prune_unreferenced(&self, directory: &dyn Directory) -> Result<()> {
        let current_manifest = segments_file_name(self.generation);
        let mut referenced: std::collections::BTreeSet<String> =
            self.all_segment_files().into_iter().collect();
        referenced.insert(current_manifest);
        for name in directory.list_all()? {
            if name == "write.lock" || referenced.contains(&name) {
                continue;
            }
            tracing::debug!("pruning unreferenced file {name}");
            if let Err(e) = directory.delete_file(&name) {
                tracing::warn!("failed to prune {name}: {e}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use store::FsDirectory;

    use super::*;

    fn sample_infos() -> SegmentInfos {
        let info = SegmentInfo {
            name: "_0".to_string(),
            codec: format::CODEC_NAME.to_string(),
            max_doc: 42,
            files: vec!["_0.doc".to_string(), "_0.tim".to_string()],
            diagnostics: BTreeMap::from([("source".to_string(), "flush".to_string())]),
        };
        let mut commit = SegmentCommitInfo::new(info);
        commit.del_count = 2;
        commit.live_docs_gen = 1;
        SegmentInfos {
            generation: 0,
            counter: 1,
            segments: vec![commit],
        }
    }

    #[test]
    fn test_manifest_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let mut infos = sample_infos();
        let generation = infos.commit(&dir).unwrap();
        assert_eq!(generation, 1);
        assert!(dir.file_exists("segments_1"));
        assert!(!dir.file_exists("pending_segments_1"));

        let read = SegmentInfos::read_latest(&dir).unwrap();
        assert_eq!(read.generation, 1);
        assert_eq!(read.counter, 1);
        assert_eq!(read.segments.len(), 1);
        let segment = &read.segments[0];
        assert_eq!(segment.info.name, "_0");
        assert_eq!(segment.info.max_doc, 42);
        assert_eq!(segment.del_count, 2);
        assert_eq!(segment.live_docs_gen, 1);
        assert!(segment.all_files().contains(&"_0.si".to_string()));
        assert!(segment.all_files().contains(&"_0_1.liv".to_string()));
    }

    #[test]
    fn test_generations_grow_and_latest_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let mut infos = sample_infos();
        infos.commit(&dir).unwrap();
        infos.segments[0].del_count = 5;
        infos.commit(&dir).unwrap();
        assert_eq!(infos.generation, 2);

        let read = SegmentInfos::read_latest(&dir).unwrap();
        assert_eq!(read.generation, 2);
        assert_eq!(read.segments[0].del_count, 5);
    }

    #[test]
    fn test_corrupt_latest_falls_back_to_previous() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let mut infos = sample_infos();
        infos.commit(&dir).unwrap();

        // A torn write of a newer generation must not shadow the good one.
        std::fs::write(tmp.path().join("segments_2"), b"garbage").unwrap();
        let read = SegmentInfos::read_latest(&dir).unwrap();
        assert_eq!(read.generation, 1);
    }

    #[test]
    fn test_pending_files_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let mut infos = sample_infos();
        infos.commit(&dir).unwrap();
        std::fs::write(tmp.path().join("pending_segments_2"), b"half written").unwrap();

        let read = SegmentInfos::read_latest(&dir).unwrap();
        assert_eq!(read.generation, 1);
        assert_eq!(
            SegmentInfos::latest_generation(&dir).unwrap(),
            Some(1)
        );
    }

    #[test]
    fn test_read_latest_on_empty_directory_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        assert!(matches!(
            SegmentInfos::read_latest(&dir),
            Err(Error::Store(store::Error::FileNotFound(_)))
        ));
    }
}
