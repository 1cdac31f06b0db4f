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
    util::bitset::FixedBitSet,
};

/// Writes a live-docs generation file `_<seg>_<gen>.liv`: a bitset of
/// `max_doc` bits, set bit = live, padded to whole bytes.
pub fn write_live_docs(
    directory: &dyn Directory,
    segment: &str,
    generation: u64,
    live_docs: &FixedBitSet,
) -> Result<()> {
    let name = format!("{segment}_{generation}.liv");
    let mut out = directory.create_output(&name)?;
    format::write_header(out.as_mut(), format::CODEC_NAME, format::FORMAT_VERSION_CURRENT)?;
    out.write_vint(live_docs.len())?;
    out.write_bytes(&live_docs.to_bytes())?;
    format::write_footer(out.as_mut())?;
    out.close()?;
    Ok(())
}

pub fn read_live_docs(
    directory: &dyn Directory,
    segment: &str,
    generation: u64,
    max_doc: u32,
) -> Result<FixedBitSet> {
    let name = format!("{segment}_{generation}.liv");
    let payload = format::read_checksummed_file(directory, &name)?;
    let mut reader = BytesReader::new(&payload, &name);
    reader.check_header(format::CODEC_NAME)?;
    let num_bits = reader.read_vint()?;
    if num_bits != max_doc {
        return Err(Error::corrupt(format!(
            "{name}: live docs cover {num_bits} docs, segment has {max_doc}"
        )));
    }
    let bytes = reader.read_bytes((num_bits as usize).div_ceil(8))?;
    Ok(FixedBitSet::from_bytes(num_bits, &bytes))
}

#[cfg(test)]
mod tests {
    use store::FsDirectory;

    use super::*;

    #[test]
    fn test_live_docs_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let mut live = FixedBitSet::new_all_set(77);
        live.clear(5);
        live.clear(64);
        live.clear(76);
        write_live_docs(&dir, "_2", 4, &live).unwrap();
        assert!(dir.file_exists("_2_4.liv"));

        let read = read_live_docs(&dir, "_2", 4, 77).unwrap();
        assert_eq!(read, live);
        assert_eq!(read.count_ones(), 74);
    }

    #[test]
    fn test_live_docs_wrong_size_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let live = FixedBitSet::new_all_set(10);
        write_live_docs(&dir, "_2", 1, &live).unwrap();
        assert!(matches!(
            read_live_docs(&dir, "_2", 1, 11),
            Err(Error::CorruptIndex(_))
        ));
    }
}
