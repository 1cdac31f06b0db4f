use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::Mutex;
use store::{
    Directory,
    IndexInput,
    IoContext,
};

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

/// Encodes a tokenized field length into a norm byte: `127 / sqrt(length)`
/// clamped to `[1, 127]`, with zero-length fields encoding to 127 like
/// single-token ones. Larger byte means shorter document.
pub fn encode_norm(length: u32) -> u8 {
    if length == 0 {
        return 127;
    }
    let norm = (127.0 / (length as f32).sqrt()).round();
    norm.clamp(1.0, 127.0) as u8
}

/// Inverse of `encode_norm`, up to sqrt quantization: the approximate doc
/// length `(127 / norm)^2`. A zero byte means norms were omitted; treat the
/// doc as length 1.
pub fn decode_norm(norm: u8) -> f32 {
    if norm == 0 {
        return 1.0;
    }
    let ratio = 127.0 / norm as f32;
    ratio * ratio
}

/// Writes `.nvd` (dense byte-per-doc streams) and `.nvm` (per-field
/// offsets). `fields` maps field number to its `max_doc`-length norm array,
/// in field-number order.
pub fn write_norms(
    directory: &dyn Directory,
    segment: &str,
    fields: &[(u32, Vec<u8>)],
) -> Result<()> {
    let mut data = directory.create_output(&format!("{segment}.nvd"))?;
    format::write_header(data.as_mut(), format::CODEC_NAME, format::FORMAT_VERSION_CURRENT)?;
    let mut meta_entries = Vec::with_capacity(fields.len());
    for (field_number, norms) in fields {
        meta_entries.push((*field_number, data.file_pointer(), norms.len() as u64));
        data.write_bytes(norms)?;
    }
    format::write_footer(data.as_mut())?;
    data.close()?;

    let mut meta = directory.create_output(&format!("{segment}.nvm"))?;
    format::write_header(meta.as_mut(), format::CODEC_NAME, format::FORMAT_VERSION_CURRENT)?;
    meta.write_vint(meta_entries.len() as u32)?;
    for (field_number, offset, len) in meta_entries {
        meta.write_vint(field_number)?;
        meta.write_vlong(offset)?;
        meta.write_vlong(len)?;
    }
    format::write_footer(meta.as_mut())?;
    meta.close()?;
    Ok(())
}

/// Per-segment norms: lazily loads each field's byte array on first use.
pub struct NormsReader {
    data: Box<dyn IndexInput>,
    entries: FxHashMap<u32, (u64, u64)>,
    cache: Mutex<FxHashMap<u32, Arc<Vec<u8>>>>,
}

impl NormsReader {
    pub fn open(directory: &dyn Directory, segment: &str) -> Result<Self> {
        let meta_name = format!("{segment}.nvm");
        let payload = format::read_checksummed_file(directory, &meta_name)?;
        let mut reader = BytesReader::new(&payload, &meta_name);
        reader.check_header(format::CODEC_NAME)?;
        let count = reader.read_vint()?;
        let mut entries = FxHashMap::default();
        for _ in 0..count {
            let field_number = reader.read_vint()?;
            let offset = reader.read_vlong()?;
            let len = reader.read_vlong()?;
            entries.insert(field_number, (offset, len));
        }
        let data = directory.open_input(&format!("{segment}.nvd"), IoContext::Read)?;
        Ok(Self {
            data,
            entries,
            cache: Mutex::new(FxHashMap::default()),
        })
    }

    /// The field's norm bytes, one per doc, or `None` if the field stored
    /// no norms in this segment.
    pub fn norms(&self, field_number: u32) -> Result<Option<Arc<Vec<u8>>>> {
        let Some(&(offset, len)) = self.entries.get(&field_number) else {
            return Ok(None);
        };
        if let Some(cached) = self.cache.lock().get(&field_number) {
            return Ok(Some(cached.clone()));
        }
        let mut input = self.data.clone_input();
        input.seek(offset)?;
        let mut bytes = vec![0u8; len as usize];
        input.read_bytes(&mut bytes).map_err(|e| {
            Error::corrupt(format!("norms for field {field_number} truncated: {e}"))
        })?;
        let bytes = Arc::new(bytes);
        self.cache.lock().insert(field_number, bytes.clone());
        Ok(Some(bytes))
    }
}

#[cfg(test)]
mod tests {
    use store::FsDirectory;

    use super::*;

    #[test]
    fn test_encode_norm_boundaries() {
        assert_eq!(encode_norm(0), 127);
        assert_eq!(encode_norm(1), 127);
        assert!(encode_norm(2) < 127);
        assert_eq!(encode_norm(u32::MAX), 1);
    }

    #[test]
    fn test_norm_roundtrip_within_sqrt_quantization() {
        for length in 1u32..=2000 {
            let decoded = decode_norm(encode_norm(length));
            let ratio = decoded / length as f32;
            assert!(
                (0.7..=1.4).contains(&ratio),
                "length {length} decoded to {decoded} (ratio {ratio})"
            );
            // Re-encoding the decoded length is stable.
            assert_eq!(
                encode_norm(decoded.round() as u32),
                encode_norm(length),
                "length {length}"
            );
        }
    }

    #[test]
    fn test_longer_docs_get_smaller_norms() {
        let mut last = encode_norm(1);
        for length in [2u32, 4, 10, 50, 200, 1000, 10_000] {
            let norm = encode_norm(length);
            assert!(norm <= last, "length {length}");
            last = norm;
        }
    }

    #[test]
    fn test_norms_file_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let field0: Vec<u8> = (0..100).map(|i| encode_norm(i + 1)).collect();
        let field2: Vec<u8> = (0..100).map(|i| encode_norm((i % 7) + 1)).collect();
        write_norms(&dir, "_0", &[(0, field0.clone()), (2, field2.clone())]).unwrap();

        let reader = NormsReader::open(&dir, "_0").unwrap();
        assert_eq!(*reader.norms(0).unwrap().unwrap(), field0);
        assert_eq!(*reader.norms(2).unwrap().unwrap(), field2);
        assert!(reader.norms(1).unwrap().is_none());
    }
}
