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
    error::Result,
    util::bitset::FixedBitSet,
};

/// Writes `.dvd` / `.dvm` numeric doc-values. Each field stores a presence
/// bitmap (docs carrying a value) followed by a dense `i64` per doc.
pub fn write_doc_values(
    directory: &dyn Directory,
    segment: &str,
    max_doc: u32,
    fields: &[(u32, Vec<Option<i64>>)],
) -> Result<()> {
    let mut data = directory.create_output(&format!("{segment}.dvd"))?;
    format::write_header(data.as_mut(), format::CODEC_NAME, format::FORMAT_VERSION_CURRENT)?;
    let mut entries = Vec::with_capacity(fields.len());
    for (field_number, values) in fields {
        debug_assert_eq!(values.len(), max_doc as usize);
        let offset = data.file_pointer();
        let mut present = FixedBitSet::new_all_clear(max_doc);
        for (doc, value) in values.iter().enumerate() {
            if value.is_some() {
                present.set(doc as u32);
            }
        }
        data.write_bytes(&present.to_bytes())?;
        for value in values {
            data.write_i64(value.unwrap_or(0))?;
        }
        entries.push((*field_number, offset, data.file_pointer() - offset));
    }
    format::write_footer(data.as_mut())?;
    data.close()?;

    let mut meta = directory.create_output(&format!("{segment}.dvm"))?;
    format::write_header(meta.as_mut(), format::CODEC_NAME, format::FORMAT_VERSION_CURRENT)?;
    meta.write_vint(entries.len() as u32)?;
    for (field_number, offset, len) in entries {
        meta.write_vint(field_number)?;
        meta.write_vlong(offset)?;
        meta.write_vlong(len)?;
    }
    format::write_footer(meta.as_mut())?;
    meta.close()?;
    Ok(())
}

/// Random-access numeric values for one field.
#[derive(Clone, Debug)]
pub struct NumericDocValues {
    present: Arc<FixedBitSet>,
    values: Arc<Vec<i64>>,
}

impl NumericDocValues {
    pub fn get(&self, doc: u32) -> Option<i64> {
        self.present
            .get(doc)
            .then(|| self.values[doc as usize])
    }
}

/// Per-segment doc-values: metadata parsed at open, per-field arrays
/// loaded lazily.
pub struct DocValuesReader {
    data: Box<dyn IndexInput>,
    max_doc: u32,
    entries: FxHashMap<u32, (u64, u64)>,
    cache: Mutex<FxHashMap<u32, NumericDocValues>>,
}

impl DocValuesReader {
    pub fn open(directory: &dyn Directory, segment: &str, max_doc: u32) -> Result<Self> {
        let meta_name = format!("{segment}.dvm");
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
        let data = directory.open_input(&format!("{segment}.dvd"), IoContext::Read)?;
        Ok(Self {
            data,
            max_doc,
            entries,
            cache: Mutex::new(FxHashMap::default()),
        })
    }

    pub fn numeric(&self, field_number: u32) -> Result<Option<NumericDocValues>> {
        let Some(&(offset, _len)) = self.entries.get(&field_number) else {
            return Ok(None);
        };
        if let Some(cached) = self.cache.lock().get(&field_number) {
            return Ok(Some(cached.clone()));
        }
        let mut input = self.data.clone_input();
        input.seek(offset)?;
        let bitmap_len = (self.max_doc as usize).div_ceil(8);
        let mut bitmap = vec![0u8; bitmap_len];
        input.read_bytes(&mut bitmap)?;
        let present = FixedBitSet::from_bytes(self.max_doc, &bitmap);
        let mut values = Vec::with_capacity(self.max_doc as usize);
        for _ in 0..self.max_doc {
            values.push(input.read_i64()?);
        }
        let dv = NumericDocValues {
            present: Arc::new(present),
            values: Arc::new(values),
        };
        self.cache.lock().insert(field_number, dv.clone());
        Ok(Some(dv))
    }
}

#[cfg(test)]
mod tests {
    use store::FsDirectory;

    use super::*;

    #[test]
    fn test_doc_values_roundtrip_with_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let values: Vec<Option<i64>> = (0..100)
            .map(|i| (i % 3 != 0).then_some(i as i64 * 7 - 50))
            .collect();
        write_doc_values(&dir, "_0", 100, &[(1, values.clone())]).unwrap();

        let reader = DocValuesReader::open(&dir, "_0", 100).unwrap();
        let dv = reader.numeric(1).unwrap().unwrap();
        for (doc, expected) in values.iter().enumerate() {
            assert_eq!(dv.get(doc as u32), *expected, "doc {doc}");
        }
        assert!(reader.numeric(0).unwrap().is_none());
    }
}
