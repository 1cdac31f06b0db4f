use store::{
    Directory,
    IndexInput,
    IndexOutput,
    IoContext,
};

use crate::{
    codec::{
        field_infos::FieldInfos,
        format::{
            self,
            BytesReader,
        },
    },
    document::{
        FieldValue,
        StoredDocument,
    },
    error::{
        Error,
        Result,
    },
};

const VALUE_TEXT: u8 = 0;
const VALUE_EXACT_STRING: u8 = 1;
const VALUE_INT64: u8 = 2;
const VALUE_FLOAT: u8 = 3;
const VALUE_BYTES: u8 = 4;

/// Streams stored fields into `.fdt` (per-doc payloads) and `.fdx`
/// (per-doc offsets). Retrieval is a bolt-on; the search path never reads
/// these files.
pub struct StoredFieldsWriter {
    data: Box<dyn IndexOutput>,
    offsets: Vec<u64>,
}

impl StoredFieldsWriter {
    pub fn new(mut data: Box<dyn IndexOutput>) -> Result<Self> {
        format::write_header(data.as_mut(), format::CODEC_NAME, format::FORMAT_VERSION_CURRENT)?;
        Ok(Self {
            data,
            offsets: Vec::new(),
        })
    }

    /// Writes one document's stored fields; call once per doc-id in order.
    pub fn write_document(&mut self, fields: &[(u32, FieldValue)]) -> Result<()> {
        self.offsets.push(self.data.file_pointer());
        let out = self.data.as_mut();
        out.write_vint(fields.len() as u32)?;
        for (field_number, value) in fields {
            out.write_vint(*field_number)?;
            match value {
                FieldValue::Text(s) => {
                    out.write_byte(VALUE_TEXT)?;
                    out.write_string(s)?;
                },
                FieldValue::ExactString(s) => {
                    out.write_byte(VALUE_EXACT_STRING)?;
                    out.write_string(s)?;
                },
                FieldValue::Int64(v) => {
                    out.write_byte(VALUE_INT64)?;
                    out.write_i64(*v)?;
                },
                FieldValue::Float(v) => {
                    out.write_byte(VALUE_FLOAT)?;
                    out.write_u64(v.to_bits())?;
                },
                FieldValue::Bytes(b) => {
                    out.write_byte(VALUE_BYTES)?;
                    out.write_vint(b.len() as u32)?;
                    out.write_bytes(b)?;
                },
            }
        }
        Ok(())
    }

    pub fn finish(mut self, directory: &dyn Directory, segment: &str) -> Result<()> {
        format::write_footer(self.data.as_mut())?;
        self.data.close()?;

        let mut index = directory.create_output(&format!("{segment}.fdx"))?;
        format::write_header(index.as_mut(), format::CODEC_NAME, format::FORMAT_VERSION_CURRENT)?;
        index.write_vint(self.offsets.len() as u32)?;
        let mut prev = 0u64;
        for offset in &self.offsets {
            index.write_vlong(offset - prev)?;
            prev = *offset;
        }
        format::write_footer(index.as_mut())?;
        index.close()?;
        Ok(())
    }
}

pub struct StoredFieldsReader {
    data: Box<dyn IndexInput>,
    offsets: Vec<u64>,
}

impl StoredFieldsReader {
    pub fn open(directory: &dyn Directory, segment: &str) -> Result<Self> {
        let index_name = format!("{segment}.fdx");
        let payload = format::read_checksummed_file(directory, &index_name)?;
        let mut reader = BytesReader::new(&payload, &index_name);
        reader.check_header(format::CODEC_NAME)?;
        let count = reader.read_vint()?;
        let mut offsets = Vec::with_capacity(count as usize);
        let mut offset = 0u64;
        for _ in 0..count {
            offset += reader.read_vlong()?;
            offsets.push(offset);
        }
        let data = directory.open_input(&format!("{segment}.fdt"), IoContext::Read)?;
        Ok(Self { data, offsets })
    }

    pub fn document(&self, doc: u32, field_infos: &FieldInfos) -> Result<StoredDocument> {
        let offset = *self
            .offsets
            .get(doc as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("doc {doc} out of range")))?;
        let mut input = self.data.clone_input();
        input.seek(offset)?;
        let field_count = input.read_vint()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let field_number = input.read_vint()?;
            let name = field_infos
                .by_number(field_number)
                .map(|f| f.name.clone())
                .ok_or_else(|| {
                    Error::corrupt(format!("stored field references unknown field {field_number}"))
                })?;
            let value = match input.read_byte()? {
                VALUE_TEXT => FieldValue::Text(input.read_string()?),
                VALUE_EXACT_STRING => FieldValue::ExactString(input.read_string()?),
                VALUE_INT64 => FieldValue::Int64(input.read_i64()?),
                VALUE_FLOAT => FieldValue::Float(f64::from_bits(input.read_u64()?)),
                VALUE_BYTES => {
                    let len = input.read_vint()? as usize;
                    let mut buf = vec![0u8; len];
                    input.read_bytes(&mut buf)?;
                    FieldValue::Bytes(buf)
                },
                other => return Err(Error::corrupt(format!("bad stored value tag {other}"))),
            };
            fields.push((name, value));
        }
        Ok(StoredDocument { fields })
    }
}

#[cfg(test)]
mod tests {
    use store::FsDirectory;

    use super::*;
    use crate::{
        codec::field_infos::FieldInfosBuilder,
        document::FieldType,
    };

    #[test]
    fn test_stored_fields_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let mut builder = FieldInfosBuilder::new();
        let title = builder
            .get_or_add("title", &FieldType::TEXT.stored())
            .unwrap();
        let count = builder
            .get_or_add("count", &FieldType::NUMERIC_DOC_VALUE.stored())
            .unwrap();
        let infos = builder.finish().unwrap();

        let data = dir.create_output("_0.fdt").unwrap();
        let mut writer = StoredFieldsWriter::new(data).unwrap();
        writer
            .write_document(&[
                (title, FieldValue::Text("hello world".into())),
                (count, FieldValue::Int64(-42)),
            ])
            .unwrap();
        writer
            .write_document(&[(title, FieldValue::Text("second doc".into()))])
            .unwrap();
        writer.finish(&dir, "_0").unwrap();

        let reader = StoredFieldsReader::open(&dir, "_0").unwrap();
        let doc0 = reader.document(0, &infos).unwrap();
        assert_eq!(
            doc0.get("title"),
            Some(&FieldValue::Text("hello world".into()))
        );
        assert_eq!(doc0.get("count"), Some(&FieldValue::Int64(-42)));
        let doc1 = reader.document(1, &infos).unwrap();
        assert_eq!(doc1.fields.len(), 1);
        assert!(reader.document(2, &infos).is_err());
    }
}
