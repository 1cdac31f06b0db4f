use fxhash::FxHashMap;
use store::Directory;

use crate::{
    codec::format::{
        self,
        BytesReader,
    },
    document::{
        DocValuesType,
        FieldType,
        IndexOptions,
    },
    error::{
        Error,
        Result,
    },
};

/// Per-field schema within one segment. Field numbers are assigned on
/// first appearance and are stable for the segment's lifetime.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldInfo {
    pub number: u32,
    pub name: String,
    pub index_options: IndexOptions,
    pub doc_values: DocValuesType,
    pub omit_norms: bool,
    pub stored: bool,
    pub tokenized: bool,
}

impl FieldInfo {
    pub fn is_indexed(&self) -> bool {
        self.index_options != IndexOptions::None
    }

    pub fn has_norms(&self) -> bool {
        self.is_indexed() && !self.omit_norms
    }
}

/// The fields of one segment, addressable by name or number.
#[derive(Clone, Debug, Default)]
pub struct FieldInfos {
    by_number: Vec<FieldInfo>,
    by_name: FxHashMap<String, u32>,
}

impl FieldInfos {
    pub fn new(mut fields: Vec<FieldInfo>) -> Result<Self> {
        fields.sort_by_key(|f| f.number);
        for (i, field) in fields.iter().enumerate() {
            if field.number != i as u32 {
                return Err(Error::corrupt(format!(
                    "field numbers not dense: {} at position {i}",
                    field.number
                )));
            }
        }
        let by_name = fields
            .iter()
            .map(|f| (f.name.clone(), f.number))
            .collect();
        Ok(Self {
            by_number: fields,
            by_name,
        })
    }

    pub fn by_number(&self, number: u32) -> Option<&FieldInfo> {
        self.by_number.get(number as usize)
    }

    pub fn by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name).map(|&n| &self.by_number[n as usize])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.by_number.iter()
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }
}

/// Assigns field numbers and enforces schema stability while documents are
/// buffered.
#[derive(Debug, Default)]
pub struct FieldInfosBuilder {
    fields: Vec<FieldInfo>,
    by_name: FxHashMap<String, u32>,
}

impl FieldInfosBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` with `field_type`, returning its number. A field
    /// seen twice must keep the same schema.
    pub fn get_or_add(&mut self, name: &str, field_type: &FieldType) -> Result<u32> {
        if let Some(&number) = self.by_name.get(name) {
            let existing = &self.fields[number as usize];
            let index_options = if field_type.indexed {
                field_type.index_options
            } else {
                IndexOptions::None
            };
            if existing.index_options != index_options
                || existing.doc_values != field_type.doc_values
                || existing.omit_norms != field_type.omit_norms
                || existing.tokenized != field_type.tokenized
            {
                return Err(Error::InvalidArgument(format!(
                    "field \"{name}\" redefined with a different schema"
                )));
            }
            return Ok(number);
        }
        let number = self.fields.len() as u32;
        self.fields.push(FieldInfo {
            number,
            name: name.to_string(),
            index_options: if field_type.indexed {
                field_type.index_options
            } else {
                IndexOptions::None
            },
            doc_values: field_type.doc_values,
            omit_norms: field_type.omit_norms,
            stored: field_type.stored,
            tokenized: field_type.tokenized,
        });
        self.by_name.insert(name.to_string(), number);
        Ok(number)
    }

    pub fn get(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name).map(|&n| &self.fields[n as usize])
    }

    pub fn by_number(&self, number: u32) -> Option<&FieldInfo> {
        self.fields.get(number as usize)
    }

    pub fn finish(&self) -> Result<FieldInfos> {
        FieldInfos::new(self.fields.clone())
    }

    pub fn clear(&mut self) {
        self.fields.clear();
        self.by_name.clear();
    }
}

const FLAG_OMIT_NORMS: u8 = 1;
const FLAG_STORED: u8 = 2;
const FLAG_TOKENIZED: u8 = 4;

/// Writes the `.fnm` file.
pub fn write_field_infos(
    directory: &dyn Directory,
    segment: &str,
    infos: &FieldInfos,
) -> Result<()> {
    let mut out = directory.create_output(&format!("{segment}.fnm"))?;
    format::write_header(out.as_mut(), format::CODEC_NAME, format::FORMAT_VERSION_CURRENT)?;
    out.write_vint(infos.len() as u32)?;
    for field in infos.iter() {
        out.write_string(&field.name)?;
        out.write_vint(field.number)?;
        out.write_byte(field.index_options.to_byte())?;
        out.write_byte(field.doc_values.to_byte())?;
        let mut flags = 0u8;
        if field.omit_norms {
            flags |= FLAG_OMIT_NORMS;
        }
        if field.stored {
            flags |= FLAG_STORED;
        }
        if field.tokenized {
            flags |= FLAG_TOKENIZED;
        }
        out.write_byte(flags)?;
    }
    format::write_footer(out.as_mut())?;
    out.close()?;
    Ok(())
}

pub fn read_field_infos(directory: &dyn Directory, segment: &str) -> Result<FieldInfos> {
    let name = format!("{segment}.fnm");
    let payload = format::read_checksummed_file(directory, &name)?;
    let mut reader = BytesReader::new(&payload, &name);
    reader.check_header(format::CODEC_NAME)?;
    let count = reader.read_vint()?;
    let mut fields = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let field_name = reader.read_string()?;
        let number = reader.read_vint()?;
        let index_options = IndexOptions::from_byte(reader.read_u8()?)?;
        let doc_values = DocValuesType::from_byte(reader.read_u8()?)?;
        let flags = reader.read_u8()?;
        fields.push(FieldInfo {
            number,
            name: field_name,
            index_options,
            doc_values,
            omit_norms: flags & FLAG_OMIT_NORMS != 0,
            stored: flags & FLAG_STORED != 0,
            tokenized: flags & FLAG_TOKENIZED != 0,
        });
    }
    FieldInfos::new(fields)
}

#[cfg(test)]
mod tests {
    use store::FsDirectory;

    use super::*;

    #[test]
    fn test_builder_assigns_dense_numbers() {
        let mut builder = FieldInfosBuilder::new();
        assert_eq!(builder.get_or_add("title", &FieldType::TEXT).unwrap(), 0);
        assert_eq!(builder.get_or_add("body", &FieldType::TEXT).unwrap(), 1);
        assert_eq!(builder.get_or_add("title", &FieldType::TEXT).unwrap(), 0);
        assert_eq!(
            builder.get_or_add("id", &FieldType::STRING).unwrap(),
            2
        );
    }

    #[test]
    fn test_builder_rejects_schema_change() {
        let mut builder = FieldInfosBuilder::new();
        builder.get_or_add("title", &FieldType::TEXT).unwrap();
        assert!(matches!(
            builder.get_or_add("title", &FieldType::STRING),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_fnm_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let mut builder = FieldInfosBuilder::new();
        builder.get_or_add("content", &FieldType::TEXT).unwrap();
        builder.get_or_add("id", &FieldType::STRING.stored()).unwrap();
        builder
            .get_or_add("price", &FieldType::NUMERIC_DOC_VALUE)
            .unwrap();
        let infos = builder.finish().unwrap();

        write_field_infos(&dir, "_3", &infos).unwrap();
        let read = read_field_infos(&dir, "_3").unwrap();
        assert_eq!(read.len(), 3);
        let content = read.by_name("content").unwrap();
        assert_eq!(content.number, 0);
        assert_eq!(
            content.index_options,
            IndexOptions::DocsAndFreqsAndPositions
        );
        assert!(content.has_norms());
        let id = read.by_name("id").unwrap();
        assert!(id.stored);
        assert!(id.omit_norms);
        assert_eq!(id.index_options, IndexOptions::Docs);
        let price = read.by_name("price").unwrap();
        assert_eq!(price.doc_values, DocValuesType::Numeric);
        assert!(!price.is_indexed());
    }
}
