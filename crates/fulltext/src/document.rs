use crate::error::{
    Error,
    Result,
};

/// How much of the postings for a field is recorded.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum IndexOptions {
    #[default]
    None,
    Docs,
    DocsAndFreqs,
    DocsAndFreqsAndPositions,
}

impl IndexOptions {
    pub fn has_freqs(self) -> bool {
        matches!(self, Self::DocsAndFreqs | Self::DocsAndFreqsAndPositions)
    }

    pub fn has_positions(self) -> bool {
        matches!(self, Self::DocsAndFreqsAndPositions)
    }

    pub(crate) fn to_byte(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Docs => 1,
            Self::DocsAndFreqs => 2,
            Self::DocsAndFreqsAndPositions => 3,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Result<Self> {
        Ok(match b {
            0 => Self::None,
            1 => Self::Docs,
            2 => Self::DocsAndFreqs,
            3 => Self::DocsAndFreqsAndPositions,
            _ => return Err(Error::corrupt(format!("bad index options byte {b}"))),
        })
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum DocValuesType {
    #[default]
    None,
    Numeric,
    Binary,
    Sorted,
}

impl DocValuesType {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Numeric => 1,
            Self::Binary => 2,
            Self::Sorted => 3,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Result<Self> {
        Ok(match b {
            0 => Self::None,
            1 => Self::Numeric,
            2 => Self::Binary,
            3 => Self::Sorted,
            _ => return Err(Error::corrupt(format!("bad doc values type byte {b}"))),
        })
    }
}

/// Per-field indexing flags. Schema is per-field-name and must stay stable
/// within a writer buffer.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct FieldType {
    pub indexed: bool,
    pub tokenized: bool,
    pub stored: bool,
    pub index_options: IndexOptions,
    pub omit_norms: bool,
    pub doc_values: DocValuesType,
}

impl FieldType {
    /// Tokenized full-text field with frequencies, positions, and norms.
    pub const TEXT: FieldType = FieldType {
        indexed: true,
        tokenized: true,
        stored: false,
        index_options: IndexOptions::DocsAndFreqsAndPositions,
        omit_norms: false,
        doc_values: DocValuesType::None,
    };

    /// Atomic keyword field: indexed as a single term, no norms.
    pub const STRING: FieldType = FieldType {
        indexed: true,
        tokenized: false,
        stored: false,
        index_options: IndexOptions::Docs,
        omit_norms: true,
        doc_values: DocValuesType::None,
    };

    /// Numeric doc-value, not indexed into postings.
    pub const NUMERIC_DOC_VALUE: FieldType = FieldType {
        indexed: false,
        tokenized: false,
        stored: false,
        index_options: IndexOptions::None,
        omit_norms: true,
        doc_values: DocValuesType::Numeric,
    };

    pub fn stored(mut self) -> Self {
        self.stored = true;
        self
    }
}

/// A typed field value.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    ExactString(String),
    Int64(i64),
    Float(f64),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) | FieldValue::ExactString(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int64(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
    pub field_type: FieldType,
}

impl Field {
    /// Indexed, tokenized text.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Field {
            name: name.into(),
            value: FieldValue::Text(value.into()),
            field_type: FieldType::TEXT,
        }
    }

    /// Indexed, untokenized keyword.
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Field {
            name: name.into(),
            value: FieldValue::ExactString(value.into()),
            field_type: FieldType::STRING,
        }
    }

    /// Numeric doc-value used by range queries.
    pub fn numeric(name: impl Into<String>, value: i64) -> Self {
        Field {
            name: name.into(),
            value: FieldValue::Int64(value),
            field_type: FieldType::NUMERIC_DOC_VALUE,
        }
    }

    pub fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = field_type;
        self
    }
}

/// An ordered list of fields. Documents have no identity until the writer
/// assigns a segment-local doc-id at flush.
#[derive(Clone, Debug, Default)]
pub struct Document {
    fields: Vec<Field>,
}

impl Document {
    pub fn new() -> Self {
        Document { fields: Vec::new() }
    }

    pub fn add(&mut self, field: Field) -> &mut Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A stored document as returned by `document(doc_id)`: the stored-flagged
/// fields in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoredDocument {
    pub fields: Vec<(String, FieldValue)>,
}

impl StoredDocument {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}
