/// A `(field, bytes)` pair. Terms order by field name first, then by raw
/// byte comparison of the term bytes.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Term {
    pub field: String,
    pub bytes: Vec<u8>,
}

impl Term {
    pub fn new(field: impl Into<String>, bytes: Vec<u8>) -> Self {
        Term {
            field: field.into(),
            bytes,
        }
    }

    pub fn text(field: impl Into<String>, text: &str) -> Self {
        Term {
            field: field.into(),
            bytes: text.as_bytes().to_vec(),
        }
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.field, String::from_utf8_lossy(&self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_ordering() {
        let a = Term::text("author", "zz");
        let b = Term::text("body", "aa");
        let c = Term::text("body", "ab");
        assert!(a < b);
        assert!(b < c);
    }
}
