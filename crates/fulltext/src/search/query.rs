use std::fmt;

use crate::index::Term;

/// Whether a Boolean clause must, should, or must not match, and whether
/// it contributes to the score.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Occur {
    /// Required and scoring.
    Must,
    /// Optional and scoring.
    Should,
    /// Required to be absent; never scores.
    MustNot,
    /// Required and non-scoring.
    Filter,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct BooleanClause {
    pub query: Query,
    pub occur: Occur,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TermQuery {
    pub term: Term,
}

impl TermQuery {
    pub fn new(term: Term) -> Self {
        Self { term }
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct BooleanQuery {
    pub clauses: Vec<BooleanClause>,
    pub min_should_match: u32,
}

impl BooleanQuery {
    pub fn builder() -> BooleanQueryBuilder {
        BooleanQueryBuilder::default()
    }
}

#[derive(Default)]
pub struct BooleanQueryBuilder {
    clauses: Vec<BooleanClause>,
    min_should_match: u32,
}

impl BooleanQueryBuilder {
    pub fn add(mut self, query: Query, occur: Occur) -> Self {
        self.clauses.push(BooleanClause { query, occur });
        self
    }

    pub fn min_should_match(mut self, count: u32) -> Self {
        self.min_should_match = count;
        self
    }

    pub fn build(self) -> Query {
        Query::Boolean(BooleanQuery {
            clauses: self.clauses,
            min_should_match: self.min_should_match,
        })
    }
}

/// Terms that must appear at fixed relative positions. Built terms get
/// consecutive offsets.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PhraseQuery {
    pub field: String,
    /// `(term bytes, expected offset)` pairs.
    pub terms: Vec<(Vec<u8>, u32)>,
}

impl PhraseQuery {
    pub fn builder(field: impl Into<String>) -> PhraseQueryBuilder {
        PhraseQueryBuilder {
            field: field.into(),
            terms: Vec::new(),
        }
    }
}

pub struct PhraseQueryBuilder {
    field: String,
    terms: Vec<(Vec<u8>, u32)>,
}

impl PhraseQueryBuilder {
    pub fn add(mut self, text: &str) -> Self {
        let offset = self.terms.len() as u32;
        self.terms.push((text.as_bytes().to_vec(), offset));
        self
    }

    pub fn build(self) -> Query {
        Query::Phrase(PhraseQuery {
            field: self.field,
            terms: self.terms,
        })
    }
}

/// Matches docs whose numeric doc-value lies in the given range.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct NumericRangeQuery {
    pub field: String,
    pub lower: Option<i64>,
    pub upper: Option<i64>,
    pub include_lower: bool,
    pub include_upper: bool,
}

impl NumericRangeQuery {
    /// Closed range `[lower, upper]`; `None` leaves that end open.
    pub fn new(field: impl Into<String>, lower: Option<i64>, upper: Option<i64>) -> Self {
        Self {
            field: field.into(),
            lower,
            upper,
            include_lower: true,
            include_upper: true,
        }
    }

    pub fn exclusive(mut self, include_lower: bool, include_upper: bool) -> Self {
        self.include_lower = include_lower;
        self.include_upper = include_upper;
        self
    }

    /// The effective closed bounds, or `None` for a provably empty range.
    pub(crate) fn closed_bounds(&self) -> Option<(i64, i64)> {
        let lower = match (self.lower, self.include_lower) {
            (None, _) => i64::MIN,
            (Some(v), true) => v,
            (Some(v), false) => v.checked_add(1)?,
        };
        let upper = match (self.upper, self.include_upper) {
            (None, _) => i64::MAX,
            (Some(v), true) => v,
            (Some(v), false) => v.checked_sub(1)?,
        };
        (lower <= upper).then_some((lower, upper))
    }
}

/// Immutable query tree. The variant set is closed; evaluation dispatches
/// statically.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Query {
    Term(TermQuery),
    Boolean(BooleanQuery),
    Phrase(PhraseQuery),
    NumericRange(NumericRangeQuery),
    /// Matches no documents; the rewrite target for degenerate queries.
    MatchNone,
}

impl Query {
    pub fn term(field: impl Into<String>, text: &str) -> Query {
        Query::Term(TermQuery::new(Term::text(field, text)))
    }

    /// One canonicalization step. Callers iterate to a fixed point.
    pub fn rewrite(&self) -> Query {
        match self {
            Query::Boolean(boolean) => {
                let clauses: Vec<BooleanClause> = boolean
                    .clauses
                    .iter()
                    .map(|c| BooleanClause {
                        query: c.query.rewrite(),
                        occur: c.occur,
                    })
                    .collect();
                if clauses.is_empty() {
                    return Query::MatchNone;
                }
                // A lone positive clause collapses to its query.
                if clauses.len() == 1
                    && boolean.min_should_match <= 1
                    && matches!(clauses[0].occur, Occur::Must | Occur::Should)
                {
                    return clauses[0].query.clone();
                }
                // Nothing positive can ever match.
                if clauses
                    .iter()
                    .all(|c| matches!(c.occur, Occur::MustNot))
                {
                    return Query::MatchNone;
                }
                Query::Boolean(BooleanQuery {
                    clauses,
                    min_should_match: boolean.min_should_match,
                })
            },
            Query::Phrase(phrase) => {
                if phrase.terms.is_empty() {
                    return Query::MatchNone;
                }
                if phrase.terms.len() == 1 {
                    return Query::Term(TermQuery::new(Term::new(
                        phrase.field.clone(),
                        phrase.terms[0].0.clone(),
                    )));
                }
                self.clone()
            },
            Query::NumericRange(range) => {
                if range.closed_bounds().is_none() {
                    return Query::MatchNone;
                }
                self.clone()
            },
            Query::Term(_) | Query::MatchNone => self.clone(),
        }
    }

    /// Rewrites to a fixed point.
    pub fn rewritten(&self) -> Query {
        let mut current = self.clone();
        loop {
            let next = current.rewrite();
            if next == current {
                return current;
            }
            current = next;
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Term(q) => write!(f, "{}", q.term),
            Query::Boolean(q) => {
                write!(f, "(")?;
                for (i, clause) in q.clauses.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    let prefix = match clause.occur {
                        Occur::Must => "+",
                        Occur::Should => "",
                        Occur::MustNot => "-",
                        Occur::Filter => "#",
                    };
                    write!(f, "{prefix}{}", clause.query)?;
                }
                write!(f, ")")
            },
            Query::Phrase(q) => {
                write!(f, "{}:\"", q.field)?;
                for (i, (term, _)) in q.terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", String::from_utf8_lossy(term))?;
                }
                write!(f, "\"")
            },
            Query::NumericRange(q) => {
                let open = if q.include_lower { "[" } else { "{" };
                let close = if q.include_upper { "]" } else { "}" };
                write!(
                    f,
                    "{}:{open}{} TO {}{close}",
                    q.field,
                    q.lower.map_or("*".to_string(), |v| v.to_string()),
                    q.upper.map_or("*".to_string(), |v| v.to_string()),
                )
            },
            Query::MatchNone => write!(f, "<none>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_clause_boolean_collapses() {
        let inner = Query::term("content", "apple");
        let query = BooleanQuery::builder()
            .add(inner.clone(), Occur::Must)
            .build();
        assert_eq!(query.rewritten(), inner);

        let query = BooleanQuery::builder()
            .add(inner.clone(), Occur::Should)
            .build();
        assert_eq!(query.rewritten(), inner);
    }

    #[test]
    fn test_empty_and_negative_booleans_match_none() {
        assert_eq!(
            BooleanQuery::builder().build().rewritten(),
            Query::MatchNone
        );
        let query = BooleanQuery::builder()
            .add(Query::term("content", "x"), Occur::MustNot)
            .build();
        assert_eq!(query.rewritten(), Query::MatchNone);
    }

    #[test]
    fn test_single_term_phrase_collapses() {
        let query = PhraseQuery::builder("content").add("apple").build();
        assert_eq!(query.rewritten(), Query::term("content", "apple"));
    }

    #[test]
    fn test_nested_rewrite_reaches_fixed_point() {
        // boolean(boolean(phrase(one-term))) -> term
        let inner = PhraseQuery::builder("content").add("apple").build();
        let mid = BooleanQuery::builder().add(inner, Occur::Should).build();
        let outer = BooleanQuery::builder().add(mid, Occur::Must).build();
        assert_eq!(outer.rewritten(), Query::term("content", "apple"));
    }

    #[test]
    fn test_range_bounds_normalization() {
        let range = NumericRangeQuery::new("price", Some(5), Some(10));
        assert_eq!(range.closed_bounds(), Some((5, 10)));
        let range = NumericRangeQuery::new("price", Some(5), Some(10)).exclusive(false, false);
        assert_eq!(range.closed_bounds(), Some((6, 9)));
        let range = NumericRangeQuery::new("price", Some(5), Some(5)).exclusive(false, true);
        assert_eq!(range.closed_bounds(), None);
        let range = NumericRangeQuery::new("price", None, None);
        assert_eq!(range.closed_bounds(), Some((i64::MIN, i64::MAX)));
    }
}
