//! The on-disk segment format: postings, term dictionary, norms, numeric
//! doc-values, field infos, segment info, live docs, and stored fields.
//! One codec identity ("Lucene104") covers a segment; every file opens
//! with the shared magic and closes with a checksum footer.

pub mod doc_values;
pub mod field_infos;
pub mod for_util;
pub mod format;
pub mod fst_util;
pub mod live_docs;
pub mod norms;
pub mod postings;
pub mod segment_info;
pub mod stored_fields;
pub mod term_dict;

#[cfg(test)]
pub(crate) mod test_util;
