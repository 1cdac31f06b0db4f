use crate::codec::norms::decode_norm;

pub const K1: f32 = 1.2;
pub const B: f32 = 0.75;

/// `ln(1 + (N - df + 0.5) / (df + 0.5))` over collection-wide sums.
pub fn idf(doc_freq: u64, doc_count: u64) -> f32 {
    let doc_freq = doc_freq as f64;
    let doc_count = doc_count as f64;
    (1.0 + (doc_count - doc_freq + 0.5) / (doc_freq + 0.5)).ln() as f32
}

/// Upper bound on the frequency-dependent BM25 factor for any document
/// length: the length term `1 - b + b·dl/avgdl` is at least `1 - b`, so
/// `freq·(k1+1) / (freq + k1·(1-b))` dominates the true contribution no
/// matter which collection average is in effect at search time. The codec
/// stores this per block for WAND.
pub fn term_saturation_bound(freq: u32) -> f32 {
    let freq = freq as f32;
    freq * (K1 + 1.0) / (freq + K1 * (1.0 - B))
}

/// Query-time BM25 state for one term: IDF and boost folded together, plus
/// a per-norm-byte cache of the length-normalization denominator term.
#[derive(Clone, Debug)]
pub struct Bm25Scorer {
    weight: f32,
    /// `k1 * (1 - b + b * dl / avgdl)` for each possible norm byte.
    norm_cache: [f32; 256],
}

impl Bm25Scorer {
    pub fn new(boost: f32, idf: f32, avg_doc_length: f32) -> Self {
        let mut norm_cache = [0f32; 256];
        for (norm, slot) in norm_cache.iter_mut().enumerate() {
            let doc_length = decode_norm(norm as u8);
            *slot = K1 * (1.0 - B + B * doc_length / avg_doc_length);
        }
        Self {
            weight: boost * idf,
            norm_cache,
        }
    }

    /// Score a match with `freq` occurrences in a doc whose norm byte is
    /// `norm`. `norm == 0` means norms were omitted (doc length 1).
    pub fn score(&self, freq: f32, norm: u8) -> f32 {
        self.weight * freq * (K1 + 1.0) / (freq + self.norm_cache[norm as usize])
    }

    /// Upper bound for any doc given an upper bound on freq contribution.
    pub fn max_score(&self, saturation_bound: f32) -> f32 {
        self.weight * saturation_bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idf_decreases_with_doc_freq() {
        let n = 1000;
        assert!(idf(1, n) > idf(10, n));
        assert!(idf(10, n) > idf(500, n));
        assert!(idf(1000, n) > 0.0);
    }

    #[test]
    fn test_shorter_doc_scores_higher() {
        let scorer = Bm25Scorer::new(1.0, 1.0, 10.0);
        let short = crate::codec::norms::encode_norm(2);
        let long = crate::codec::norms::encode_norm(50);
        assert!(scorer.score(1.0, short) > scorer.score(1.0, long));
    }

    #[test]
    fn test_saturation_bound_dominates_score() {
        // The stored bound must dominate the real contribution for every
        // norm byte and any average length.
        for avg in [1.0f32, 5.0, 42.0, 1000.0] {
            let scorer = Bm25Scorer::new(1.0, 1.0, avg);
            for freq in [1u32, 2, 3, 10, 100] {
                let bound = scorer.max_score(term_saturation_bound(freq));
                for norm in 0u8..=255 {
                    let score = scorer.score(freq as f32, norm);
                    assert!(
                        score <= bound + 1e-5,
                        "freq {freq} norm {norm} avg {avg}: {score} > {bound}"
                    );
                }
            }
        }
    }
}
