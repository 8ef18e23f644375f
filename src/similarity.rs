//! Term weighting used to rank retrieval candidates.
//!
//! Scores are computed at query time from the index statistics of the
//! current snapshot (document frequencies, field lengths), so swapping the
//! similarity never requires reindexing.

/// A pluggable term-weighting function.
///
/// A candidate's score is the sum of [`Similarity::term_score`] over the
/// query terms it contains, multiplied by [`Similarity::coord`].
pub trait Similarity: Send + Sync + std::fmt::Debug {
    /// Weight of a term appearing in `doc_freq` of `num_docs` documents.
    ///
    /// Must be positive and non-increasing in `doc_freq`, including when
    /// `doc_freq` exceeds `num_docs`.
    fn idf(&self, doc_freq: u64, num_docs: u64) -> f32;

    /// Contribution of one matching term.
    ///
    /// `field_len` is the (approximate) token count of the candidate's
    /// source field and `avg_field_len` the average across the index.
    fn term_score(
        &self,
        idf: f32,
        term_freq: u32,
        field_len: u32,
        avg_field_len: f32,
    ) -> f32;

    /// Factor rewarding candidates that cover more of the query.
    fn coord(&self, _matched: usize, _query_terms: usize) -> f32 {
        1.0
    }
}

/// Weighting tuned for sentence-length documents.
///
/// Length normalization is switched off: segments are short and a few
/// tokens of difference say nothing about relevance. Instead, idf is
/// squared so rare shared words dominate, and the coordination factor
/// rewards candidates that cover a larger share of the query.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortTextSimilarity;

impl Similarity for ShortTextSimilarity {
    fn idf(&self, doc_freq: u64, num_docs: u64) -> f32 {
        let df = doc_freq.min(num_docs) as f32;
        1.0 + ((num_docs as f32 + 1.0) / (df + 1.0)).ln()
    }

    fn term_score(
        &self,
        idf: f32,
        term_freq: u32,
        _field_len: u32,
        _avg_field_len: f32,
    ) -> f32 {
        (term_freq as f32).sqrt() * idf * idf
    }

    fn coord(&self, matched: usize, query_terms: usize) -> f32 {
        if query_terms == 0 {
            return 0.0;
        }
        matched as f32 / query_terms as f32
    }
}

/// Okapi BM25, for comparison against [`ShortTextSimilarity`].
#[derive(Debug, Clone, Copy)]
pub struct Bm25Similarity {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Similarity {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl Similarity for Bm25Similarity {
    fn idf(&self, doc_freq: u64, num_docs: u64) -> f32 {
        let df = doc_freq.min(num_docs) as f32;
        let n = num_docs as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    fn term_score(
        &self,
        idf: f32,
        term_freq: u32,
        field_len: u32,
        avg_field_len: f32,
    ) -> f32 {
        let tf = term_freq as f32;
        let norm = if avg_field_len > 0.0 {
            1.0 - self.b + self.b * field_len as f32 / avg_field_len
        } else {
            1.0
        };
        idf * tf * (self.k1 + 1.0) / (tf + self.k1 * norm)
    }
}
