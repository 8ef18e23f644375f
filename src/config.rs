/// Default number of candidates fetched before rescoring.
pub const DEFAULT_MIN_QUERY_SIZE: usize = 10;

/// Default heap handed to the index writer.
pub const DEFAULT_WRITER_MEMORY_BUDGET: usize = 50_000_000;

/// Tunables of a [`TranslationMemory`](crate::memory::TranslationMemory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Lower bound on the number of candidates retrieved per query. The
    /// search fetches `max(min_query_size, 2 * limit)` so the rescorer has
    /// room to promote matches the first pass ranked low.
    pub min_query_size: usize,
    /// Bytes of indexing heap for the writer.
    pub writer_memory_budget: usize,
    /// Whether queries run the configured rescorer.
    pub rescore: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            min_query_size: DEFAULT_MIN_QUERY_SIZE,
            writer_memory_budget: DEFAULT_WRITER_MEMORY_BUDGET,
            rescore: true,
        }
    }
}

impl MemoryConfig {
    /// Number of candidates to retrieve for a request of `limit` results.
    pub fn fetch_size(&self, limit: usize) -> usize {
        self.min_query_size.max(limit.saturating_mul(2))
    }
}
