//! transmem - an embedded fuzzy-match translation memory.
//!
//! transmem stores (source, target) sentence pairs in a
//! [Tantivy](https://github.com/quickwit-oss/tantivy) index and returns the
//! stored translations closest to a new sentence. Pairs arrive in batches
//! from ordered ingestion channels; a per-channel ledger committed together
//! with the data makes every batch apply exactly once, even when it is
//! redelivered after a crash.
//!
//! # Quick start
//!
//! ```no_run
//! use transmem::{DataDir, LanguagePair, MemoryConfig, TranslationMemory};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let memory = TranslationMemory::open(
//!     &data_dir.index_dir().unwrap(),
//!     MemoryConfig::default(),
//! )
//! .unwrap();
//!
//! let direction = LanguagePair::new("en", "it").unwrap();
//! let results = memory
//!     .search(None, &direction, "The cat sat on the mat.", None, 5)
//!     .unwrap();
//! for r in &results {
//!     println!("{:.3} {} -> {}", r.score, r.source, r.target);
//! }
//! memory.close();
//! ```

pub mod batch;
pub mod config;
pub mod content_hash;
pub mod context;
pub mod data_dir;
pub mod document;
pub mod error;
pub mod ingestion;
pub mod language;
pub mod ledger;
pub mod memory;
pub mod query;
pub mod rescorer;
pub mod search;
pub mod similarity;
pub mod tantivy_index;

pub use batch::{DataBatch, Deletion, PreviousPair, TranslationUnit};
pub use config::MemoryConfig;
pub use context::{ContextScore, ContextVector};
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use ingestion::ApplyReport;
pub use language::LanguagePair;
pub use memory::{TranslationMemory, TranslationMemoryBuilder};
pub use rescorer::{F1BleuRescorer, Rescorer};
pub use search::ScoreEntry;
pub use similarity::{Bm25Similarity, ShortTextSimilarity, Similarity};
pub use tantivy_index::SearchIndex;
