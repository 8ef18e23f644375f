use std::{
    path::Path,
    sync::{
        Mutex,
        MutexGuard,
        RwLock,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
};

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    Opstamp,
    ReloadPolicy,
    Searcher,
    directory::MmapDirectory,
};
use tracing::{
    debug,
    info,
    warn,
};

use crate::{
    document::{
        self,
        SchemaFields,
    },
    error::{
        Error,
        Result,
    },
};

/// The reader state handed to queries.
struct Snapshot {
    opstamp: Opstamp,
    searcher: Searcher,
}

/// Durable full-text index holding translation units and the channel
/// ledger.
///
/// There is exactly one writer, guarded by a mutex so batches apply one
/// at a time. Readers work on immutable [`Searcher`] snapshots: after a
/// commit the next call to [`SearchIndex::searcher`] swaps in a fresh
/// snapshot, while queries still holding the previous one finish against
/// it undisturbed.
pub struct SearchIndex {
    index: Index,
    fields: SchemaFields,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    snapshot: RwLock<Snapshot>,
    committed: AtomicU64,
}

impl SearchIndex {
    /// Open or create an index in `dir`.
    ///
    /// A freshly created index is committed immediately so that later
    /// opens always find a well-formed store.
    pub fn open(dir: &Path, writer_memory_budget: usize) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let mmap_dir = MmapDirectory::open(dir)?;
        let exists = Index::exists(&mmap_dir)
            .map_err(tantivy::TantivyError::from)?;
        let index = if exists {
            Index::open(mmap_dir)?
        } else {
            info!(path = %dir.display(), "creating translation memory index");
            Index::create(
                mmap_dir,
                document::build_schema(),
                tantivy::IndexSettings::default(),
            )?
        };

        Self::from_index(index, !exists, writer_memory_budget)
    }

    /// Create an in-memory index (for testing).
    pub fn open_in_ram(writer_memory_budget: usize) -> Result<Self> {
        let index = Index::create_in_ram(document::build_schema());
        Self::from_index(index, true, writer_memory_budget)
    }

    fn from_index(
        index: Index,
        created: bool,
        writer_memory_budget: usize,
    ) -> Result<Self> {
        let fields = SchemaFields::resolve(&index.schema())?;
        document::register_tokenizers(&index);

        let mut writer: IndexWriter = index.writer(writer_memory_budget)?;
        if created {
            writer.commit()?;
        }

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let opstamp = index.load_metas()?.opstamp;
        let snapshot = Snapshot {
            opstamp,
            searcher: reader.searcher(),
        };

        Ok(Self {
            index,
            fields,
            writer: Mutex::new(writer),
            reader,
            snapshot: RwLock::new(snapshot),
            committed: AtomicU64::new(opstamp),
        })
    }

    pub fn fields(&self) -> &SchemaFields {
        &self.fields
    }

    /// Exclusive access to the single writer.
    ///
    /// Changes become visible to readers only once committed and
    /// reported through [`SearchIndex::mark_committed`].
    pub fn lock_writer(&self) -> Result<MutexGuard<'_, IndexWriter>> {
        self.writer.lock().map_err(|_| Error::LockPoisoned("index writer"))
    }

    /// Record that a commit finished, so the next reader refreshes.
    pub fn mark_committed(&self, opstamp: Opstamp) {
        self.committed.fetch_max(opstamp, Ordering::AcqRel);
    }

    /// A searcher over the latest committed state.
    ///
    /// The snapshot is reused until a newer commit has been recorded.
    pub fn searcher(&self) -> Result<Searcher> {
        let committed = self.committed.load(Ordering::Acquire);
        {
            let snapshot = self
                .snapshot
                .read()
                .map_err(|_| Error::LockPoisoned("index snapshot"))?;
            if snapshot.opstamp >= committed {
                return Ok(snapshot.searcher.clone());
            }
        }

        let mut snapshot = self
            .snapshot
            .write()
            .map_err(|_| Error::LockPoisoned("index snapshot"))?;
        if snapshot.opstamp < committed {
            self.reader.reload()?;
            *snapshot = Snapshot {
                opstamp: committed,
                searcher: self.reader.searcher(),
            };
            debug!(opstamp = committed, "refreshed index snapshot");
        }
        Ok(snapshot.searcher.clone())
    }

    /// Release the writer and reader, waiting for background merges.
    ///
    /// Failures are logged and swallowed: shutdown is best effort and must
    /// not keep the process from exiting.
    pub fn close(self) {
        let Self { writer, .. } = self;
        let writer = match writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writer.wait_merging_threads() {
            warn!(error = %e, "failed to close index writer cleanly");
        }
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex")
            .field("committed", &self.committed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
