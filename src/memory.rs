//! The translation memory engine.
//!
//! [`TranslationMemory`] owns one index directory. Batches from the
//! ingestion channels are applied exactly once through the channel ledger
//! stored alongside the data, and fuzzy lookups run against immutable
//! snapshots so they never wait on a batch in progress.

use std::{
    collections::BTreeMap,
    path::Path,
    sync::RwLock,
};

use tantivy::{
    DocAddress,
    TantivyDocument,
    collector::{
        Count,
        TopDocs,
    },
    query::TermQuery,
    schema::IndexRecordOption,
};
use tracing::{
    debug,
    info,
};
use uuid::Uuid;

use crate::{
    batch::DataBatch,
    config::MemoryConfig,
    context::ContextVector,
    document::{
        self,
        fields,
    },
    error::{
        Error,
        Result,
    },
    ingestion::{
        self,
        ApplyReport,
        DocumentSink,
    },
    language::LanguagePair,
    ledger::ChannelLedger,
    query::{
        DefaultQueryBuilder,
        QueryBuilder,
    },
    rescorer::{
        F1BleuRescorer,
        Rescorer,
    },
    search::{
        self,
        ScoreEntry,
    },
    similarity::{
        ShortTextSimilarity,
        Similarity,
    },
    tantivy_index::SearchIndex,
};

/// Chooses the strategies a [`TranslationMemory`] is built with.
pub struct TranslationMemoryBuilder {
    config: MemoryConfig,
    query_builder: Box<dyn QueryBuilder>,
    similarity: Box<dyn Similarity>,
    rescorer: Box<dyn Rescorer>,
}

impl TranslationMemoryBuilder {
    pub fn query_builder(
        mut self,
        query_builder: impl QueryBuilder + 'static,
    ) -> Self {
        self.query_builder = Box::new(query_builder);
        self
    }

    pub fn similarity(mut self, similarity: impl Similarity + 'static) -> Self {
        self.similarity = Box::new(similarity);
        self
    }

    pub fn rescorer(mut self, rescorer: impl Rescorer + 'static) -> Self {
        self.rescorer = Box::new(rescorer);
        self
    }

    /// Open (or create) the memory stored in `dir`.
    pub fn open(self, dir: &Path) -> Result<TranslationMemory> {
        let index = SearchIndex::open(dir, self.config.writer_memory_budget)?;
        self.build(index)
    }

    /// Build a memory that lives only in RAM.
    pub fn open_in_ram(self) -> Result<TranslationMemory> {
        let index = SearchIndex::open_in_ram(self.config.writer_memory_budget)?;
        self.build(index)
    }

    fn build(self, index: SearchIndex) -> Result<TranslationMemory> {
        let ledger = load_ledger(&index)?;
        info!(
            channels = ledger.current_offsets().len(),
            similarity = ?self.similarity,
            rescorer = ?self.rescorer,
            "translation memory opened"
        );

        Ok(TranslationMemory {
            index,
            config: self.config,
            query_builder: self.query_builder,
            similarity: self.similarity,
            rescorer: self.rescorer,
            ledger: RwLock::new(ledger),
        })
    }
}

impl std::fmt::Debug for TranslationMemoryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationMemoryBuilder")
            .field("config", &self.config)
            .field("similarity", &self.similarity)
            .field("rescorer", &self.rescorer)
            .finish_non_exhaustive()
    }
}

/// An embedded fuzzy-match translation memory.
pub struct TranslationMemory {
    index: SearchIndex,
    config: MemoryConfig,
    query_builder: Box<dyn QueryBuilder>,
    similarity: Box<dyn Similarity>,
    rescorer: Box<dyn Rescorer>,
    /// Cache of the ledger document as of the last commit.
    ledger: RwLock<ChannelLedger>,
}

impl TranslationMemory {
    /// A builder with the default strategies: [`DefaultQueryBuilder`],
    /// [`ShortTextSimilarity`] and [`F1BleuRescorer`].
    pub fn builder(config: MemoryConfig) -> TranslationMemoryBuilder {
        TranslationMemoryBuilder {
            config,
            query_builder: Box::new(DefaultQueryBuilder),
            similarity: Box::new(ShortTextSimilarity),
            rescorer: Box::new(F1BleuRescorer::default()),
        }
    }

    pub fn open(dir: &Path, config: MemoryConfig) -> Result<Self> {
        Self::builder(config).open(dir)
    }

    pub fn open_in_ram(config: MemoryConfig) -> Result<Self> {
        Self::builder(config).open_in_ram()
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Best matches for `sentence` among the units visible to `user`.
    ///
    /// Runs the configured rescorer unless rescoring is disabled in the
    /// [`MemoryConfig`].
    pub fn search(
        &self,
        user: Option<Uuid>,
        direction: &LanguagePair,
        sentence: &str,
        context: Option<&ContextVector>,
        limit: usize,
    ) -> Result<Vec<ScoreEntry>> {
        let rescorer = self.config.rescore.then_some(self.rescorer.as_ref());
        self.search_with_rescorer(
            user, direction, sentence, context, limit, rescorer,
        )
    }

    /// Like [`TranslationMemory::search`], with an explicit second pass
    /// (`None` keeps retrieval order and scores).
    pub fn search_with_rescorer(
        &self,
        user: Option<Uuid>,
        direction: &LanguagePair,
        sentence: &str,
        context: Option<&ContextVector>,
        limit: usize,
        rescorer: Option<&dyn Rescorer>,
    ) -> Result<Vec<ScoreEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let fields = self.index.fields();
        let query = self.query_builder.best_matching_suggestion(
            fields, user, direction, sentence, context,
        );
        if query.terms.is_empty() {
            return Ok(Vec::new());
        }

        let fetch = self.config.fetch_size(limit);
        let searcher = self.index.searcher()?;
        let candidates = search::top_candidates(
            &searcher,
            fields,
            &query,
            self.similarity.as_ref(),
            fetch,
        )?;
        let mut entries = search::load_entries(&searcher, fields, &candidates)?;

        if let Some(rescorer) = rescorer {
            entries = rescorer.rescore(direction, sentence, entries, context);
        }
        entries.truncate(limit);

        debug!(
            %direction,
            terms = query.terms.len(),
            candidates = candidates.len(),
            returned = entries.len(),
            "search"
        );
        Ok(entries)
    }

    /// Stream every stored unit of a real memory to `consumer`.
    ///
    /// Runs over a single snapshot; the ledger document is never emitted.
    pub fn dump<F>(&self, mut consumer: F) -> Result<()>
    where
        F: FnMut(ScoreEntry),
    {
        let fields = self.index.fields();
        let searcher = self.index.searcher()?;

        for (segment_ord, segment_reader) in
            searcher.segment_readers().iter().enumerate()
        {
            let Some(memories) = segment_reader
                .fast_fields()
                .column_opt::<u64>(fields::MEMORY)?
            else {
                continue;
            };

            for doc in segment_reader.doc_ids_alive() {
                if memories.first(doc).is_none_or(|memory| memory == 0) {
                    continue;
                }
                let stored: TantivyDocument = searcher
                    .doc(DocAddress::new(segment_ord as u32, doc))?;
                consumer(document::entry_from_document(fields, &stored)?);
            }
        }
        Ok(())
    }

    /// Apply one batch from the ingestion channels.
    ///
    /// Batches are serialized. Items already covered by the ledger are
    /// skipped, so redelivering a batch is harmless. On error nothing from
    /// the batch is kept, and the batch can be retried as is.
    pub fn on_data_received(&self, batch: &DataBatch) -> Result<ApplyReport> {
        if batch.is_empty() {
            return Ok(ApplyReport::default());
        }
        let mut writer = self.index.lock_writer()?;
        self.apply_with(&mut *writer, batch)
    }

    /// Must be called with the index writer lock held.
    fn apply_with<S>(
        &self,
        sink: &mut S,
        batch: &DataBatch,
    ) -> Result<ApplyReport>
    where
        S: DocumentSink + ?Sized,
    {
        let current = self
            .ledger
            .read()
            .map_err(|_| Error::LockPoisoned("channel ledger"))?
            .clone();

        let applied = ingestion::apply_batch(
            sink,
            self.index.fields(),
            self.query_builder.as_ref(),
            &current,
            batch,
        )?;

        self.index.mark_committed(applied.opstamp);
        let mut ledger = self
            .ledger
            .write()
            .map_err(|_| Error::LockPoisoned("channel ledger"))?;
        *ledger = applied.ledger;
        Ok(applied.report)
    }

    /// Last applied offset per channel, for upstream checkpointing.
    pub fn latest_channel_positions(&self) -> Result<BTreeMap<u16, u64>> {
        let ledger = self
            .ledger
            .read()
            .map_err(|_| Error::LockPoisoned("channel ledger"))?;
        Ok(ledger.sorted())
    }

    /// Number of stored translation units.
    pub fn num_units(&self) -> Result<usize> {
        let searcher = self.index.searcher()?;
        let query = TermQuery::new(
            document::unit_term(self.index.fields()),
            IndexRecordOption::Basic,
        );
        Ok(searcher.search(&query, &Count)?)
    }

    /// Release the index. Errors are logged, never returned.
    pub fn close(self) {
        debug!("closing translation memory");
        self.index.close();
    }
}

impl std::fmt::Debug for TranslationMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationMemory")
            .field("index", &self.index)
            .field("config", &self.config)
            .field("similarity", &self.similarity)
            .field("rescorer", &self.rescorer)
            .finish_non_exhaustive()
    }
}

/// Rebuild the ledger cache from the stored ledger document, if any.
fn load_ledger(index: &SearchIndex) -> Result<ChannelLedger> {
    let fields = index.fields();
    let searcher = index.searcher()?;
    let query =
        TermQuery::new(document::ledger_term(fields), IndexRecordOption::Basic);

    let hits = searcher.search(&query, &TopDocs::with_limit(1))?;
    let Some((_, address)) = hits.first() else {
        return Ok(ChannelLedger::default());
    };
    let doc: TantivyDocument = searcher.doc(*address)?;
    Ok(ChannelLedger::new(document::ledger_from_document(fields, &doc)?))
}
