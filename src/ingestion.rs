use serde::Serialize;
use tantivy::{
    IndexWriter,
    Opstamp,
    TantivyDocument,
    Term,
    query::Query,
};
use tracing::{
    debug,
    warn,
};

use crate::{
    batch::DataBatch,
    document::{
        self,
        SchemaFields,
    },
    error::Result,
    ledger::ChannelLedger,
    query::QueryBuilder,
};

/// The write side of the index as seen by batch application.
///
/// Every mutation is staged until [`DocumentSink::commit`]; a
/// [`DocumentSink::rollback`] discards everything staged since the last
/// commit.
pub trait DocumentSink {
    fn add(&mut self, doc: TantivyDocument) -> Result<()>;
    fn delete_term(&mut self, term: Term) -> Result<()>;
    fn delete_query(&mut self, query: Box<dyn Query>) -> Result<()>;
    fn commit(&mut self) -> Result<Opstamp>;
    fn rollback(&mut self) -> Result<()>;
}

impl DocumentSink for IndexWriter {
    fn add(&mut self, doc: TantivyDocument) -> Result<()> {
        self.add_document(doc)?;
        Ok(())
    }

    fn delete_term(&mut self, term: Term) -> Result<()> {
        IndexWriter::delete_term(self, term);
        Ok(())
    }

    fn delete_query(&mut self, query: Box<dyn Query>) -> Result<()> {
        IndexWriter::delete_query(self, query)?;
        Ok(())
    }

    fn commit(&mut self) -> Result<Opstamp> {
        Ok(IndexWriter::commit(self)?)
    }

    fn rollback(&mut self) -> Result<()> {
        IndexWriter::rollback(self)?;
        Ok(())
    }
}

/// What a batch did, item by item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Units written to the index.
    pub added: usize,
    /// Added units that named a previous version. The previous version
    /// is deleted if it is stored; an unknown one makes this a plain
    /// insert, still counted here.
    pub revisions: usize,
    /// Memories whose units were all removed.
    pub deleted_memories: usize,
    /// Items at or below their channel's recorded offset, skipped.
    pub replayed: usize,
    /// Malformed items, skipped.
    pub rejected: usize,
}

/// A committed batch: its report, the ledger now on disk, and the commit
/// that made it durable.
#[derive(Debug, Clone)]
pub struct AppliedBatch {
    pub report: ApplyReport,
    pub ledger: ChannelLedger,
    pub opstamp: Opstamp,
}

/// Apply `batch` on top of the state described by `ledger`, committing
/// data and the advanced ledger together.
///
/// Every item is gated against `ledger` as it was before the batch. On
/// any failure everything staged is rolled back and the error returned;
/// `ledger` is untouched either way, so the caller swaps in
/// [`AppliedBatch::ledger`] only on success.
pub fn apply_batch<S>(
    sink: &mut S,
    fields: &SchemaFields,
    query_builder: &dyn QueryBuilder,
    ledger: &ChannelLedger,
    batch: &DataBatch,
) -> Result<AppliedBatch>
where
    S: DocumentSink + ?Sized,
{
    match stage_and_commit(sink, fields, query_builder, ledger, batch) {
        Ok(applied) => {
            debug!(
                opstamp = applied.opstamp,
                added = applied.report.added,
                revisions = applied.report.revisions,
                deleted_memories = applied.report.deleted_memories,
                replayed = applied.report.replayed,
                rejected = applied.report.rejected,
                "applied batch"
            );
            Ok(applied)
        }
        Err(e) => {
            if let Err(rollback_err) = sink.rollback() {
                warn!(
                    error = %rollback_err,
                    "rollback after failed batch failed"
                );
            }
            Err(e)
        }
    }
}

fn stage_and_commit<S>(
    sink: &mut S,
    fields: &SchemaFields,
    query_builder: &dyn QueryBuilder,
    ledger: &ChannelLedger,
    batch: &DataBatch,
) -> Result<AppliedBatch>
where
    S: DocumentSink + ?Sized,
{
    let mut report = ApplyReport::default();

    for unit in &batch.units {
        if !ledger.propose_advance(unit.channel, unit.channel_position) {
            report.replayed += 1;
            continue;
        }
        if let Err(reason) = unit.validate() {
            warn!(
                channel = unit.channel,
                position = unit.channel_position,
                memory = unit.memory,
                reason,
                "skipping malformed translation unit"
            );
            report.rejected += 1;
            continue;
        }

        if let Some(previous) = unit.previous_hash() {
            sink.delete_query(query_builder.get_by_hash(
                fields,
                unit.memory,
                &previous,
            ))?;
            report.revisions += 1;
        }
        sink.add(document::unit_document(fields, unit))?;
        report.added += 1;
    }

    for deletion in &batch.deletions {
        if !ledger.propose_advance(deletion.channel, deletion.channel_position)
        {
            report.replayed += 1;
            continue;
        }
        if let Err(reason) = deletion.validate() {
            warn!(
                channel = deletion.channel,
                position = deletion.channel_position,
                reason,
                "skipping malformed deletion"
            );
            report.rejected += 1;
            continue;
        }

        sink.delete_term(document::memory_term(fields, deletion.memory))?;
        report.deleted_memories += 1;
    }

    let advanced = ledger.merged_with(
        batch
            .channel_positions
            .iter()
            .map(|(&channel, &position)| (channel, position))
            .chain(
                batch
                    .units
                    .iter()
                    .map(|u| (u.channel, u.channel_position)),
            )
            .chain(
                batch
                    .deletions
                    .iter()
                    .map(|d| (d.channel, d.channel_position)),
            ),
    );

    sink.delete_term(document::ledger_term(fields))?;
    sink.add(document::ledger_document(fields, advanced.current_offsets()))?;
    let opstamp = sink.commit()?;

    Ok(AppliedBatch {
        report,
        ledger: advanced,
        opstamp,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::{
        BTreeMap,
        HashMap,
    };

    use super::*;
    use crate::{
        batch::{
            Deletion,
            PreviousPair,
            TranslationUnit,
        },
        error::Error,
        language::LanguagePair,
        query::DefaultQueryBuilder,
    };

    #[derive(Debug, PartialEq)]
    enum Op {
        Add(u64),
        DeleteTerm,
        DeleteQuery,
        Commit,
        Rollback,
    }

    /// Records operations; optionally fails the `fail_at`-th one.
    struct RecordingSink {
        fields: SchemaFields,
        ops: Vec<Op>,
        fail_at: Option<usize>,
    }

    impl RecordingSink {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                fields: SchemaFields::resolve(&document::build_schema())
                    .unwrap(),
                ops: Vec::new(),
                fail_at,
            }
        }

        fn record(&mut self, op: Op) -> Result<()> {
            if self.fail_at == Some(self.ops.len()) {
                return Err(Error::Io(std::io::Error::other("disk full")));
            }
            self.ops.push(op);
            Ok(())
        }
    }

    impl DocumentSink for RecordingSink {
        fn add(&mut self, doc: TantivyDocument) -> Result<()> {
            let memory = document::memory_of(&self.fields, &doc);
            self.record(Op::Add(memory))
        }

        fn delete_term(&mut self, _term: Term) -> Result<()> {
            self.record(Op::DeleteTerm)
        }

        fn delete_query(&mut self, _query: Box<dyn Query>) -> Result<()> {
            self.record(Op::DeleteQuery)
        }

        fn commit(&mut self) -> Result<Opstamp> {
            self.record(Op::Commit)?;
            Ok(self.ops.len() as Opstamp)
        }

        fn rollback(&mut self) -> Result<()> {
            self.ops.push(Op::Rollback);
            Ok(())
        }
    }

    fn unit(channel: u16, position: u64, memory: u64) -> TranslationUnit {
        TranslationUnit {
            channel,
            channel_position: position,
            memory,
            owner: None,
            direction: LanguagePair::new("en", "it").unwrap(),
            source: "the cat sat".to_string(),
            target: "il gatto sedeva".to_string(),
            previous: None,
        }
    }

    fn apply(
        sink: &mut RecordingSink,
        ledger: &ChannelLedger,
        batch: &DataBatch,
    ) -> Result<AppliedBatch> {
        let fields = sink.fields;
        apply_batch(sink, &fields, &DefaultQueryBuilder, ledger, batch)
    }

    #[test]
    fn units_then_deletions_then_ledger_then_commit() {
        let mut sink = RecordingSink::new(None);
        let batch = DataBatch {
            units: vec![unit(1, 1, 10)],
            deletions: vec![Deletion {
                channel: 1,
                channel_position: 2,
                memory: 11,
            }],
            channel_positions: BTreeMap::from([(1, 2)]),
        };

        let applied = apply(&mut sink, &ChannelLedger::default(), &batch)
            .unwrap();

        assert_eq!(
            sink.ops,
            vec![
                Op::Add(10),
                Op::DeleteTerm,
                Op::DeleteTerm,
                Op::Add(0),
                Op::Commit,
            ]
        );
        assert_eq!(applied.report.added, 1);
        assert_eq!(applied.report.deleted_memories, 1);
        assert_eq!(applied.ledger.sorted(), BTreeMap::from([(1, 2)]));
    }

    #[test]
    fn items_at_or_below_ledger_are_replayed() {
        let mut sink = RecordingSink::new(None);
        let ledger = ChannelLedger::new(HashMap::from([(1, 5)]));
        let batch = DataBatch {
            units: vec![unit(1, 4, 10), unit(1, 5, 10), unit(2, 1, 10)],
            deletions: vec![Deletion {
                channel: 1,
                channel_position: 3,
                memory: 10,
            }],
            channel_positions: BTreeMap::from([(1, 5), (2, 1)]),
        };

        let applied = apply(&mut sink, &ledger, &batch).unwrap();
        assert_eq!(applied.report.replayed, 3);
        assert_eq!(applied.report.added, 1);
        assert_eq!(applied.report.deleted_memories, 0);
        assert_eq!(applied.ledger.sorted(), BTreeMap::from([(1, 5), (2, 1)]));
    }

    #[test]
    fn previous_version_is_deleted_before_add() {
        let mut sink = RecordingSink::new(None);
        let mut revised = unit(1, 1, 10);
        revised.previous = Some(PreviousPair {
            source: "the cat".to_string(),
            target: "il gatto".to_string(),
        });
        let batch = DataBatch {
            units: vec![revised],
            ..DataBatch::default()
        };

        let applied = apply(&mut sink, &ChannelLedger::default(), &batch)
            .unwrap();
        assert_eq!(sink.ops[..2], [Op::DeleteQuery, Op::Add(10)]);
        assert_eq!(applied.report.revisions, 1);
    }

    #[test]
    fn malformed_items_are_skipped_but_advance_the_ledger() {
        let mut sink = RecordingSink::new(None);
        let mut blank = unit(1, 1, 10);
        blank.target = "  ".to_string();
        let batch = DataBatch {
            units: vec![blank, unit(1, 2, 10)],
            deletions: vec![Deletion {
                channel: 1,
                channel_position: 3,
                memory: 0,
            }],
            channel_positions: BTreeMap::new(),
        };

        let applied = apply(&mut sink, &ChannelLedger::default(), &batch)
            .unwrap();
        assert_eq!(applied.report.rejected, 2);
        assert_eq!(applied.report.added, 1);
        assert_eq!(applied.ledger.position(1), Some(3));
    }

    #[test]
    fn failure_rolls_back_and_keeps_ledger() {
        // Fail on the commit.
        let mut sink = RecordingSink::new(Some(3));
        let ledger = ChannelLedger::new(HashMap::from([(1, 1)]));
        let batch = DataBatch {
            units: vec![unit(1, 2, 10)],
            channel_positions: BTreeMap::from([(1, 2)]),
            ..DataBatch::default()
        };

        let err = apply(&mut sink, &ledger, &batch).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(sink.ops.last(), Some(&Op::Rollback));
        assert!(!sink.ops.contains(&Op::Commit));
        assert_eq!(ledger.position(1), Some(1));
    }

    #[test]
    fn tantivy_writer_as_sink() {
        use tantivy::collector::Count;

        let idx = crate::tantivy_index::SearchIndex::open_in_ram(15_000_000)
            .unwrap();
        let batch = DataBatch {
            units: vec![unit(1, 1, 10), unit(1, 2, 11)],
            channel_positions: BTreeMap::from([(1, 2)]),
            ..DataBatch::default()
        };

        let applied = {
            let mut writer = idx.lock_writer().unwrap();
            apply_batch(
                &mut *writer,
                idx.fields(),
                &DefaultQueryBuilder,
                &ChannelLedger::default(),
                &batch,
            )
            .unwrap()
        };
        idx.mark_committed(applied.opstamp);

        let searcher = idx.searcher().unwrap();
        let units = tantivy::query::TermQuery::new(
            document::unit_term(idx.fields()),
            tantivy::schema::IndexRecordOption::Basic,
        );
        let ledgers = tantivy::query::TermQuery::new(
            document::ledger_term(idx.fields()),
            tantivy::schema::IndexRecordOption::Basic,
        );
        assert_eq!(searcher.search(&units, &Count).unwrap(), 2);
        assert_eq!(searcher.search(&ledgers, &Count).unwrap(), 1);
    }
}
