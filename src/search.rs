use std::{
    cmp::{
        Ordering,
        Reverse,
    },
    collections::BinaryHeap,
};

use serde::{
    Deserialize,
    Serialize,
};
use tantivy::{
    DocAddress,
    DocSet,
    Searcher,
    TERMINATED,
    TantivyDocument,
    postings::Postings,
    query::EnableScoring,
    schema::IndexRecordOption,
};
use uuid::Uuid;

use crate::{
    document::{
        self,
        SchemaFields,
        fields,
    },
    error::Result,
    language::LanguagePair,
    query::MatchQuery,
    similarity::Similarity,
};

/// A stored translation unit returned by a query or a dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub memory: u64,
    pub direction: LanguagePair,
    pub source: String,
    pub target: String,
    pub score: f32,
    /// Owner of the private memory the unit lives in; `None` if public.
    pub owner: Option<Uuid>,
}

/// A retrieval hit before its stored fields are loaded.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub score: f32,
    pub address: DocAddress,
}

// Higher score first; on ties the earlier document wins.
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.address.cmp(&self.address))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Collect the `limit` best candidates for `query`, ranked by
/// `similarity`.
///
/// The boolean query only decides which documents match. Each match is
/// then scored from the snapshot's own statistics: document frequencies
/// for idf, postings for term frequencies, fieldnorms for length, and the
/// `memory` fast field for the context boost.
pub fn top_candidates(
    searcher: &Searcher,
    fields: &SchemaFields,
    query: &MatchQuery,
    similarity: &dyn Similarity,
    limit: usize,
) -> Result<Vec<Candidate>> {
    if limit == 0 || query.terms.is_empty() {
        return Ok(Vec::new());
    }

    // Document frequencies and token totals still count deleted documents
    // until a merge, so the document count has to include them too.
    let mut num_docs = 0u64;
    let mut total_tokens = 0u64;
    for segment_reader in searcher.segment_readers() {
        num_docs += u64::from(segment_reader.max_doc());
        total_tokens += segment_reader
            .inverted_index(fields.source)?
            .total_num_tokens();
    }
    let avg_field_len = if num_docs == 0 {
        0.0
    } else {
        total_tokens as f32 / num_docs as f32
    };

    let mut idfs = Vec::with_capacity(query.terms.len());
    for t in &query.terms {
        idfs.push(similarity.idf(searcher.doc_freq(&t.term)?, num_docs));
    }

    let weight = query
        .query
        .weight(EnableScoring::disabled_from_searcher(searcher))?;

    let capacity = usize::try_from(num_docs)
        .unwrap_or(usize::MAX)
        .min(limit)
        .saturating_add(1);
    let mut heap: BinaryHeap<Reverse<Candidate>> =
        BinaryHeap::with_capacity(capacity);

    for (segment_ord, segment_reader) in
        searcher.segment_readers().iter().enumerate()
    {
        let inverted_index = segment_reader.inverted_index(fields.source)?;
        let mut postings = Vec::with_capacity(query.terms.len());
        for t in &query.terms {
            postings.push(
                inverted_index
                    .read_postings(&t.term, IndexRecordOption::WithFreqs)?,
            );
        }
        if postings.iter().all(Option::is_none) {
            continue;
        }
        let fieldnorms = segment_reader.get_fieldnorms_reader(fields.source)?;
        // A segment holding only the ledger has no memory column.
        let memories = segment_reader
            .fast_fields()
            .column_opt::<u64>(fields::MEMORY)?;
        let alive = segment_reader.alive_bitset();

        let mut scorer = weight.scorer(segment_reader, 1.0)?;
        let mut doc = scorer.doc();
        while doc != TERMINATED {
            if alive.is_none_or(|bits| bits.is_alive(doc)) {
                let field_len = fieldnorms.fieldnorm(doc);
                let mut total = 0.0f32;
                let mut matched = 0usize;

                for ((posting, term), idf) in
                    postings.iter_mut().zip(&query.terms).zip(&idfs)
                {
                    let Some(posting) = posting else { continue };
                    if posting.doc() < doc {
                        posting.seek(doc);
                    }
                    if posting.doc() == doc {
                        matched += 1;
                        total += term.weight
                            * similarity.term_score(
                                *idf,
                                posting.term_freq(),
                                field_len,
                                avg_field_len,
                            );
                    }
                }

                let memory = memories
                    .as_ref()
                    .and_then(|column| column.first(doc))
                    .unwrap_or(0);
                let score = total
                    * similarity.coord(matched, query.terms.len())
                    * query.boost_factor(memory);

                heap.push(Reverse(Candidate {
                    score,
                    address: DocAddress::new(segment_ord as u32, doc),
                }));
                if heap.len() > limit {
                    heap.pop();
                }
            }
            doc = scorer.advance();
        }
    }

    Ok(heap.into_sorted_vec().into_iter().map(|r| r.0).collect())
}

/// Load the stored fields of ranked candidates.
pub fn load_entries(
    searcher: &Searcher,
    fields: &SchemaFields,
    candidates: &[Candidate],
) -> Result<Vec<ScoreEntry>> {
    let mut entries = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let doc: TantivyDocument = searcher.doc(candidate.address)?;
        let mut entry = document::entry_from_document(fields, &doc)?;
        entry.score = candidate.score;
        entries.push(entry);
    }
    Ok(entries)
}

/// Format results for human-readable terminal output.
pub fn format_human(results: &[ScoreEntry]) {
    if results.is_empty() {
        println!("No matches found.");
        return;
    }

    for (i, r) in results.iter().enumerate() {
        println!(
            "{:>3}. [{:.3}] memory {} ({})",
            i + 1,
            r.score,
            r.memory,
            r.direction
        );
        println!("     {}", r.source);
        println!("     {}", r.target);
    }
    println!("\n{} match(es)", results.len());
}
