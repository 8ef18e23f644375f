use std::collections::HashMap;

use tantivy::{
    Term,
    query::{
        BooleanQuery,
        Occur,
        Query,
        TermQuery,
    },
    schema::IndexRecordOption,
};
use uuid::Uuid;

use crate::{
    content_hash::ContentHash,
    context::ContextVector,
    document::{
        self,
        SchemaFields,
    },
    language::LanguagePair,
};

/// A source-field term and how often it occurs in the query sentence.
#[derive(Debug, Clone)]
pub struct WeightedTerm {
    pub term: Term,
    pub weight: f32,
}

/// Multiplicative boost per memory derived from a context vector.
///
/// Memories named in the vector get `1 + weight`; every other memory gets
/// the baseline of 1, so out-of-context matches stay retrievable.
#[derive(Debug, Clone, Default)]
pub struct ContextBoost {
    weights: HashMap<u64, f32>,
}

impl ContextBoost {
    pub const BASELINE: f32 = 1.0;

    /// `None` when the vector is missing, empty, or all zero.
    pub fn from_context(context: Option<&ContextVector>) -> Option<Self> {
        let context = context.filter(|c| !c.is_neutral())?;
        let mut weights = HashMap::new();
        for entry in context.entries() {
            if entry.score > 0.0 {
                let weight = weights.entry(entry.memory).or_insert(0.0f32);
                *weight = weight.max(entry.score);
            }
        }
        Some(Self { weights })
    }

    pub fn factor(&self, memory: u64) -> f32 {
        Self::BASELINE + self.weights.get(&memory).copied().unwrap_or(0.0)
    }
}

/// A fuzzy retrieval request, ready to run against a searcher.
///
/// `query` selects the candidates (direction, visibility, at least one
/// shared word); `terms` and `boost` drive the similarity that ranks them.
pub struct MatchQuery {
    pub query: Box<dyn Query>,
    pub terms: Vec<WeightedTerm>,
    pub boost: Option<ContextBoost>,
}

impl MatchQuery {
    pub fn boost_factor(&self, memory: u64) -> f32 {
        self.boost
            .as_ref()
            .map_or(ContextBoost::BASELINE, |b| b.factor(memory))
    }
}

impl std::fmt::Debug for MatchQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchQuery")
            .field("terms", &self.terms.len())
            .field("boost", &self.boost.is_some())
            .finish_non_exhaustive()
    }
}

/// Builds the queries the translation memory runs.
pub trait QueryBuilder: Send + Sync {
    /// Fuzzy lookup of the units most similar to `sentence`.
    fn best_matching_suggestion(
        &self,
        fields: &SchemaFields,
        user: Option<Uuid>,
        direction: &LanguagePair,
        sentence: &str,
        context: Option<&ContextVector>,
    ) -> MatchQuery;

    /// Exact lookup of the unit in `memory` whose raw pair hashes to `hash`.
    fn get_by_hash(
        &self,
        fields: &SchemaFields,
        memory: u64,
        hash: &ContentHash,
    ) -> Box<dyn Query>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultQueryBuilder;

impl QueryBuilder for DefaultQueryBuilder {
    fn best_matching_suggestion(
        &self,
        fields: &SchemaFields,
        user: Option<Uuid>,
        direction: &LanguagePair,
        sentence: &str,
        context: Option<&ContextVector>,
    ) -> MatchQuery {
        let terms = weighted_terms(fields, sentence);

        let text_clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .iter()
            .map(|t| (Occur::Should, term_query(t.term.clone())))
            .collect();

        let text_query: Box<dyn Query> =
            Box::new(BooleanQuery::new(text_clauses));
        let direction_term =
            Term::from_field_text(fields.direction, &direction.key());

        let query = BooleanQuery::new(vec![
            (Occur::Must, text_query),
            (Occur::Must, term_query(direction_term)),
            (Occur::Must, visibility_query(fields, user)),
        ]);

        MatchQuery {
            query: Box::new(query),
            terms,
            boost: ContextBoost::from_context(context),
        }
    }

    fn get_by_hash(
        &self,
        fields: &SchemaFields,
        memory: u64,
        hash: &ContentHash,
    ) -> Box<dyn Query> {
        let hash_term = Term::from_field_text(fields.hash, hash.as_str());
        Box::new(BooleanQuery::new(vec![
            (Occur::Must, term_query(document::memory_term(fields, memory))),
            (Occur::Must, term_query(hash_term)),
        ]))
    }
}

/// Public memories, plus the caller's private ones.
fn visibility_query(
    fields: &SchemaFields,
    user: Option<Uuid>,
) -> Box<dyn Query> {
    let mut owners = vec![(
        Occur::Should,
        term_query(Term::from_field_text(
            fields.owner,
            document::PUBLIC_OWNER,
        )),
    )];
    if let Some(user) = user {
        let owner = document::owner_value(Some(user));
        owners.push((
            Occur::Should,
            term_query(Term::from_field_text(fields.owner, &owner)),
        ));
    }
    Box::new(BooleanQuery::new(owners))
}

// Matching only: ranking reads term frequencies from the postings itself.
fn term_query(term: Term) -> Box<dyn Query> {
    Box::new(TermQuery::new(term, IndexRecordOption::Basic))
}

/// Unique analyzed terms of `sentence`, in first-occurrence order, each
/// weighted by its frequency in the sentence.
fn weighted_terms(fields: &SchemaFields, sentence: &str) -> Vec<WeightedTerm> {
    let mut terms: Vec<WeightedTerm> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for token in document::analyze(sentence) {
        match positions.get(&token) {
            Some(&i) => terms[i].weight += 1.0,
            None => {
                positions.insert(token.clone(), terms.len());
                terms.push(WeightedTerm {
                    term: Term::from_field_text(fields.source, &token),
                    weight: 1.0,
                });
            }
        }
    }

    terms
}
