//! Mapping between translation units and index documents.
//!
//! Two kinds of documents share the index: one per stored translation
//! unit, and a single synthetic ledger document holding the last applied
//! offset of every ingestion channel. Keeping the ledger in the same index
//! means it commits atomically with the data it gates.

use std::collections::HashMap;

use tantivy::{
    Index,
    TantivyDocument,
    Term,
    schema::*,
    tokenizer::{
        LowerCaser,
        RemoveLongFilter,
        SimpleTokenizer,
        TextAnalyzer,
        TokenStream,
    },
};
use uuid::Uuid;

use crate::{
    batch::TranslationUnit,
    error::{
        Error,
        Result,
    },
    language::LanguagePair,
    search::ScoreEntry,
};

/// Field names used in the schema.
pub mod fields {
    pub const KIND: &str = "kind";
    pub const MEMORY: &str = "memory";
    pub const OWNER: &str = "owner";
    pub const DIRECTION: &str = "direction";
    pub const SOURCE: &str = "source";
    pub const TARGET: &str = "target";
    pub const HASH: &str = "hash";
    pub const CHANNEL: &str = "channel";
    pub const POSITION: &str = "position";
}

/// Values of the `kind` discriminator field.
pub const KIND_UNIT: &str = "unit";
pub const KIND_LEDGER: &str = "ledger";

/// `owner` value of memories visible to everybody.
pub const PUBLIC_OWNER: &str = "public";

/// Name under which the sentence analyzer is registered.
pub const SENTENCE_TOKENIZER: &str = "sentence";

/// Resolved field handles for the schema.
#[derive(Debug, Clone, Copy)]
pub struct SchemaFields {
    pub kind: Field,
    pub memory: Field,
    pub owner: Field,
    pub direction: Field,
    pub source: Field,
    pub target: Field,
    pub hash: Field,
    pub channel: Field,
    pub position: Field,
}

impl SchemaFields {
    /// Look up every field by name, failing if the index was built with
    /// a different schema.
    pub fn resolve(schema: &Schema) -> Result<Self> {
        Ok(Self {
            kind: schema.get_field(fields::KIND)?,
            memory: schema.get_field(fields::MEMORY)?,
            owner: schema.get_field(fields::OWNER)?,
            direction: schema.get_field(fields::DIRECTION)?,
            source: schema.get_field(fields::SOURCE)?,
            target: schema.get_field(fields::TARGET)?,
            hash: schema.get_field(fields::HASH)?,
            channel: schema.get_field(fields::CHANNEL)?,
            position: schema.get_field(fields::POSITION)?,
        })
    }
}

pub fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    builder.add_text_field(fields::KIND, STRING);
    builder.add_u64_field(fields::MEMORY, INDEXED | STORED | FAST);
    builder.add_text_field(fields::OWNER, STRING | STORED);
    builder.add_text_field(fields::DIRECTION, STRING | STORED);

    let source_opts = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(SENTENCE_TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    builder.add_text_field(fields::SOURCE, source_opts);
    builder.add_text_field(fields::TARGET, STORED);

    builder.add_text_field(fields::HASH, STRING | STORED);
    builder.add_u64_field(fields::CHANNEL, STORED);
    builder.add_u64_field(fields::POSITION, STORED);

    builder.build()
}

/// The analyzer applied to source sentences, both at index and query time.
///
/// Language-neutral on purpose: no stemming or stop words, since the
/// memory holds many source languages and exact word overlap is the
/// signal the rescorer cares about.
pub fn sentence_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .build()
}

pub fn register_tokenizers(index: &Index) {
    index
        .tokenizers()
        .register(SENTENCE_TOKENIZER, sentence_analyzer());
}

/// Split a sentence into the tokens the index sees.
pub fn analyze(text: &str) -> Vec<String> {
    let mut analyzer = sentence_analyzer();
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while stream.advance() {
        tokens.push(stream.token().text.clone());
    }
    tokens
}

pub fn unit_term(fields: &SchemaFields) -> Term {
    Term::from_field_text(fields.kind, KIND_UNIT)
}

pub fn ledger_term(fields: &SchemaFields) -> Term {
    Term::from_field_text(fields.kind, KIND_LEDGER)
}

pub fn memory_term(fields: &SchemaFields, memory: u64) -> Term {
    Term::from_field_u64(fields.memory, memory)
}

pub fn owner_value(owner: Option<Uuid>) -> String {
    owner.map_or_else(|| PUBLIC_OWNER.to_string(), |id| id.to_string())
}

pub fn unit_document(
    fields: &SchemaFields,
    unit: &TranslationUnit,
) -> TantivyDocument {
    let mut doc = TantivyDocument::new();
    doc.add_text(fields.kind, KIND_UNIT);
    doc.add_u64(fields.memory, unit.memory);
    doc.add_text(fields.owner, owner_value(unit.owner));
    doc.add_text(fields.direction, unit.direction.key());
    doc.add_text(fields.source, &unit.source);
    doc.add_text(fields.target, &unit.target);
    doc.add_text(fields.hash, unit.content_hash().as_str());
    doc.add_u64(fields.channel, u64::from(unit.channel));
    doc.add_u64(fields.position, unit.channel_position);
    doc
}

/// Memory id of a stored document; 0 for documents without one, such as
/// the ledger.
pub fn memory_of(fields: &SchemaFields, doc: &TantivyDocument) -> u64 {
    extract_u64(doc, fields.memory)
}

/// Decode a stored unit document.
pub fn entry_from_document(
    fields: &SchemaFields,
    doc: &TantivyDocument,
) -> Result<ScoreEntry> {
    let direction: LanguagePair = extract_text(doc, fields.direction).parse()?;
    let owner = match extract_text(doc, fields.owner).as_str() {
        "" | PUBLIC_OWNER => None,
        other => Some(Uuid::parse_str(other).map_err(|e| {
            Error::CorruptDocument(format!("owner '{other}': {e}"))
        })?),
    };

    Ok(ScoreEntry {
        memory: memory_of(fields, doc),
        direction,
        source: extract_text(doc, fields.source),
        target: extract_text(doc, fields.target),
        score: 0.0,
        owner,
    })
}

/// Encode the channel ledger as one document with parallel multi-valued
/// `channel` / `position` fields, one value pair per channel.
pub fn ledger_document(
    fields: &SchemaFields,
    positions: &HashMap<u16, u64>,
) -> TantivyDocument {
    let mut channels: Vec<_> = positions.iter().collect();
    channels.sort_unstable();

    let mut doc = TantivyDocument::new();
    doc.add_text(fields.kind, KIND_LEDGER);
    for (&channel, &position) in channels {
        doc.add_u64(fields.channel, u64::from(channel));
        doc.add_u64(fields.position, position);
    }
    doc
}

pub fn ledger_from_document(
    fields: &SchemaFields,
    doc: &TantivyDocument,
) -> Result<HashMap<u16, u64>> {
    let channels: Vec<u64> =
        doc.get_all(fields.channel).filter_map(|v| v.as_u64()).collect();
    let positions: Vec<u64> =
        doc.get_all(fields.position).filter_map(|v| v.as_u64()).collect();

    if channels.len() != positions.len() {
        return Err(Error::CorruptLedger(format!(
            "{} channels but {} positions",
            channels.len(),
            positions.len()
        )));
    }

    let mut ledger = HashMap::with_capacity(channels.len());
    for (channel, position) in channels.into_iter().zip(positions) {
        let channel = u16::try_from(channel).map_err(|_| {
            Error::CorruptLedger(format!("channel id {channel} out of range"))
        })?;
        ledger.insert(channel, position);
    }
    Ok(ledger)
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn extract_u64(doc: &TantivyDocument, field: Field) -> u64 {
    doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0)
}
