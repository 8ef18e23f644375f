use std::collections::BTreeMap;

use serde::{
    Deserialize,
    Serialize,
};
use uuid::Uuid;

use crate::{
    content_hash::ContentHash,
    language::LanguagePair,
};

/// The raw text of the version a unit replaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousPair {
    pub source: String,
    pub target: String,
}

/// One (source, target) sentence pair delivered on an ingestion channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub channel: u16,
    pub channel_position: u64,
    pub memory: u64,
    /// Owner of a private memory; `None` means the memory is public.
    #[serde(default)]
    pub owner: Option<Uuid>,
    pub direction: LanguagePair,
    pub source: String,
    pub target: String,
    /// Set when this unit is a revision of an earlier one.
    #[serde(default)]
    pub previous: Option<PreviousPair>,
}

impl TranslationUnit {
    /// Hash of this unit's own pair, stored so later revisions find it.
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::new(&self.source, &self.target)
    }

    /// Hash of the version this unit supersedes, if any.
    pub fn previous_hash(&self) -> Option<ContentHash> {
        self.previous
            .as_ref()
            .map(|p| ContentHash::new(&p.source, &p.target))
    }

    /// Returns the reason the unit cannot be stored, if any.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.memory == 0 {
            return Err("memory id 0 is reserved");
        }
        if self.source.trim().is_empty() {
            return Err("empty source sentence");
        }
        if self.target.trim().is_empty() {
            return Err("empty target sentence");
        }
        Ok(())
    }
}

/// Removal of every unit belonging to one memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deletion {
    pub channel: u16,
    pub channel_position: u64,
    pub memory: u64,
}

impl Deletion {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.memory == 0 {
            return Err("memory id 0 is reserved");
        }
        Ok(())
    }
}

/// A unit of work read from the upstream channels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBatch {
    #[serde(default)]
    pub units: Vec<TranslationUnit>,
    #[serde(default)]
    pub deletions: Vec<Deletion>,
    /// Highest offset covered by this batch, per channel.
    #[serde(default)]
    pub channel_positions: BTreeMap<u16, u64>,
}

impl DataBatch {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
            && self.deletions.is_empty()
            && self.channel_positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(memory: u64, source: &str, target: &str) -> TranslationUnit {
        TranslationUnit {
            channel: 1,
            channel_position: 1,
            memory,
            owner: None,
            direction: LanguagePair::new("en", "it").unwrap(),
            source: source.to_string(),
            target: target.to_string(),
            previous: None,
        }
    }

    #[test]
    fn validate_accepts_well_formed_unit() {
        assert!(unit(1, "hello", "ciao").validate().is_ok());
    }

    #[test]
    fn validate_rejects_reserved_memory_and_blank_text() {
        assert!(unit(0, "hello", "ciao").validate().is_err());
        assert!(unit(1, "  ", "ciao").validate().is_err());
        assert!(unit(1, "hello", "").validate().is_err());
    }

    #[test]
    fn previous_hash_matches_content_hash_of_predecessor() {
        let old = unit(3, "the cat", "il gatto");
        let mut new = unit(3, "the cat sat", "il gatto sedeva");
        assert_eq!(new.previous_hash(), None);

        new.previous = Some(PreviousPair {
            source: old.source.clone(),
            target: old.target.clone(),
        });
        assert_eq!(new.previous_hash(), Some(old.content_hash()));
    }

    #[test]
    fn batch_deserializes_with_defaults() {
        let json = r#"{
            "units": [{
                "channel": 1,
                "channel_position": 5,
                "memory": 10,
                "direction": "en:it",
                "source": "the cat sat",
                "target": "il gatto sedeva"
            }],
            "channel_positions": {"1": 5}
        }"#;
        let batch: DataBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.units.len(), 1);
        assert!(batch.deletions.is_empty());
        assert_eq!(batch.channel_positions.get(&1), Some(&5));
        assert_eq!(batch.units[0].owner, None);
        assert_eq!(batch.units[0].direction.key(), "en__it");
        assert!(!batch.is_empty());
        assert!(DataBatch::default().is_empty());
    }
}
