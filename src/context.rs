use std::str::FromStr;

use serde::{
    Deserialize,
    Serialize,
};

use crate::error::{
    Error,
    Result,
};

/// Relevance of one memory to the text being translated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextScore {
    pub memory: u64,
    pub score: f32,
}

/// Caller-supplied weighting over memories used to bias ranking toward
/// the domains most relevant to the current document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextVector {
    entries: Vec<ContextScore>,
}

impl ContextVector {
    pub fn new(entries: Vec<ContextScore>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ContextScore] {
        &self.entries
    }

    /// Weight of `memory`, if the vector mentions it. When a memory is
    /// listed more than once the highest weight wins.
    pub fn weight(&self, memory: u64) -> Option<f32> {
        self.entries
            .iter()
            .filter(|e| e.memory == memory)
            .map(|e| e.score)
            .reduce(f32::max)
    }

    /// True when the vector carries no usable signal: no entries, or only
    /// zero / non-positive weights.
    pub fn is_neutral(&self) -> bool {
        !self.entries.iter().any(|e| e.score > 0.0)
    }
}

/// Parses `memory:weight` pairs separated by commas, e.g. `10:0.8,12:0.2`.
impl FromStr for ContextVector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (memory, score) = part.split_once(':').ok_or_else(|| {
                Error::InvalidContextVector(format!(
                    "expected 'memory:weight', got '{part}'"
                ))
            })?;
            let memory = memory.trim().parse::<u64>().map_err(|e| {
                Error::InvalidContextVector(format!(
                    "bad memory id '{memory}': {e}"
                ))
            })?;
            let score = score.trim().parse::<f32>().map_err(|e| {
                Error::InvalidContextVector(format!(
                    "bad weight '{score}': {e}"
                ))
            })?;
            if !score.is_finite() {
                return Err(Error::InvalidContextVector(format!(
                    "weight for memory {memory} is not finite"
                )));
            }
            entries.push(ContextScore { memory, score });
        }
        Ok(Self { entries })
    }
}
