use std::{
    fmt,
    str::FromStr,
};

use serde::{
    Deserialize,
    Serialize,
};

use crate::error::{
    Error,
    Result,
};

/// Separator used in the canonical, indexed form of a pair.
const KEY_SEPARATOR: &str = "__";

/// An ordered (source, target) language pair, e.g. `en` → `it`.
///
/// Language tags are normalized to lowercase so `en-US` and `en-us`
/// address the same documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguagePair {
    pub source: String,
    pub target: String,
}

impl LanguagePair {
    pub fn new(source: &str, target: &str) -> Result<Self> {
        let source = normalize_tag(source)?;
        let target = normalize_tag(target)?;
        Ok(Self { source, target })
    }

    /// The canonical key stored in the `direction` field (`"en__it"`).
    pub fn key(&self) -> String {
        format!("{}{KEY_SEPARATOR}{}", self.source, self.target)
    }
}

fn normalize_tag(tag: &str) -> Result<String> {
    let tag = tag.trim();
    let valid = !tag.is_empty()
        && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        return Err(Error::InvalidLanguagePair(format!(
            "invalid language tag '{tag}'"
        )));
    }
    Ok(tag.to_ascii_lowercase())
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} > {}", self.source, self.target)
    }
}

/// Accepts the canonical `en__it` form and the shorthand `en:it`.
impl FromStr for LanguagePair {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (source, target) = s
            .split_once(KEY_SEPARATOR)
            .or_else(|| s.split_once(':'))
            .ok_or_else(|| {
                Error::InvalidLanguagePair(format!(
                    "expected 'source:target', got '{s}'"
                ))
            })?;
        Self::new(source, target)
    }
}

impl TryFrom<String> for LanguagePair {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<LanguagePair> for String {
    fn from(pair: LanguagePair) -> Self {
        pair.key()
    }
}
