use std::fmt;

/// A stable digest over a raw (source, target) sentence pair.
///
/// Stored on every translation unit so that a later revision of the same
/// segment, which references its predecessor by raw text, can find and
/// replace it. Uses blake3 so the value is identical across builds and
/// platforms; the digest is persisted in the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn new(source: &str, target: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        // Length prefixes keep ("ab", "c") and ("a", "bc") apart.
        hasher.update(&(source.len() as u64).to_le_bytes());
        hasher.update(source.as_bytes());
        hasher.update(&(target.len() as u64).to_le_bytes());
        hasher.update(target.as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
