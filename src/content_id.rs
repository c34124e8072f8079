//! Stable cache keys derived from file paths.

use std::fmt;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the path's UTF-8 bytes. Same path, same id, in every session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(String);

impl ContentId {
    pub fn for_path(path: &Path) -> Self {
        // Non-UTF-8 paths hash their lossy form; two such paths differing only in
        // invalid bytes share an id.
        Self::for_str(&path.to_string_lossy())
    }

    pub fn for_str(path: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(path.as_bytes());
        ContentId(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
