//! Shared helpers: path normalization, timestamps, content hashing.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Normalize a path to a stable, forward-slash key relative to a root.
///
/// Graph provenance uses these keys so that databases are portable between
/// machines and the same file always maps to the same rows.
///
/// # Arguments
/// * `path` - Path to normalize (absolute or relative)
/// * `root` - Project root the key is relative to
///
/// # Returns
/// Relative forward-slash path if `path` is under `root`, otherwise the
/// lossy full path with separators normalized.
pub fn relative_key(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let s = rel.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.to_string()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// Current Unix timestamp in seconds.
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// SHA-256 content hash, hex-encoded.
///
/// Used both for whole-file fingerprints in the hash ledger and for per-node
/// defining-content hashes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
