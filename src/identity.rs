//! Content-addressed identifiers for media files and albums.
//!
//! An id is the first 16 hex characters (64 bits) of
//! `SHA-256("{source_root}/{relative_path}")`. The root is part of the hash
//! input, so equal relative paths below different roots never collide. Ids are
//! the only identifiers exposed to clients; raw paths never leave the server.

use std::path::Path;

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest.
pub const FILE_ID_LEN: usize = 16;

/// Derives the id of `relative_path` below `source_root`.
///
/// Separators in the relative part are normalized to `/` and trailing
/// separators of the root are ignored, so `"/photos"` and `"/photos/"` name the
/// same namespace.
pub fn file_id(source_root: &Path, relative_path: &Path) -> String {
    let root_raw = source_root.to_string_lossy();
    let root = normalize_root(&root_raw);
    let rel = relative_path.to_string_lossy().replace('\\', "/");
    let digest = Sha256::digest(format!("{}/{}", root, rel).as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(FILE_ID_LEN);
    hex
}

/// Album ids share the file id namespace.
pub fn album_id(source_root: &Path, relative_album_path: &Path) -> String {
    file_id(source_root, relative_album_path)
}

/// Whether `s` has the shape of an id produced by [`file_id`].
pub fn is_valid_file_id(s: &str) -> bool {
    s.len() == FILE_ID_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn normalize_root(root: &str) -> &str {
    let trimmed = root.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        // "/" itself: keep the empty prefix so the input reads "/rel"
        ""
    } else {
        trimmed
    }
}
