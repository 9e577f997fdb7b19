//! Content hashing for image identity and deduplication.
//!
//! Every image the pipeline touches is identified by the SHA-256 of its
//! content, hex encoded. The same digest serves as the dedup key during
//! ingestion and as the document id on export.
//!
//! - **Originals** are hashed over the downloaded file bytes.
//! - **Shards** are hashed over the raw decoded pixel buffer of the crop,
//!   not the re-encoded file, so two identical crops share a uid even when
//!   the encoder output differs.
//!
//! This is a dedup key, not a security boundary.

use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;

/// SHA-256 of `bytes`, returned as a lowercase hex string.
///
/// Total over all inputs, including the empty slice.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{:x}", digest)
}

/// SHA-256 of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(content_hash(&bytes))
}
