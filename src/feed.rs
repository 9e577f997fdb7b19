//! Feed posts in, named map files out.
//!
//! Posts come from a community feed as plain records (`title`, `body`, `id`,
//! `url`). Only posts linking a JPEG and announcing their grid in the title
//! (`"Unmarked Mine [35x49]"`) become [`ImageMetadata`] records. Ingestion
//! then fetches each image, names it after its title, and drops byte-identical
//! reposts by content hash.
//!
//! Fetching goes through the [`Fetch`] trait so the network side stays
//! outside this crate. [`MirrorFetcher`] serves images from a local directory
//! that mirrors the remote file names.

use crate::hash::content_hash;
use crate::metadata::{ImageMetadata, MetadataOverrides};
use crate::naming::{find_grid_in_title, make_nice_filename};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Fetch failed: {0}")]
    Fetch(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One post from the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPost {
    #[serde(alias = "Title")]
    pub title: String,
    #[serde(default, alias = "Post")]
    pub body: String,
    #[serde(alias = "ID")]
    pub id: String,
    #[serde(alias = "URL")]
    pub url: String,
}

/// Source of raw image bytes for a post URL.
pub trait Fetch {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FeedError>;
}

/// Serves URLs from a local directory by their last path segment.
///
/// `https://i.redd.it/85fbl81s57od1.jpeg` → `<root>/85fbl81s57od1.jpeg`.
pub struct MirrorFetcher {
    root: PathBuf,
}

impl MirrorFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Fetch for MirrorFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FeedError> {
        let name = url_file_name(url);
        if name.is_empty() {
            return Err(FeedError::Fetch(format!("No file name in {url}")));
        }
        let path = self.root.join(name);
        fs::read(&path).map_err(|e| FeedError::Fetch(format!("{}: {}", path.display(), e)))
    }
}

/// Last path segment of a URL, without query string or fragment.
fn url_file_name(url: &str) -> &str {
    let url = url.split(['?', '#']).next().unwrap_or(url);
    url.rsplit('/').next().unwrap_or_default()
}

fn is_jpeg_url(url: &str) -> bool {
    let name = url_file_name(url).to_ascii_lowercase();
    name.ends_with(".jpg") || name.ends_with(".jpeg")
}

/// Read a JSON array of posts.
pub fn load_posts(path: &Path) -> Result<Vec<FeedPost>, FeedError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Keep posts that link a JPEG and carry an `NxM` grid in the title.
pub fn posts_to_metadata(posts: &[FeedPost]) -> Vec<ImageMetadata> {
    posts
        .iter()
        .filter(|p| is_jpeg_url(&p.url) && find_grid_in_title(&p.title).is_some())
        .map(|p| ImageMetadata::new(&p.url, &p.id, &p.title))
        .collect()
}

/// Fetch, name and store every eligible post as a file under `dir`.
///
/// Returns the records that now have a file, with `uid` and `path` set.
/// Posts whose file name cannot be derived, whose fetch fails, or whose bytes
/// hash to a uid already in `seen` are skipped. New uids are added to `seen`.
pub fn ingest(
    posts: &[FeedPost],
    fetcher: &impl Fetch,
    dir: &Path,
    seen: &mut HashSet<String>,
) -> Result<Vec<ImageMetadata>, FeedError> {
    fs::create_dir_all(dir)?;
    let mut stored = Vec::new();

    for meta in posts_to_metadata(posts) {
        let filename = make_nice_filename(meta.title());
        if filename.is_empty() {
            tracing::debug!(title = %meta.title(), "No file name for post");
            continue;
        }

        let bytes = match fetcher.fetch(meta.source_url()) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(url = %meta.source_url(), error = %e, "Skipping post");
                continue;
            }
        };

        let uid = content_hash(&bytes);
        if seen.contains(&uid) {
            tracing::info!(title = %meta.title(), "Duplicate image, skipping");
            continue;
        }

        let path = dir.join(&filename);
        if path.exists() {
            tracing::warn!(path = %path.display(), "File name already taken by a different image");
            continue;
        }
        fs::write(&path, &bytes)?;
        seen.insert(uid.clone());

        stored.push(ImageMetadata::with_overrides(
            meta.source_url(),
            meta.source_id(),
            meta.title(),
            MetadataOverrides {
                path: Some(path.to_string_lossy().into_owned()),
                uid: Some(uid),
                ..Default::default()
            },
        ));
    }

    Ok(stored)
}
