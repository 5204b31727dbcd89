//! Overlay persistence for batch mode.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use data_contracts::OverlayRef;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StorageError;

pub const DEFAULT_URL_PREFIX: &str = "/outputs";
const HASH_HEX_LEN: usize = 8;

/// Where an overlay was written and how it is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOverlay {
    pub name: String,
    pub path: PathBuf,
    pub url: String,
}

impl From<StoredOverlay> for OverlayRef {
    fn from(stored: StoredOverlay) -> Self {
        OverlayRef::Stored {
            path: stored.path,
            url: stored.url,
        }
    }
}

pub trait OverlayStore: Send + Sync {
    /// Persist a PNG overlay for `source_id`; writes are atomic.
    fn persist(&self, source_id: &str, png: &[u8]) -> Result<StoredOverlay, StorageError>;

    /// Map a stored overlay name back to its file.
    fn resolve(&self, name: &str) -> Result<PathBuf, StorageError>;
}

/// Keep `[A-Za-z0-9._-]`, replace everything else; never empty.
pub fn sanitize_id(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

/// `<sanitized-id>_<sha256 prefix>_gradcam.png`
pub fn overlay_name(source_id: &str, png: &[u8]) -> String {
    let digest = Sha256::digest(png);
    let hash: String = digest
        .iter()
        .take(HASH_HEX_LEN / 2)
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("{}_{hash}_gradcam.png", sanitize_id(source_id))
}

/// Overlays stored as files in one directory, served under a URL prefix.
#[derive(Debug, Clone)]
pub struct DirOverlayStore {
    root: PathBuf,
    url_prefix: String,
}

impl DirOverlayStore {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            path: root.clone(),
            source,
        })?;
        let url_prefix = url_prefix.into().trim_end_matches('/').to_string();
        Ok(Self { root, url_prefix })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_for(&self, name: &str) -> String {
        format!("{}/{name}", self.url_prefix)
    }

    fn check_name(name: &str) -> Result<(), StorageError> {
        let plain = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\'])
            && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
        if plain {
            Ok(())
        } else {
            Err(StorageError::InvalidName(name.to_string()))
        }
    }
}

impl OverlayStore for DirOverlayStore {
    fn persist(&self, source_id: &str, png: &[u8]) -> Result<StoredOverlay, StorageError> {
        let name = overlay_name(source_id, png);
        let path = self.root.join(&name);
        let io_err = |source| StorageError::Io {
            path: path.clone(),
            source,
        };
        // Same name means same bytes; an existing file is already the overlay.
        if !path.exists() {
            let mut tmp = NamedTempFile::new_in(&self.root).map_err(io_err)?;
            tmp.write_all(png).map_err(io_err)?;
            tmp.as_file().sync_all().map_err(io_err)?;
            tmp.persist(&path).map_err(|err| io_err(err.error))?;
            debug!(path = %path.display(), bytes = png.len(), "overlay persisted");
        }
        Ok(StoredOverlay {
            url: self.url_for(&name),
            name,
            path,
        })
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        Self::check_name(name)?;
        let path = self.root.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(StorageError::NotFound(name.to_string()))
        }
    }
}
