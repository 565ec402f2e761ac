use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Invalid asset reference: {0}")]
    InvalidRef(String),

    #[error("Asset store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Document,
    Snippet,
}

impl AssetKind {
    fn dir(&self) -> &'static str {
        match self {
            Self::Document => "documents",
            Self::Snippet => "snippets",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Self::Document => "pdf",
            Self::Snippet => "png",
        }
    }
}

/// Blob storage for signed documents and their region snippets.
/// Returns an opaque reference string that is stored in SQL.
pub trait AssetStore {
    fn put(&self, kind: AssetKind, bytes: &[u8]) -> Result<String, AssetError>;
    fn get(&self, asset_ref: &str) -> Result<Vec<u8>, AssetError>;
}

/// SHA-256 of the content, standard base64. Recorded on every stored document.
pub fn content_hash(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(Sha256::digest(bytes))
}

/// Content-addressed filesystem store: `<root>/<kind>/<sha256 base64url>.<ext>`.
/// Writing the same bytes twice yields the same reference and one file.
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    pub fn new(root: &Path) -> Result<Self, AssetError> {
        for kind in [AssetKind::Document, AssetKind::Snippet] {
            std::fs::create_dir_all(root.join(kind.dir()))?;
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn resolve(&self, asset_ref: &str) -> Result<PathBuf, AssetError> {
        let (dir, name) = asset_ref
            .split_once('/')
            .ok_or_else(|| AssetError::InvalidRef(asset_ref.to_string()))?;
        let known_dir = [AssetKind::Document, AssetKind::Snippet]
            .iter()
            .any(|k| k.dir() == dir);
        let safe_name = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !name.starts_with('.');
        if !known_dir || !safe_name {
            return Err(AssetError::InvalidRef(asset_ref.to_string()));
        }
        Ok(self.root.join(dir).join(name))
    }
}

impl AssetStore for FsAssetStore {
    fn put(&self, kind: AssetKind, bytes: &[u8]) -> Result<String, AssetError> {
        let key = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(Sha256::digest(bytes));
        let asset_ref = format!("{}/{}.{}", kind.dir(), key, kind.extension());
        let target = self.root.join(&asset_ref);

        if target.exists() {
            tracing::debug!(asset_ref = %asset_ref, "Asset already stored");
            return Ok(asset_ref);
        }

        let dir = self.root.join(kind.dir());
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| AssetError::Io(e.error))?;

        tracing::debug!(asset_ref = %asset_ref, size = bytes.len(), "Asset stored");
        Ok(asset_ref)
    }

    fn get(&self, asset_ref: &str) -> Result<Vec<u8>, AssetError> {
        let path = self.resolve(asset_ref)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AssetError::NotFound(asset_ref.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Store that rejects writes of the given kinds and forwards the rest.
pub struct FailingAssetStore<S> {
    inner: S,
    failing: Vec<AssetKind>,
}

impl<S: AssetStore> FailingAssetStore<S> {
    pub fn new(inner: S, failing: &[AssetKind]) -> Self {
        Self {
            inner,
            failing: failing.to_vec(),
        }
    }
}

impl<S: AssetStore> AssetStore for FailingAssetStore<S> {
    fn put(&self, kind: AssetKind, bytes: &[u8]) -> Result<String, AssetError> {
        if self.failing.contains(&kind) {
            return Err(AssetError::Unavailable(format!("{} writes disabled", kind.dir())));
        }
        self.inner.put(kind, bytes)
    }

    fn get(&self, asset_ref: &str) -> Result<Vec<u8>, AssetError> {
        self.inner.get(asset_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_same_reference() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path()).unwrap();

        let a = store.put(AssetKind::Document, b"%PDF-1.4 signed").unwrap();
        let b = store.put(AssetKind::Document, b"%PDF-1.4 signed").unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("documents/") && a.ends_with(".pdf"));
        assert_eq!(std::fs::read_dir(dir.path().join("documents")).unwrap().count(), 1);

        assert_eq!(store.get(&a).unwrap(), b"%PDF-1.4 signed");
    }

    #[test]
    fn snippets_live_apart_from_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path()).unwrap();
        let r = store.put(AssetKind::Snippet, &[0x89, 0x50]).unwrap();
        assert!(r.starts_with("snippets/") && r.ends_with(".png"));
    }

    #[test]
    fn traversal_and_unknown_refs_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path()).unwrap();
        for bad in ["../etc/passwd", "documents/../x", "other/abc.pdf", "documents/", "plain"] {
            assert!(
                matches!(store.get(bad), Err(AssetError::InvalidRef(_))),
                "{bad} should be rejected"
            );
        }
        assert!(matches!(
            store.get("documents/missing.pdf"),
            Err(AssetError::NotFound(_))
        ));
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
    }

    #[test]
    fn failing_store_only_blocks_selected_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let store = FailingAssetStore::new(FsAssetStore::new(dir.path()).unwrap(), &[AssetKind::Snippet]);
        assert!(store.put(AssetKind::Document, b"doc").is_ok());
        assert!(matches!(
            store.put(AssetKind::Snippet, b"png"),
            Err(AssetError::Unavailable(_))
        ));
    }
}
