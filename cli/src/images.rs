use std::fmt::Write;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};

use larder_core::images::{ImageStore, extension_for};

/// Images stored as `<sha256>.<ext>` in one directory. Identical uploads
/// share a file.
pub struct DiskImageStore {
    dir: PathBuf,
}

impl DiskImageStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn path_for(&self, reference: &str) -> Result<PathBuf> {
        let valid = !reference.is_empty()
            && reference
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.')
            && !reference.starts_with('.');
        if !valid {
            bail!("Invalid image reference '{reference}'");
        }
        Ok(self.dir.join(reference))
    }
}

fn content_hash(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .fold(String::with_capacity(64), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

impl ImageStore for DiskImageStore {
    fn put(&self, bytes: &[u8], content_type: &str) -> Result<String> {
        let ext = extension_for(content_type)
            .with_context(|| format!("Unsupported image type '{content_type}'"))?;
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create image directory: {}", self.dir.display())
        })?;

        let reference = format!("{}.{ext}", content_hash(bytes));
        let path = self.dir.join(&reference);
        if !path.exists() {
            std::fs::write(&path, bytes)
                .with_context(|| format!("Failed to write image: {}", path.display()))?;
        }
        tracing::debug!(image = %reference, size = bytes.len(), "Stored image");
        Ok(reference)
    }

    fn delete(&self, reference: &str) -> Result<()> {
        let path = self.path_for(reference)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to delete image: {}", path.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(&dir.path().join("images"));

        let a = store.put(b"pixels", "image/png").unwrap();
        let b = store.put(b"pixels", "image/png").unwrap();
        let c = store.put(b"other", "image/jpeg").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.ends_with(".png"));
        assert!(c.ends_with(".jpg"));
        assert_eq!(a.len(), 64 + ".png".len());
        assert!(dir.path().join("images").join(&a).exists());
    }

    #[test]
    fn put_rejects_unknown_types() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(dir.path());
        assert!(store.put(b"%PDF", "application/pdf").is_err());
    }

    #[test]
    fn delete_removes_file_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(dir.path());
        let reference = store.put(b"pixels", "image/webp").unwrap();

        store.delete(&reference).unwrap();
        assert!(!dir.path().join(&reference).exists());
        store.delete(&reference).unwrap();
    }

    #[test]
    fn delete_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(dir.path());
        assert!(store.delete("../larder.db").is_err());
        assert!(store.delete("sub/dir.png").is_err());
        assert!(store.delete("").is_err());
    }
}
