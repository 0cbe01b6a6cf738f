use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Displayable reference to the image behind an artifact.
///
/// Owned handles point at files this application wrote (camera captures) and
/// remove them when the handle is dropped; borrowed handles point at files
/// the user selected and are left alone.
#[derive(Debug)]
pub struct PreviewHandle {
    path: PathBuf,
    owned: bool,
}

impl PreviewHandle {
    pub fn owned(path: PathBuf) -> Self {
        Self { path, owned: true }
    }

    pub fn borrowed(path: PathBuf) -> Self {
        Self { path, owned: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the handle now instead of waiting for scope exit.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        if self.owned && self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                log::warn!("Failed to remove preview file {}: {}", self.path.display(), e);
            } else {
                log::debug!("Removed preview file {}", self.path.display());
            }
        }
    }
}

/// An in-memory image payload ready for analysis, plus a preview reference.
#[derive(Debug)]
pub struct ImageArtifact {
    data: Vec<u8>,
    preview: PreviewHandle,
}

impl ImageArtifact {
    pub fn new(data: Vec<u8>, preview: PreviewHandle) -> Self {
        Self { data, preview }
    }

    /// Wrap a user-selected file into the same artifact shape as a capture.
    ///
    /// The content is not inspected here; a non-image file is rejected by the
    /// remote service instead.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read image file {}", path.display()))?;

        log::debug!("Loaded {} bytes from {}", data.len(), path.display());

        Ok(Self {
            data,
            preview: PreviewHandle::borrowed(path.to_path_buf()),
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn preview(&self) -> &PreviewHandle {
        &self.preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_file_reads_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("banana.jpg");
        std::fs::write(&path, b"not really a jpeg").unwrap();

        let artifact = ImageArtifact::from_file(&path).unwrap();
        assert_eq!(artifact.data(), b"not really a jpeg");
        assert_eq!(artifact.preview().path(), path.as_path());
    }

    #[test]
    fn test_from_file_missing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("does_not_exist.jpg");
        assert!(ImageArtifact::from_file(&path).is_err());
    }

    #[test]
    fn test_borrowed_preview_keeps_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("keep.jpg");
        std::fs::write(&path, b"data").unwrap();

        let artifact = ImageArtifact::from_file(&path).unwrap();
        drop(artifact);

        // User-selected files survive artifact release
        assert!(path.exists());
    }

    #[test]
    fn test_owned_preview_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("capture.jpg");
        std::fs::write(&path, b"data").unwrap();

        let handle = PreviewHandle::owned(path.clone());
        handle.release();

        assert!(!path.exists());
    }
}
