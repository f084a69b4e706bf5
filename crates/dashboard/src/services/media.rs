//! Product image storage under the media root.
//!
//! Uploaded files are written to `<media_root>/products/<uuid>.<ext>`; the
//! database stores the path relative to the media root, which the storefront
//! and the dashboard both serve under `/media`.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

/// Subdirectory product images are written to.
pub const PRODUCT_IMAGE_DIR: &str = "products";

/// Extensions accepted for product images.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Errors from storing or removing media files.
#[derive(Debug, Error)]
pub enum MediaError {
    /// File name has no extension or one we do not serve as an image.
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),

    /// Upload had no content.
    #[error("uploaded file is empty")]
    Empty,

    /// Stored path points outside the media root.
    #[error("invalid media path: {0}")]
    InvalidPath(String),

    /// Filesystem error.
    #[error("media I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes and deletes files below one root directory.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store an uploaded product image under a generated name.
    ///
    /// Returns the path relative to the media root, e.g.
    /// `products/6f1c...e2.jpg`.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::UnsupportedType` or `MediaError::Empty` for bad
    /// uploads and `MediaError::Io` if the file cannot be written.
    pub async fn save_product_image(
        &self,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<String, MediaError> {
        if bytes.is_empty() {
            return Err(MediaError::Empty);
        }
        let extension = image_extension(original_name)?;

        let dir = self.root.join(PRODUCT_IMAGE_DIR);
        tokio::fs::create_dir_all(&dir).await?;

        let file_name = format!("{}.{extension}", Uuid::new_v4().simple());
        tokio::fs::write(dir.join(&file_name), bytes).await?;

        let relative = format!("{PRODUCT_IMAGE_DIR}/{file_name}");
        tracing::debug!(path = %relative, size = bytes.len(), "Stored product image");
        Ok(relative)
    }

    /// Delete a stored file. A file that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::InvalidPath` for paths escaping the media root and
    /// `MediaError::Io` for other filesystem failures.
    pub async fn remove(&self, relative: &str) -> Result<(), MediaError> {
        let path = self.resolve(relative)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, MediaError> {
        let path = Path::new(relative);
        let safe = !relative.is_empty()
            && path
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if safe {
            Ok(self.root.join(path))
        } else {
            Err(MediaError::InvalidPath(relative.to_owned()))
        }
    }
}

/// Lowercased extension of an image file name.
///
/// # Errors
///
/// Returns `MediaError::UnsupportedType` unless the extension is one of
/// `jpg`, `jpeg`, `png`, `gif` or `webp`.
pub fn image_extension(file_name: &str) -> Result<&'static str, MediaError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    IMAGE_EXTENSIONS
        .iter()
        .find(|allowed| **allowed == extension)
        .copied()
        .ok_or_else(|| MediaError::UnsupportedType(file_name.to_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension("choy.JPG").unwrap(), "jpg");
        assert_eq!(image_extension("banner.webp").unwrap(), "webp");
        assert!(image_extension("script.svg").is_err());
        assert!(image_extension("noext").is_err());
    }

    #[tokio::test]
    async fn test_save_and_remove_product_image() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf());

        let relative = store.save_product_image("Non.png", b"\x89PNG").await.unwrap();
        assert!(relative.starts_with("products/"));
        assert!(relative.ends_with(".png"));
        assert!(dir.path().join(&relative).exists());

        store.remove(&relative).await.unwrap();
        assert!(!dir.path().join(&relative).exists());
        // Already gone
        store.remove(&relative).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_empty_upload_and_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf());

        assert!(matches!(
            store.save_product_image("a.jpg", b"").await,
            Err(MediaError::Empty)
        ));
        assert!(matches!(
            store.remove("../etc/passwd").await,
            Err(MediaError::InvalidPath(_))
        ));
        assert!(matches!(
            store.remove("/etc/passwd").await,
            Err(MediaError::InvalidPath(_))
        ));
    }
}
