//! Content-addressed rendition storage.
//!
//! Renditions live on the filesystem keyed by content hash and size tag:
//! `{base_dir}/{hash}/{tag}.jpg`. Identical bytes uploaded for any product
//! resolve to the same files, so duplicate uploads cost nothing beyond the
//! hash lookup.

use std::io::Cursor;
use std::path::PathBuf;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use vitrine_common::{Error, Rendition, Renditions, Result, SizeTag};

/// Write attempts per rendition file before giving up.
const WRITE_ATTEMPTS: u32 = 3;

/// Filesystem store for photo renditions.
pub struct RenditionStore {
    base_dir: PathBuf,
}

impl RenditionStore {
    /// Create a new `RenditionStore` rooted at the given directory.
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Generate and persist all four renditions for a decoded image.
    ///
    /// Each rendition is resized to its longest-edge bound (aspect preserved,
    /// never upscaled) and encoded as JPEG. If any write still fails after
    /// retries, every rendition already written for this hash is removed
    /// before the error surfaces; the store never keeps a partial set.
    pub fn store(&self, content_hash: &str, img: &DynamicImage) -> Result<Renditions> {
        let hash_dir = self.base_dir.join(content_hash);
        std::fs::create_dir_all(&hash_dir)?;

        let result = (|| -> Result<Renditions> {
            Ok(Renditions {
                thumb: self.store_one(content_hash, img, SizeTag::Thumb)?,
                small: self.store_one(content_hash, img, SizeTag::Small)?,
                medium: self.store_one(content_hash, img, SizeTag::Medium)?,
                large: self.store_one(content_hash, img, SizeTag::Large)?,
            })
        })();

        if result.is_err() {
            // Roll back the partial set before surfacing the failure
            self.remove_renditions(content_hash)?;
        }
        result
    }

    fn store_one(
        &self,
        content_hash: &str,
        img: &DynamicImage,
        tag: SizeTag,
    ) -> Result<Rendition> {
        let bound = tag.max_edge();
        let longest_edge = img.width().max(img.height());

        // Resize only when the original exceeds the bound
        let (bytes, width, height) = if longest_edge > bound {
            let resized = img.resize(bound, bound, FilterType::Lanczos3);
            (encode_jpeg(&resized)?, resized.width(), resized.height())
        } else {
            (encode_jpeg(img)?, img.width(), img.height())
        };

        let path = self.rendition_path(content_hash, tag);
        write_with_retries(&path, &bytes)?;

        Ok(Rendition {
            path: format!("{content_hash}/{tag}.jpg"),
            width,
            height,
        })
    }

    /// Absolute filesystem path for one rendition.
    pub fn rendition_path(&self, content_hash: &str, tag: SizeTag) -> PathBuf {
        self.base_dir
            .join(content_hash)
            .join(format!("{tag}.jpg"))
    }

    /// Whether a full rendition set exists for a hash.
    pub fn has_renditions(&self, content_hash: &str) -> bool {
        SizeTag::all()
            .iter()
            .all(|tag| self.rendition_path(content_hash, *tag).exists())
    }

    /// Delete every rendition for a hash. Missing files are not an error.
    pub fn remove_renditions(&self, content_hash: &str) -> Result<()> {
        let hash_dir = self.base_dir.join(content_hash);
        match std::fs::remove_dir_all(&hash_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Compute the content hash for raw upload bytes.
///
/// Returns the first 16 hex characters of the SHA-256 digest.
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    hex::encode(&digest[..8]) // 8 bytes = 16 hex chars
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Jpeg)
        .map_err(|e| Error::storage(format!("Failed to encode rendition: {e}")))?;
    Ok(buf.into_inner())
}

fn write_with_retries(path: &std::path::Path, bytes: &[u8]) -> Result<()> {
    let mut attempt = 0;
    loop {
        match std::fs::write(path, bytes) {
            Ok(()) => return Ok(()),
            Err(e) => {
                attempt += 1;
                if attempt >= WRITE_ATTEMPTS {
                    return Err(Error::storage(format!(
                        "Failed to write {} after {} attempts: {}",
                        path.display(),
                        WRITE_ATTEMPTS,
                        e
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_test_image(width: u32, height: u32) -> Vec<u8> {
        let mut img = image::RgbImage::new(width, height);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb([0, 180, 90]);
        }
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Jpeg)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_compute_hash_length() {
        let hash = compute_hash(b"test data");
        assert_eq!(hash.len(), 16);
    }

    #[test]
    fn test_compute_hash_deterministic() {
        let h1 = compute_hash(b"same data");
        let h2 = compute_hash(b"same data");
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_compute_hash_different_data() {
        let h1 = compute_hash(b"data1");
        let h2 = compute_hash(b"data2");
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_rendition_path_layout() {
        let store = RenditionStore::new(PathBuf::from("/data/renditions"));
        let path = store.rendition_path("abc123", SizeTag::Thumb);
        assert_eq!(path, PathBuf::from("/data/renditions/abc123/thumb.jpg"));
    }

    #[test]
    fn test_store_writes_all_renditions() {
        let dir = tempfile::tempdir().unwrap();
        let store = RenditionStore::new(dir.path().to_path_buf());

        let data = encode_test_image(2000, 1000);
        let img = image::load_from_memory(&data).unwrap();
        let hash = compute_hash(&data);

        let renditions = store.store(&hash, &img).unwrap();

        assert!(store.has_renditions(&hash));
        for tag in SizeTag::all() {
            assert!(store.rendition_path(&hash, *tag).exists());
        }

        // Longest edge respects the bound, aspect preserved
        assert_eq!(renditions.large.width, 1280);
        assert_eq!(renditions.large.height, 640);
        assert_eq!(renditions.thumb.width, 160);
        assert_eq!(renditions.thumb.height, 80);
    }

    #[test]
    fn test_store_never_upscales() {
        let dir = tempfile::tempdir().unwrap();
        let store = RenditionStore::new(dir.path().to_path_buf());

        let data = encode_test_image(100, 60);
        let img = image::load_from_memory(&data).unwrap();
        let hash = compute_hash(&data);

        let renditions = store.store(&hash, &img).unwrap();

        // Smaller than every bound: all renditions keep the original size
        for tag in SizeTag::all() {
            let r = renditions.get(*tag);
            assert_eq!((r.width, r.height), (100, 60));
        }
    }

    #[test]
    fn test_remove_renditions() {
        let dir = tempfile::tempdir().unwrap();
        let store = RenditionStore::new(dir.path().to_path_buf());

        let data = encode_test_image(400, 400);
        let img = image::load_from_memory(&data).unwrap();
        let hash = compute_hash(&data);

        store.store(&hash, &img).unwrap();
        assert!(store.has_renditions(&hash));

        store.remove_renditions(&hash).unwrap();
        assert!(!store.has_renditions(&hash));

        // Removing again is not an error
        store.remove_renditions(&hash).unwrap();
    }

    #[test]
    fn test_identical_bytes_share_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = RenditionStore::new(dir.path().to_path_buf());

        let data = encode_test_image(300, 200);
        let img = image::load_from_memory(&data).unwrap();
        let hash = compute_hash(&data);

        let first = store.store(&hash, &img).unwrap();
        let second = store.store(&hash, &img).unwrap();
        assert_eq!(first, second);
    }
}
