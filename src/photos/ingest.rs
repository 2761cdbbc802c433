//! Image ingest pipeline.
//!
//! Validates raw uploads, deduplicates them by content hash, transcodes them
//! into the fixed rendition set, and records them in the ingest ledger. The
//! output descriptor is input material for a staged edit session, not a
//! committed photo; committed metadata is never touched here.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use vitrine_common::{Error, ProductId, Renditions, Result};
use vitrine_db::models::Upload;
use vitrine_db::pool::{get_conn, DbPool};
use vitrine_db::queries::{photos, products, uploads};

use super::storage::{compute_hash, RenditionStore};

/// MIME types accepted for upload.
const ACCEPTED_MIME: &[&str] = &["image/jpeg", "image/png", "image/webp"];

/// A validated, transcoded upload. Not yet a committed photo.
#[derive(Debug, Clone, Serialize)]
pub struct PhotoDescriptor {
    pub content_hash: String,
    pub width: u32,
    pub height: u32,
    pub renditions: Renditions,
}

/// Pipeline turning raw upload bytes into stored renditions plus a descriptor.
pub struct IngestPipeline {
    store: Arc<RenditionStore>,
    pool: DbPool,
    max_upload_bytes: u64,
}

impl IngestPipeline {
    /// Create a new `IngestPipeline`.
    pub fn new(store: Arc<RenditionStore>, pool: DbPool, max_upload_bytes: u64) -> Self {
        Self {
            store,
            pool,
            max_upload_bytes,
        }
    }

    /// Ingest one upload for a product.
    ///
    /// Validation happens strictly before any storage write: declared MIME,
    /// then byte length, then an actual decode. A hash already known for this
    /// product short-circuits to the existing descriptor without reprocessing.
    pub fn ingest(
        &self,
        product_id: ProductId,
        data: &[u8],
        declared_mime: &str,
    ) -> Result<PhotoDescriptor> {
        let mime = normalize_mime(declared_mime);
        if !ACCEPTED_MIME.contains(&mime.as_str()) {
            return Err(Error::InvalidFormat(mime));
        }

        if data.len() as u64 > self.max_upload_bytes {
            return Err(Error::FileTooLarge {
                size: data.len() as u64,
                limit: self.max_upload_bytes,
            });
        }

        let img = image::load_from_memory(data).map_err(|e| Error::Decode(e.to_string()))?;

        let conn = get_conn(&self.pool)?;
        if products::get_product(&conn, product_id)?.is_none() {
            return Err(Error::not_found(format!("product {product_id}")));
        }

        let content_hash = compute_hash(data);

        // Dedup against committed photos and prior uploads for this product.
        // `has_renditions` guards against files lost out-of-band; metadata
        // must never point at missing renditions.
        if self.store.has_renditions(&content_hash) {
            if let Some(photo) = photos::find_by_hash(&conn, product_id, &content_hash)? {
                tracing::debug!(%product_id, %content_hash, "upload matches committed photo");
                return Ok(PhotoDescriptor {
                    content_hash,
                    width: img.width(),
                    height: img.height(),
                    renditions: photo.renditions,
                });
            }

            if let Some(upload) = uploads::find_upload(&conn, product_id, &content_hash)? {
                // Refresh the ledger timestamp so the sweeper keeps it alive
                uploads::upsert_upload(
                    &conn,
                    &Upload {
                        created_at: Utc::now(),
                        ..upload.clone()
                    },
                )?;
                tracing::debug!(%product_id, %content_hash, "upload matches prior upload");
                return Ok(PhotoDescriptor {
                    content_hash,
                    width: img.width(),
                    height: img.height(),
                    renditions: upload.renditions,
                });
            }

            // Identical bytes ingested by another product: the rendition
            // files are shared, so reuse the recorded set rather than
            // transcoding over files that committed photos may reference.
            let shared = match photos::find_renditions_by_hash(&conn, &content_hash)? {
                Some(r) => Some(r),
                None => uploads::find_renditions_by_hash(&conn, &content_hash)?,
            };
            if let Some(renditions) = shared {
                let upload = Upload {
                    content_hash: content_hash.clone(),
                    product_id,
                    width: Some(img.width()),
                    height: Some(img.height()),
                    renditions: renditions.clone(),
                    created_at: Utc::now(),
                };
                uploads::upsert_upload(&conn, &upload)?;
                tracing::debug!(%product_id, %content_hash, "upload shares another product's renditions");
                return Ok(PhotoDescriptor {
                    content_hash,
                    width: img.width(),
                    height: img.height(),
                    renditions,
                });
            }
        }

        // New content for this product: transcode and record in the ledger
        let renditions = self.store.store(&content_hash, &img)?;

        let upload = Upload {
            content_hash: content_hash.clone(),
            product_id,
            width: Some(img.width()),
            height: Some(img.height()),
            renditions: renditions.clone(),
            created_at: Utc::now(),
        };
        uploads::upsert_upload(&conn, &upload)?;

        tracing::info!(%product_id, %content_hash, "ingested upload");

        Ok(PhotoDescriptor {
            content_hash,
            width: img.width(),
            height: img.height(),
            renditions,
        })
    }
}

/// Strip parameters and lowercase a declared MIME type.
fn normalize_mime(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or(mime)
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use vitrine_db::pool::init_memory_pool;

    fn encode_test_image(width: u32, height: u32, shade: u8) -> Vec<u8> {
        let mut img = image::RgbImage::new(width, height);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb([shade, 40, 200]);
        }
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Jpeg)
            .unwrap();
        buf.into_inner()
    }

    fn test_pipeline() -> (IngestPipeline, DbPool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RenditionStore::new(dir.path().to_path_buf()));
        let pool = init_memory_pool().unwrap();
        let pipeline = IngestPipeline::new(store, pool.clone(), 5 * 1024 * 1024);
        (pipeline, pool, dir)
    }

    fn create_product(pool: &DbPool) -> ProductId {
        let conn = pool.get().unwrap();
        products::create_product(&conn, "Test Product").unwrap().id
    }

    #[test]
    fn test_ingest_valid_upload() {
        let (pipeline, pool, _dir) = test_pipeline();
        let product_id = create_product(&pool);

        let data = encode_test_image(800, 600, 10);
        let descriptor = pipeline.ingest(product_id, &data, "image/jpeg").unwrap();

        assert_eq!(descriptor.content_hash.len(), 16);
        assert_eq!(descriptor.width, 800);
        assert_eq!(descriptor.height, 600);

        // Ledger row exists
        let conn = pool.get().unwrap();
        assert!(
            uploads::find_upload(&conn, product_id, &descriptor.content_hash)
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_ingest_rejects_bad_mime() {
        let (pipeline, pool, _dir) = test_pipeline();
        let product_id = create_product(&pool);

        let data = encode_test_image(10, 10, 10);
        let err = pipeline.ingest(product_id, &data, "text/plain").unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_ingest_accepts_mime_with_parameters() {
        let (pipeline, pool, _dir) = test_pipeline();
        let product_id = create_product(&pool);

        let data = encode_test_image(10, 10, 10);
        let result = pipeline.ingest(product_id, &data, "IMAGE/JPEG; q=0.9");
        assert!(result.is_ok());
    }

    #[test]
    fn test_ingest_rejects_oversized_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RenditionStore::new(dir.path().to_path_buf()));
        let pool = init_memory_pool().unwrap();
        // 1 KiB limit for the test
        let pipeline = IngestPipeline::new(store, pool.clone(), 1024);
        let product_id = create_product(&pool);

        let data = encode_test_image(500, 500, 10);
        assert!(data.len() > 1024);
        let err = pipeline.ingest(product_id, &data, "image/jpeg").unwrap_err();
        assert!(matches!(err, Error::FileTooLarge { .. }));
    }

    #[test]
    fn test_ingest_rejects_undecodable_bytes() {
        let (pipeline, pool, _dir) = test_pipeline();
        let product_id = create_product(&pool);

        let err = pipeline
            .ingest(product_id, b"definitely not an image", "image/png")
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_ingest_unknown_product() {
        let (pipeline, _pool, _dir) = test_pipeline();

        let data = encode_test_image(10, 10, 10);
        let err = pipeline
            .ingest(ProductId::new(), &data, "image/jpeg")
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_ingest_identical_bytes_dedup() {
        let (pipeline, pool, _dir) = test_pipeline();
        let product_id = create_product(&pool);

        let data = encode_test_image(800, 600, 10);
        let first = pipeline.ingest(product_id, &data, "image/jpeg").unwrap();
        let second = pipeline.ingest(product_id, &data, "image/jpeg").unwrap();

        assert_eq!(first.content_hash, second.content_hash);
        assert_eq!(first.renditions, second.renditions);
    }

    #[test]
    fn test_ingest_same_bytes_for_second_product_leaves_files_untouched() {
        let (pipeline, pool, dir) = test_pipeline();
        let product_a = create_product(&pool);
        let product_b = {
            let conn = pool.get().unwrap();
            products::create_product(&conn, "Other Product").unwrap().id
        };

        let data = encode_test_image(800, 600, 10);
        let first = pipeline.ingest(product_a, &data, "image/jpeg").unwrap();

        // Mark one of A's rendition files; a re-transcode would replace it
        let thumb_path = dir
            .path()
            .join(&first.content_hash)
            .join("thumb.jpg");
        std::fs::write(&thumb_path, b"sentinel").unwrap();

        let second = pipeline.ingest(product_b, &data, "image/jpeg").unwrap();
        assert_eq!(second.content_hash, first.content_hash);
        assert_eq!(second.renditions, first.renditions);
        assert_eq!(std::fs::read(&thumb_path).unwrap(), b"sentinel");

        // B got its own ledger row against the shared rendition set
        let conn = pool.get().unwrap();
        assert!(
            uploads::find_upload(&conn, product_b, &first.content_hash)
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_ingest_different_bytes_different_hash() {
        let (pipeline, pool, _dir) = test_pipeline();
        let product_id = create_product(&pool);

        let first = pipeline
            .ingest(product_id, &encode_test_image(800, 600, 10), "image/jpeg")
            .unwrap();
        let second = pipeline
            .ingest(product_id, &encode_test_image(800, 600, 200), "image/jpeg")
            .unwrap();

        assert_ne!(first.content_hash, second.content_hash);
    }

    #[test]
    fn test_normalize_mime() {
        assert_eq!(normalize_mime("image/jpeg"), "image/jpeg");
        assert_eq!(normalize_mime("Image/PNG"), "image/png");
        assert_eq!(normalize_mime("image/webp; q=1"), "image/webp");
    }
}
