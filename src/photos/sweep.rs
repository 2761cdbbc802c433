//! Orphan rendition sweeper.
//!
//! Uploads that never became committed photos are not deleted by the request
//! that abandoned them; their renditions stay on disk until every ledger
//! entry for the hash is older than the TTL. The sweep removes the ledger
//! rows first and the files second, so a photo row can never point at
//! renditions the sweep already deleted.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use vitrine_common::Result;
use vitrine_db::pool::{get_conn, DbPool};
use vitrine_db::queries::uploads;

use super::storage::RenditionStore;

/// Periodic cleaner for renditions whose uploads expired uncommitted.
pub struct OrphanSweeper {
    pool: DbPool,
    store: Arc<RenditionStore>,
    ttl: chrono::Duration,
}

impl OrphanSweeper {
    /// Create a sweeper with the given grace period in seconds.
    pub fn new(pool: DbPool, store: Arc<RenditionStore>, ttl_secs: i64) -> Self {
        Self {
            pool,
            store,
            ttl: chrono::Duration::seconds(ttl_secs),
        }
    }

    /// Run one sweep pass. Returns the number of hashes whose renditions
    /// were removed.
    pub fn sweep_once(&self) -> Result<usize> {
        let conn = get_conn(&self.pool)?;
        let cutoff = Utc::now() - self.ttl;
        let candidates = uploads::expired_orphan_hashes(&conn, cutoff)?;

        let mut removed = 0;
        for hash in candidates {
            uploads::delete_uploads_for_hash(&conn, &hash)?;
            if let Err(e) = self.store.remove_renditions(&hash) {
                // Ledger rows are gone, so the next pass will not retry this
                // hash; surface the failure loudly.
                tracing::warn!(%hash, error = %e, "failed to remove orphaned renditions");
                continue;
            }
            removed += 1;
        }

        if removed > 0 {
            tracing::info!(removed, "swept orphaned renditions");
        }

        Ok(removed)
    }
}

/// Spawn the background sweep loop: one pass at startup, then one per
/// interval.
pub fn start_sweep_task(
    sweeper: Arc<OrphanSweeper>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            if let Err(e) = sweeper.sweep_once() {
                tracing::warn!(error = %e, "orphan sweep pass failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration};
    use std::io::Cursor;
    use vitrine_common::ProductId;
    use vitrine_db::models::Upload;
    use vitrine_db::pool::init_memory_pool;
    use vitrine_db::queries::products;

    use crate::photos::storage::compute_hash;

    fn encode_test_image() -> Vec<u8> {
        let mut img = image::RgbImage::new(50, 40);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb([10, 20, 30]);
        }
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Jpeg)
            .unwrap();
        buf.into_inner()
    }

    fn ledger_entry(
        product_id: ProductId,
        hash: &str,
        renditions: vitrine_common::Renditions,
        created_at: DateTime<Utc>,
    ) -> Upload {
        Upload {
            content_hash: hash.to_string(),
            product_id,
            width: Some(50),
            height: Some(40),
            renditions,
            created_at,
        }
    }

    #[test]
    fn test_sweep_removes_expired_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RenditionStore::new(dir.path().to_path_buf()));
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let product = products::create_product(&conn, "P").unwrap();

        let data = encode_test_image();
        let hash = compute_hash(&data);
        let img = image::load_from_memory(&data).unwrap();
        let renditions = store.store(&hash, &img).unwrap();

        let stale = Utc::now() - ChronoDuration::hours(48);
        uploads::upsert_upload(&conn, &ledger_entry(product.id, &hash, renditions, stale))
            .unwrap();

        let sweeper = OrphanSweeper::new(pool.clone(), store.clone(), 24 * 3600);
        let removed = sweeper.sweep_once().unwrap();

        assert_eq!(removed, 1);
        assert!(!store.has_renditions(&hash));
        assert!(uploads::find_upload(&conn, product.id, &hash)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_sweep_spares_fresh_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RenditionStore::new(dir.path().to_path_buf()));
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let product = products::create_product(&conn, "P").unwrap();

        let data = encode_test_image();
        let hash = compute_hash(&data);
        let img = image::load_from_memory(&data).unwrap();
        let renditions = store.store(&hash, &img).unwrap();

        uploads::upsert_upload(
            &conn,
            &ledger_entry(product.id, &hash, renditions, Utc::now()),
        )
        .unwrap();

        let sweeper = OrphanSweeper::new(pool.clone(), store.clone(), 24 * 3600);
        assert_eq!(sweeper.sweep_once().unwrap(), 0);
        assert!(store.has_renditions(&hash));
    }

    #[test]
    fn test_sweep_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RenditionStore::new(dir.path().to_path_buf()));
        let pool = init_memory_pool().unwrap();

        let sweeper = OrphanSweeper::new(pool, store, 24 * 3600);
        assert_eq!(sweeper.sweep_once().unwrap(), 0);
    }
}
