//! Ingest ledger queries.
//!
//! Every validated upload lands here before it is (maybe) committed as a
//! photo. The ledger backs two things: per-product dedup during ingest, and
//! the orphan sweep that expires renditions which never reached a commit.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;
use vitrine_common::{Error, ProductId, Result};

use crate::models::Upload;

/// Parse an upload from a database row.
///
/// Expects columns in order: content_hash, product_id, width, height,
/// renditions, created_at.
fn parse_upload_row(row: &rusqlite::Row) -> rusqlite::Result<Upload> {
    let renditions_json: String = row.get(4)?;
    Ok(Upload {
        content_hash: row.get(0)?,
        product_id: ProductId::from(Uuid::parse_str(&row.get::<_, String>(1)?).unwrap()),
        width: row.get(2)?,
        height: row.get(3)?,
        renditions: serde_json::from_str(&renditions_json).unwrap(),
        created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(5)?)
            .unwrap()
            .with_timezone(&Utc),
    })
}

/// Record an upload, refreshing the timestamp if the (hash, product) pair
/// already exists. Re-uploading identical bytes keeps the renditions alive.
pub fn upsert_upload(conn: &Connection, upload: &Upload) -> Result<()> {
    let renditions_json =
        serde_json::to_string(&upload.renditions).map_err(|e| Error::internal(e.to_string()))?;

    conn.execute(
        "INSERT INTO uploads (content_hash, product_id, width, height, renditions, created_at)
         VALUES (:content_hash, :product_id, :width, :height, :renditions, :created_at)
         ON CONFLICT (content_hash, product_id)
         DO UPDATE SET created_at = :created_at",
        rusqlite::named_params! {
            ":content_hash": &upload.content_hash,
            ":product_id": upload.product_id.to_string(),
            ":width": upload.width,
            ":height": upload.height,
            ":renditions": renditions_json,
            ":created_at": upload.created_at.to_rfc3339(),
        },
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(())
}

/// Find a prior upload of the same bytes for a product.
pub fn find_upload(
    conn: &Connection,
    product_id: ProductId,
    content_hash: &str,
) -> Result<Option<Upload>> {
    let result = conn.query_row(
        "SELECT content_hash, product_id, width, height, renditions, created_at
         FROM uploads
         WHERE product_id = :product_id AND content_hash = :content_hash",
        rusqlite::named_params! {
            ":product_id": product_id.to_string(),
            ":content_hash": content_hash,
        },
        parse_upload_row,
    );

    match result {
        Ok(upload) => Ok(Some(upload)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Fetch the rendition set recorded for a content hash by any ledger entry,
/// regardless of owner.
pub fn find_renditions_by_hash(
    conn: &Connection,
    content_hash: &str,
) -> Result<Option<vitrine_common::Renditions>> {
    let result = conn.query_row(
        "SELECT renditions FROM uploads WHERE content_hash = :content_hash LIMIT 1",
        rusqlite::named_params! { ":content_hash": content_hash },
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(json) => Ok(Some(
            serde_json::from_str(&json).map_err(|e| Error::internal(e.to_string()))?,
        )),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Content hashes whose every ledger entry is older than `cutoff` and which
/// no committed photo references. These are the sweep candidates.
pub fn expired_orphan_hashes(conn: &Connection, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT content_hash FROM uploads
             GROUP BY content_hash
             HAVING MAX(created_at) < :cutoff
                AND content_hash NOT IN (SELECT content_hash FROM photos)",
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let hashes = stmt
        .query_map(
            rusqlite::named_params! { ":cutoff": cutoff.to_rfc3339() },
            |row| row.get::<_, String>(0),
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(hashes)
}

/// Remove every ledger entry for a content hash.
///
/// # Returns
///
/// * `Ok(u64)` - Number of entries removed
pub fn delete_uploads_for_hash(conn: &Connection, content_hash: &str) -> Result<u64> {
    let rows_affected = conn
        .execute(
            "DELETE FROM uploads WHERE content_hash = :content_hash",
            rusqlite::named_params! { ":content_hash": content_hash },
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(rows_affected as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Photo;
    use crate::pool::init_memory_pool;
    use crate::queries::photos::insert_photo;
    use crate::queries::products::create_product;
    use chrono::Duration;
    use vitrine_common::{PhotoId, Rendition, Renditions};

    fn test_renditions(hash: &str) -> Renditions {
        let r = |tag: &str| Rendition {
            path: format!("{hash}/{tag}.jpg"),
            width: 100,
            height: 80,
        };
        Renditions {
            thumb: r("thumb"),
            small: r("small"),
            medium: r("medium"),
            large: r("large"),
        }
    }

    fn test_upload(product_id: ProductId, hash: &str, created_at: DateTime<Utc>) -> Upload {
        Upload {
            content_hash: hash.to_string(),
            product_id,
            width: Some(1600),
            height: Some(1200),
            renditions: test_renditions(hash),
            created_at,
        }
    }

    #[test]
    fn test_upsert_and_find_upload() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let product = create_product(&conn, "P").unwrap();

        let upload = test_upload(product.id, "aa11", Utc::now());
        upsert_upload(&conn, &upload).unwrap();

        let found = find_upload(&conn, product.id, "aa11").unwrap().unwrap();
        assert_eq!(found.content_hash, "aa11");
        assert_eq!(found.renditions, upload.renditions);

        assert!(find_upload(&conn, product.id, "zz99").unwrap().is_none());
    }

    #[test]
    fn test_find_renditions_by_hash_ignores_owner() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let product = create_product(&conn, "P").unwrap();

        let upload = test_upload(product.id, "aa11", Utc::now());
        upsert_upload(&conn, &upload).unwrap();

        let found = find_renditions_by_hash(&conn, "aa11").unwrap().unwrap();
        assert_eq!(found, upload.renditions);

        assert!(find_renditions_by_hash(&conn, "zz99").unwrap().is_none());
    }

    #[test]
    fn test_upsert_refreshes_timestamp() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let product = create_product(&conn, "P").unwrap();

        let old = Utc::now() - Duration::hours(48);
        upsert_upload(&conn, &test_upload(product.id, "aa11", old)).unwrap();
        upsert_upload(&conn, &test_upload(product.id, "aa11", Utc::now())).unwrap();

        // The refreshed entry is no longer an expired orphan
        let cutoff = Utc::now() - Duration::hours(24);
        let orphans = expired_orphan_hashes(&conn, cutoff).unwrap();
        assert!(orphans.is_empty());
    }

    #[test]
    fn test_expired_orphan_hashes() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let product = create_product(&conn, "P").unwrap();

        let old = Utc::now() - Duration::hours(48);
        upsert_upload(&conn, &test_upload(product.id, "aa11", old)).unwrap();
        upsert_upload(&conn, &test_upload(product.id, "bb22", Utc::now())).unwrap();

        let cutoff = Utc::now() - Duration::hours(24);
        let orphans = expired_orphan_hashes(&conn, cutoff).unwrap();
        assert_eq!(orphans, vec!["aa11".to_string()]);
    }

    #[test]
    fn test_committed_hash_is_not_orphan() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let product = create_product(&conn, "P").unwrap();

        let old = Utc::now() - Duration::hours(48);
        upsert_upload(&conn, &test_upload(product.id, "aa11", old)).unwrap();

        // Commit a photo with the same hash
        let photo = Photo {
            id: PhotoId::new(),
            product_id: product.id,
            content_hash: "aa11".to_string(),
            width: Some(1600),
            height: Some(1200),
            renditions: test_renditions("aa11"),
            is_primary: true,
            display_order: 1,
            created_at: Utc::now(),
        };
        insert_photo(&conn, &photo).unwrap();

        let cutoff = Utc::now() - Duration::hours(24);
        let orphans = expired_orphan_hashes(&conn, cutoff).unwrap();
        assert!(orphans.is_empty());
    }

    #[test]
    fn test_delete_uploads_for_hash() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let a = create_product(&conn, "A").unwrap();
        let b = create_product(&conn, "B").unwrap();

        upsert_upload(&conn, &test_upload(a.id, "aa11", Utc::now())).unwrap();
        upsert_upload(&conn, &test_upload(b.id, "aa11", Utc::now())).unwrap();

        let removed = delete_uploads_for_hash(&conn, "aa11").unwrap();
        assert_eq!(removed, 2);
        assert!(find_upload(&conn, a.id, "aa11").unwrap().is_none());
    }
}
