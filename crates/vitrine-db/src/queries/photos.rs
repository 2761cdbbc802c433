//! Committed photo database queries.
//!
//! These are the row-level operations the commit coordinator composes inside
//! its transaction: insert, delete, display-order rewrite, and primary-flag
//! assignment. Reads always observe the last fully committed set.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;
use vitrine_common::{Error, PhotoId, ProductId, Result};

use crate::models::Photo;

/// Parse a photo from a database row.
///
/// Expects columns in order: id, product_id, content_hash, width, height,
/// renditions, is_primary, display_order, created_at.
fn parse_photo_row(row: &rusqlite::Row) -> rusqlite::Result<Photo> {
    let renditions_json: String = row.get(5)?;
    Ok(Photo {
        id: PhotoId::from(Uuid::parse_str(&row.get::<_, String>(0)?).unwrap()),
        product_id: ProductId::from(Uuid::parse_str(&row.get::<_, String>(1)?).unwrap()),
        content_hash: row.get(2)?,
        width: row.get(3)?,
        height: row.get(4)?,
        renditions: serde_json::from_str(&renditions_json).unwrap(),
        is_primary: row.get(6)?,
        display_order: row.get(7)?,
        created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(8)?)
            .unwrap()
            .with_timezone(&Utc),
    })
}

const SELECT_COLUMNS: &str = "id, product_id, content_hash, width, height, renditions, \
                              is_primary, display_order, created_at";

/// Insert a new photo record.
pub fn insert_photo(conn: &Connection, photo: &Photo) -> Result<PhotoId> {
    let renditions_json =
        serde_json::to_string(&photo.renditions).map_err(|e| Error::internal(e.to_string()))?;

    conn.execute(
        "INSERT INTO photos (id, product_id, content_hash, width, height, renditions,
                             is_primary, display_order, created_at)
         VALUES (:id, :product_id, :content_hash, :width, :height, :renditions,
                 :is_primary, :display_order, :created_at)",
        rusqlite::named_params! {
            ":id": photo.id.to_string(),
            ":product_id": photo.product_id.to_string(),
            ":content_hash": &photo.content_hash,
            ":width": photo.width,
            ":height": photo.height,
            ":renditions": renditions_json,
            ":is_primary": photo.is_primary,
            ":display_order": photo.display_order,
            ":created_at": photo.created_at.to_rfc3339(),
        },
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(photo.id)
}

/// Get a photo by ID.
pub fn get_photo(conn: &Connection, id: PhotoId) -> Result<Option<Photo>> {
    let result = conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM photos WHERE id = :id"),
        rusqlite::named_params! { ":id": id.to_string() },
        parse_photo_row,
    );

    match result {
        Ok(photo) => Ok(Some(photo)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get all committed photos for a product, ordered by display_order.
pub fn get_photos_for_product(conn: &Connection, product_id: ProductId) -> Result<Vec<Photo>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM photos
             WHERE product_id = :product_id
             ORDER BY display_order ASC"
        ))
        .map_err(|e| Error::database(e.to_string()))?;

    let photos = stmt
        .query_map(
            rusqlite::named_params! { ":product_id": product_id.to_string() },
            parse_photo_row,
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(photos)
}

/// Find a product's photo by content hash, if one is committed.
pub fn find_by_hash(
    conn: &Connection,
    product_id: ProductId,
    content_hash: &str,
) -> Result<Option<Photo>> {
    let result = conn.query_row(
        &format!(
            "SELECT {SELECT_COLUMNS} FROM photos
             WHERE product_id = :product_id AND content_hash = :content_hash"
        ),
        rusqlite::named_params! {
            ":product_id": product_id.to_string(),
            ":content_hash": content_hash,
        },
        parse_photo_row,
    );

    match result {
        Ok(photo) => Ok(Some(photo)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Fetch the rendition set recorded for a content hash by any committed
/// photo, regardless of owner. Identical bytes share rendition files, so the
/// set is valid for every product.
pub fn find_renditions_by_hash(
    conn: &Connection,
    content_hash: &str,
) -> Result<Option<vitrine_common::Renditions>> {
    let result = conn.query_row(
        "SELECT renditions FROM photos WHERE content_hash = :content_hash LIMIT 1",
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

/// Delete a photo by ID.
///
/// # Returns
///
/// * `Ok(true)` - If the photo was deleted
/// * `Ok(false)` - If the photo did not exist
pub fn delete_photo(conn: &Connection, id: PhotoId) -> Result<bool> {
    let rows_affected = conn
        .execute(
            "DELETE FROM photos WHERE id = :id",
            rusqlite::named_params! { ":id": id.to_string() },
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(rows_affected > 0)
}

/// Rewrite the display order of one photo.
pub fn set_display_order(conn: &Connection, id: PhotoId, display_order: u32) -> Result<()> {
    conn.execute(
        "UPDATE photos SET display_order = :display_order WHERE id = :id",
        rusqlite::named_params! {
            ":id": id.to_string(),
            ":display_order": display_order,
        },
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(())
}

/// Set the primary flag so exactly one of the product's photos carries it.
///
/// Clears the flag on every row for the product, then sets it on `id`.
pub fn set_primary(conn: &Connection, product_id: ProductId, id: PhotoId) -> Result<()> {
    conn.execute(
        "UPDATE photos SET is_primary = 0 WHERE product_id = :product_id",
        rusqlite::named_params! { ":product_id": product_id.to_string() },
    )
    .map_err(|e| Error::database(e.to_string()))?;

    conn.execute(
        "UPDATE photos SET is_primary = 1 WHERE id = :id",
        rusqlite::named_params! { ":id": id.to_string() },
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(())
}

/// Count committed photos across all products carrying a content hash.
///
/// A non-zero count means the hash's rendition files are still referenced
/// and must not be removed.
pub fn count_photos_with_hash(conn: &Connection, content_hash: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM photos WHERE content_hash = :content_hash",
        rusqlite::named_params! { ":content_hash": content_hash },
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}
