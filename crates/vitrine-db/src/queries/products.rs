//! Product database queries.
//!
//! Products are the owning entity for photo sets: each row carries the
//! photo set version token checked at commit time and the nullable carousel
//! position used by the slot allocator.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;
use vitrine_common::{Error, PhotoSetVersion, ProductId, Result};

use crate::models::Product;

/// Tables holding foreign keys to products, checked before destructive
/// operations. Expressed declaratively so the check runs as one batched query
/// instead of sequential per-table lookups.
const REFERENCE_CHECKS: &[(&str, &str)] = &[("photos", "product_id"), ("uploads", "product_id")];

/// Parse a product from a database row.
///
/// Expects columns in order: id, name, photo_set_version, carousel_position, created_at.
fn parse_product_row(row: &rusqlite::Row) -> rusqlite::Result<Product> {
    Ok(Product {
        id: ProductId::from(Uuid::parse_str(&row.get::<_, String>(0)?).unwrap()),
        name: row.get(1)?,
        photo_set_version: PhotoSetVersion::new(row.get(2)?),
        carousel_position: row.get(3)?,
        created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(4)?)
            .unwrap()
            .with_timezone(&Utc),
    })
}

/// Create a new product with an empty photo set.
pub fn create_product(conn: &Connection, name: &str) -> Result<Product> {
    let product = Product {
        id: ProductId::new(),
        name: name.to_string(),
        photo_set_version: PhotoSetVersion::default(),
        carousel_position: None,
        created_at: Utc::now(),
    };

    conn.execute(
        "INSERT INTO products (id, name, photo_set_version, carousel_position, created_at)
         VALUES (:id, :name, :version, :position, :created_at)",
        rusqlite::named_params! {
            ":id": product.id.to_string(),
            ":name": &product.name,
            ":version": product.photo_set_version.value(),
            ":position": product.carousel_position,
            ":created_at": product.created_at.to_rfc3339(),
        },
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(product)
}

/// Get a product by ID.
pub fn get_product(conn: &Connection, id: ProductId) -> Result<Option<Product>> {
    let result = conn.query_row(
        "SELECT id, name, photo_set_version, carousel_position, created_at
         FROM products WHERE id = :id",
        rusqlite::named_params! { ":id": id.to_string() },
        parse_product_row,
    );

    match result {
        Ok(product) => Ok(Some(product)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List all products, newest first.
pub fn list_products(conn: &Connection) -> Result<Vec<Product>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, photo_set_version, carousel_position, created_at
             FROM products
             ORDER BY created_at DESC",
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let products = stmt
        .query_map([], parse_product_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(products)
}

/// Get the current photo set version for a product.
///
/// # Returns
///
/// * `Ok(Some(version))` - The current version token
/// * `Ok(None)` - If the product does not exist
pub fn get_photo_set_version(conn: &Connection, id: ProductId) -> Result<Option<PhotoSetVersion>> {
    let result = conn.query_row(
        "SELECT photo_set_version FROM products WHERE id = :id",
        rusqlite::named_params! { ":id": id.to_string() },
        |row| row.get::<_, i64>(0),
    );

    match result {
        Ok(v) => Ok(Some(PhotoSetVersion::new(v))),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Advance the photo set version, but only if the stored version still equals
/// `expected`. Used inside the commit transaction as the optimistic check.
///
/// # Returns
///
/// * `Ok(true)` - The version matched and was incremented
/// * `Ok(false)` - The stored version no longer matches (stale session)
pub fn bump_photo_set_version(
    conn: &Connection,
    id: ProductId,
    expected: PhotoSetVersion,
) -> Result<bool> {
    let rows_affected = conn
        .execute(
            "UPDATE products SET photo_set_version = :next
             WHERE id = :id AND photo_set_version = :expected",
            rusqlite::named_params! {
                ":id": id.to_string(),
                ":expected": expected.value(),
                ":next": expected.next().value(),
            },
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(rows_affected > 0)
}

/// Count rows referencing a product, one entry per referencing table.
///
/// Runs the declarative [`REFERENCE_CHECKS`] list as a single batched UNION
/// query. Callers decide between soft and hard delete based on the counts.
pub fn references_to(conn: &Connection, id: ProductId) -> Result<Vec<(&'static str, i64)>> {
    let mut sql = String::new();
    for (i, (table, column)) in REFERENCE_CHECKS.iter().enumerate() {
        if i > 0 {
            sql.push_str(" UNION ALL ");
        }
        sql.push_str(&format!(
            "SELECT '{table}' AS tbl, COUNT(*) FROM {table} WHERE {column} = :id"
        ));
    }

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::database(e.to_string()))?;

    let rows = stmt
        .query_map(
            rusqlite::named_params! { ":id": id.to_string() },
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    // Map returned table names back onto the static list
    let mut counts = Vec::with_capacity(REFERENCE_CHECKS.len());
    for (table, _) in REFERENCE_CHECKS {
        let count = rows
            .iter()
            .find(|(t, _)| t == table)
            .map(|(_, c)| *c)
            .unwrap_or(0);
        counts.push((*table, count));
    }

    Ok(counts)
}

/// Delete a product. Photo rows cascade; upload ledger rows are kept so the
/// orphan sweeper can reclaim rendition files after the TTL.
///
/// # Returns
///
/// * `Ok(true)` - If the product was deleted
/// * `Ok(false)` - If the product did not exist
pub fn delete_product(conn: &Connection, id: ProductId) -> Result<bool> {
    let rows_affected = conn
        .execute(
            "DELETE FROM products WHERE id = :id",
            rusqlite::named_params! { ":id": id.to_string() },
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(rows_affected > 0)
}
