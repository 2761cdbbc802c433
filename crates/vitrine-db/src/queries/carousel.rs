//! Homepage carousel slot queries.
//!
//! Slots live on the products table as a nullable position column with a
//! partial unique index. These queries are the raw operations the slot
//! allocator composes inside its transaction.

use rusqlite::Connection;
use uuid::Uuid;
use vitrine_common::{Error, ProductId, Result};

use crate::models::CarouselEntry;

/// The product currently holding a carousel position, if any.
pub fn holder_of(conn: &Connection, position: u32) -> Result<Option<ProductId>> {
    let result = conn.query_row(
        "SELECT id FROM products WHERE carousel_position = :position",
        rusqlite::named_params! { ":position": position },
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(id) => Ok(Some(ProductId::from(
            Uuid::parse_str(&id).map_err(|e| Error::database(e.to_string()))?,
        ))),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Set or clear a product's carousel position.
///
/// # Returns
///
/// * `Ok(true)` - The product exists and its position was written
/// * `Ok(false)` - No such product
pub fn set_position(conn: &Connection, product_id: ProductId, position: Option<u32>) -> Result<bool> {
    let rows_affected = conn
        .execute(
            "UPDATE products SET carousel_position = :position WHERE id = :id",
            rusqlite::named_params! {
                ":id": product_id.to_string(),
                ":position": position,
            },
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(rows_affected > 0)
}

/// All occupied carousel slots, ascending by position. Positions may be
/// sparse; no compaction happens here or anywhere else.
pub fn list_slots(conn: &Connection) -> Result<Vec<CarouselEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, carousel_position FROM products
             WHERE carousel_position IS NOT NULL
             ORDER BY carousel_position ASC",
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let entries = stmt
        .query_map([], |row| {
            Ok(CarouselEntry {
                product_id: ProductId::from(
                    Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
                ),
                name: row.get(1)?,
                position: row.get(2)?,
            })
        })
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use crate::queries::products::create_product;

    #[test]
    fn test_holder_of_empty() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        assert!(holder_of(&conn, 1).unwrap().is_none());
    }

    #[test]
    fn test_set_and_find_holder() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let product = create_product(&conn, "P").unwrap();

        assert!(set_position(&conn, product.id, Some(3)).unwrap());
        assert_eq!(holder_of(&conn, 3).unwrap(), Some(product.id));
    }

    #[test]
    fn test_set_position_unknown_product() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        assert!(!set_position(&conn, ProductId::new(), Some(1)).unwrap());
    }

    #[test]
    fn test_clear_position() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let product = create_product(&conn, "P").unwrap();

        set_position(&conn, product.id, Some(2)).unwrap();
        set_position(&conn, product.id, None).unwrap();
        assert!(holder_of(&conn, 2).unwrap().is_none());
    }

    #[test]
    fn test_list_slots_ascending_and_sparse() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let a = create_product(&conn, "A").unwrap();
        let b = create_product(&conn, "B").unwrap();
        let c = create_product(&conn, "C").unwrap();
        let _unslotted = create_product(&conn, "D").unwrap();

        set_position(&conn, a.id, Some(7)).unwrap();
        set_position(&conn, b.id, Some(2)).unwrap();
        set_position(&conn, c.id, Some(4)).unwrap();

        let slots = list_slots(&conn).unwrap();
        let positions: Vec<u32> = slots.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![2, 4, 7]);
        assert_eq!(slots[0].product_id, b.id);
    }

    #[test]
    fn test_duplicate_position_rejected_by_index() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let a = create_product(&conn, "A").unwrap();
        let b = create_product(&conn, "B").unwrap();

        set_position(&conn, a.id, Some(1)).unwrap();
        assert!(set_position(&conn, b.id, Some(1)).is_err());
    }
}
