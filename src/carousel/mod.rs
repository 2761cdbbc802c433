//! Homepage carousel slot allocation.
//!
//! Assignment is explicit-conflict: a position held by another product is
//! rejected with the holder's identity, never silently displaced. Concurrent
//! editors therefore resolve collisions deliberately instead of shuffling
//! each other's slots. Positions may be sparse and are never compacted.

use rusqlite::TransactionBehavior;
use vitrine_common::{Error, ProductId, Result};
use vitrine_db::models::CarouselEntry;
use vitrine_db::pool::{get_conn, DbPool};
use vitrine_db::queries::carousel;

/// Allocator for homepage display positions.
pub struct CarouselAllocator {
    pool: DbPool,
}

impl CarouselAllocator {
    /// Create a new `CarouselAllocator`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Assign a carousel position to a product, or clear it with `None`.
    ///
    /// Clearing always succeeds for an existing product. Assigning a position
    /// held by a different product fails with [`Error::SlotTaken`] carrying
    /// the holder; re-assigning a product its own position is a no-op
    /// success. The holder check and the write share one transaction so two
    /// racing assignments cannot both win.
    pub fn assign(&self, product_id: ProductId, position: Option<u32>) -> Result<()> {
        let mut conn = get_conn(&self.pool)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::database(e.to_string()))?;

        if let Some(pos) = position {
            if pos == 0 {
                return Err(Error::invalid_input("carousel position must be positive"));
            }

            if let Some(holder) = carousel::holder_of(&tx, pos)? {
                if holder == product_id {
                    // Already holds this slot
                    tx.commit().map_err(|e| Error::database(e.to_string()))?;
                    return Ok(());
                }
                return Err(Error::SlotTaken {
                    position: pos,
                    holder,
                });
            }
        }

        if !carousel::set_position(&tx, product_id, position)? {
            return Err(Error::not_found(format!("product {product_id}")));
        }

        tx.commit().map_err(|e| Error::database(e.to_string()))?;

        match position {
            Some(pos) => tracing::info!(%product_id, position = pos, "assigned carousel slot"),
            None => tracing::info!(%product_id, "cleared carousel slot"),
        }

        Ok(())
    }

    /// All occupied slots, ascending by position.
    pub fn list(&self) -> Result<Vec<CarouselEntry>> {
        let conn = get_conn(&self.pool)?;
        carousel::list_slots(&conn)
    }
}
