//! Atomic commit coordinator for staged edit sessions.
//!
//! The coordinator is the only place committed photo metadata is mutated.
//! Commits against the same product are serialized through a per-product
//! lock, and the session's base version is re-checked inside the transaction
//! so a stale session can never partially apply. The transaction touches
//! metadata only; rendition bytes were written during ingest and orphaned
//! files are left to the sweeper.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rusqlite::TransactionBehavior;
use serde::Serialize;
use vitrine_common::{
    Error, PhotoId, PhotoSetVersion, ProductId, Result, MAX_PHOTOS_PER_PRODUCT,
};
use vitrine_db::models::Photo;
use vitrine_db::pool::{get_conn, DbPool};
use vitrine_db::queries::{photos, products};

use super::session::{EditSession, EffectivePhoto, StagedOp};

/// The committed photo set returned from a successful commit.
#[derive(Debug, Clone, Serialize)]
pub struct CommittedSet {
    pub photos: Vec<Photo>,
    pub version: PhotoSetVersion,
}

/// Serializes and applies session commits, one product at a time.
pub struct CommitCoordinator {
    pool: DbPool,
    locks: DashMap<ProductId, Arc<Mutex<()>>>,
}

impl CommitCoordinator {
    /// Create a new `CommitCoordinator`.
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            locks: DashMap::new(),
        }
    }

    /// Validate a session's effective view and apply it as one transaction.
    ///
    /// On success the caller should drop the session; the returned
    /// [`CommittedSet`] is the new snapshot. On any error the database is
    /// unchanged and the session stays valid for retry — a stale base version
    /// surfaces as [`Error::Conflict`] and requires reopening on the fresh
    /// snapshot instead.
    pub fn commit(&self, session: &EditSession) -> Result<CommittedSet> {
        let product_id = session.product_id();

        let lock = self
            .locks
            .entry(product_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();

        let view = session.effective_view();
        validate_view(&view)?;

        let mut conn = get_conn(&self.pool)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::database(e.to_string()))?;

        // Optimistic check against the committed version, inside the
        // transaction so it cannot race another commit.
        let current = products::get_photo_set_version(&tx, product_id)?
            .ok_or_else(|| Error::not_found(format!("product {product_id}")))?;
        if current != session.base_version() {
            return Err(Error::conflict(format!(
                "photo set version is {current}, session was opened on {}",
                session.base_version()
            )));
        }

        // 1. Delete rows for staged deletions
        for op in session.staged_ops() {
            if let StagedOp::Delete { id } = op {
                photos::delete_photo(&tx, *id)?;
            }
        }

        // 2. Insert rows for staged additions at their final position
        for photo in view.iter().filter(|p| p.pending) {
            photos::insert_photo(
                &tx,
                &Photo {
                    id: photo.id,
                    product_id,
                    content_hash: photo.content_hash.clone(),
                    width: photo.width,
                    height: photo.height,
                    renditions: photo.renditions.clone(),
                    is_primary: photo.is_primary,
                    display_order: photo.display_order,
                    created_at: Utc::now(),
                },
            )?;
        }

        // 3. Rewrite display order for surviving rows
        for photo in view.iter().filter(|p| !p.pending) {
            photos::set_display_order(&tx, photo.id, photo.display_order)?;
        }

        // 4. Exactly one primary among the remaining rows
        if let Some(primary) = view.iter().find(|p| p.is_primary) {
            photos::set_primary(&tx, product_id, primary.id)?;
        }

        if !products::bump_photo_set_version(&tx, product_id, current)? {
            // The version moved underneath us despite the lock; bail out and
            // let the rollback undo everything.
            return Err(Error::conflict(format!(
                "photo set version for {product_id} changed during commit"
            )));
        }

        tx.commit().map_err(|e| Error::database(e.to_string()))?;

        let committed = photos::get_photos_for_product(&conn, product_id)?;
        let version = products::get_photo_set_version(&conn, product_id)?
            .ok_or_else(|| Error::not_found(format!("product {product_id}")))?;

        tracing::info!(
            %product_id,
            %version,
            photos = committed.len(),
            "committed photo set"
        );

        Ok(CommittedSet {
            photos: committed,
            version,
        })
    }
}

/// Validate the invariants every committed set must satisfy: photo count
/// within the limit, exactly one primary when non-empty, display orders a
/// permutation of `1..=N`.
fn validate_view(view: &[EffectivePhoto]) -> Result<()> {
    if view.len() > MAX_PHOTOS_PER_PRODUCT {
        return Err(Error::PhotoLimitExceeded {
            limit: MAX_PHOTOS_PER_PRODUCT,
        });
    }

    let primaries = view.iter().filter(|p| p.is_primary).count();
    if view.is_empty() {
        if primaries != 0 {
            return Err(Error::invalid_input("empty photo set cannot have a primary"));
        }
    } else if primaries != 1 {
        return Err(Error::invalid_input(format!(
            "photo set must have exactly one primary, found {primaries}"
        )));
    }

    let mut orders: Vec<u32> = view.iter().map(|p| p.display_order).collect();
    orders.sort_unstable();
    let expected: Vec<u32> = (1..=view.len() as u32).collect();
    if orders != expected {
        return Err(Error::invalid_input(format!(
            "display orders {orders:?} are not a permutation of 1..={}",
            view.len()
        )));
    }

    let mut ids: Vec<PhotoId> = view.iter().map(|p| p.id).collect();
    ids.sort_by_key(|id| uuid::Uuid::from(*id));
    ids.dedup();
    if ids.len() != view.len() {
        return Err(Error::invalid_input("duplicate photo id in effective view"));
    }

    Ok(())
}
