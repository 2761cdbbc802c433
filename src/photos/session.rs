//! Staged edit sessions for a product's photo set.
//!
//! A session accumulates proposed operations (add, delete, reorder, set
//! primary) against the photo snapshot it was opened on. Nothing is persisted
//! until the commit coordinator applies the whole batch; discarding a session
//! drops only local state. Each staging call validates against the effective
//! view so impossible batches are rejected at stage time, not commit time.
//!
//! Sessions are owned by exactly one editing actor and carry no internal
//! locking.

use rusqlite::Connection;
use vitrine_common::{Error, PhotoId, PhotoSetVersion, ProductId, Renditions, Result};
use vitrine_db::models::Photo;
use vitrine_db::queries::{photos, products};

use super::ingest::PhotoDescriptor;
use vitrine_common::MAX_PHOTOS_PER_PRODUCT;

/// One staged operation. A closed set: every operation the commit coordinator
/// can apply is representable here and nothing else is.
#[derive(Debug, Clone)]
pub enum StagedOp {
    /// Add an ingested upload as a new photo. The id is assigned at stage
    /// time so later staged ops can reference the pending photo.
    Add {
        id: PhotoId,
        descriptor: PhotoDescriptor,
    },
    /// Delete a photo from the set.
    Delete { id: PhotoId },
    /// Replace the display ordering with an explicit permutation.
    Reorder { order: Vec<PhotoId> },
    /// Make one photo the primary.
    SetPrimary { id: PhotoId },
}

/// One photo as it would exist after commit: base snapshot with all staged
/// operations applied.
#[derive(Debug, Clone)]
pub struct EffectivePhoto {
    pub id: PhotoId,
    pub content_hash: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub renditions: Renditions,
    pub is_primary: bool,
    pub display_order: u32,
    /// True for staged additions that have no committed row yet.
    pub pending: bool,
}

/// An in-progress batch of edits to one product's photo set.
#[derive(Debug)]
pub struct EditSession {
    product_id: ProductId,
    base_version: PhotoSetVersion,
    base: Vec<Photo>,
    ops: Vec<StagedOp>,
}

impl EditSession {
    /// Open a session on an explicit base snapshot.
    pub fn open(product_id: ProductId, base: Vec<Photo>, base_version: PhotoSetVersion) -> Self {
        Self {
            product_id,
            base_version,
            base,
            ops: Vec::new(),
        }
    }

    /// Open a session on the product's current committed snapshot.
    pub fn open_current(conn: &Connection, product_id: ProductId) -> Result<Self> {
        let version = products::get_photo_set_version(conn, product_id)?
            .ok_or_else(|| Error::not_found(format!("product {product_id}")))?;
        let base = photos::get_photos_for_product(conn, product_id)?;
        Ok(Self::open(product_id, base, version))
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    /// The committed version this session was opened against.
    pub fn base_version(&self) -> PhotoSetVersion {
        self.base_version
    }

    /// Staged operations in staging order.
    pub fn staged_ops(&self) -> &[StagedOp] {
        &self.ops
    }

    pub fn has_staged_ops(&self) -> bool {
        !self.ops.is_empty()
    }

    /// Stage adding an ingested upload to the set.
    ///
    /// Returns the `PhotoId` the photo will carry once committed. Staging the
    /// same content hash twice is idempotent and returns the existing id.
    pub fn stage_add(&mut self, descriptor: PhotoDescriptor) -> Result<PhotoId> {
        let view = self.effective_view();

        if let Some(existing) = view
            .iter()
            .find(|p| p.content_hash == descriptor.content_hash)
        {
            return Ok(existing.id);
        }

        if view.len() + 1 > MAX_PHOTOS_PER_PRODUCT {
            return Err(Error::PhotoLimitExceeded {
                limit: MAX_PHOTOS_PER_PRODUCT,
            });
        }

        let id = PhotoId::new();
        self.ops.push(StagedOp::Add { id, descriptor });
        Ok(id)
    }

    /// Stage deleting a photo.
    pub fn stage_delete(&mut self, id: PhotoId) -> Result<()> {
        if !self.in_effective_view(id) {
            return Err(Error::UnknownPhotoReference(id));
        }
        self.ops.push(StagedOp::Delete { id });
        Ok(())
    }

    /// Stage an explicit reordering of the whole effective set.
    ///
    /// The list must be a permutation of the effective view's ids: every id
    /// known, no id missing, no duplicates.
    pub fn stage_reorder(&mut self, order: Vec<PhotoId>) -> Result<()> {
        let view = self.effective_view();

        for id in &order {
            if !view.iter().any(|p| p.id == *id) {
                return Err(Error::UnknownPhotoReference(*id));
            }
        }
        if order.len() != view.len() {
            return Err(Error::invalid_input(format!(
                "reorder list has {} ids but the photo set has {}",
                order.len(),
                view.len()
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for id in &order {
            if !seen.insert(*id) {
                return Err(Error::invalid_input(format!("duplicate id in reorder: {id}")));
            }
        }

        self.ops.push(StagedOp::Reorder { order });
        Ok(())
    }

    /// Stage making a photo the primary.
    ///
    /// Rejected when the id is absent from the effective view, which includes
    /// photos currently staged for deletion.
    pub fn stage_set_primary(&mut self, id: PhotoId) -> Result<()> {
        if !self.in_effective_view(id) {
            return Err(Error::UnknownPhotoReference(id));
        }
        self.ops.push(StagedOp::SetPrimary { id });
        Ok(())
    }

    /// Abandon all staged operations.
    ///
    /// Renditions ingested for staged additions stay on disk; the orphan
    /// sweeper expires them once their grace period passes.
    pub fn discard(self) {
        if !self.ops.is_empty() {
            tracing::debug!(
                product_id = %self.product_id,
                staged = self.ops.len(),
                "discarding edit session"
            );
        }
    }

    fn in_effective_view(&self, id: PhotoId) -> bool {
        self.effective_view().iter().any(|p| p.id == id)
    }

    /// The base snapshot with all staged operations applied, in staging
    /// order. Display orders are always a contiguous `1..=N` and a non-empty
    /// view always has exactly one primary: deleting the primary promotes the
    /// first remaining photo until an explicit `SetPrimary` overrides it.
    pub fn effective_view(&self) -> Vec<EffectivePhoto> {
        let mut view: Vec<EffectivePhoto> = self
            .base
            .iter()
            .map(|p| EffectivePhoto {
                id: p.id,
                content_hash: p.content_hash.clone(),
                width: p.width,
                height: p.height,
                renditions: p.renditions.clone(),
                is_primary: p.is_primary,
                display_order: p.display_order,
                pending: false,
            })
            .collect();
        view.sort_by_key(|p| p.display_order);

        for op in &self.ops {
            match op {
                StagedOp::Add { id, descriptor } => {
                    view.push(EffectivePhoto {
                        id: *id,
                        content_hash: descriptor.content_hash.clone(),
                        width: Some(descriptor.width),
                        height: Some(descriptor.height),
                        renditions: descriptor.renditions.clone(),
                        is_primary: false,
                        display_order: 0, // renumbered below
                        pending: true,
                    });
                }
                StagedOp::Delete { id } => {
                    view.retain(|p| p.id != *id);
                }
                StagedOp::Reorder { order } => {
                    view.sort_by_key(|p| {
                        order.iter().position(|id| *id == p.id).unwrap_or(usize::MAX)
                    });
                }
                StagedOp::SetPrimary { id } => {
                    for p in view.iter_mut() {
                        p.is_primary = p.id == *id;
                    }
                }
            }

            normalize(&mut view);
        }

        normalize(&mut view);
        view
    }
}

/// Renumber display orders to `1..=N` and guarantee exactly one primary on a
/// non-empty view.
fn normalize(view: &mut [EffectivePhoto]) {
    for (i, p) in view.iter_mut().enumerate() {
        p.display_order = (i + 1) as u32;
    }

    if !view.is_empty() && !view.iter().any(|p| p.is_primary) {
        view[0].is_primary = true;
    }
    // Enforce at most one flag even if the base snapshot was inconsistent
    let mut found = false;
    for p in view.iter_mut() {
        if p.is_primary {
            if found {
                p.is_primary = false;
            }
            found = true;
        }
    }
}
