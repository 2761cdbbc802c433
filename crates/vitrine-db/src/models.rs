//! Internal Rust models matching the database schema.
//!
//! This module provides strongly-typed Rust structures that map to database
//! tables. All models use types from vitrine-common where appropriate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vitrine_common::{PhotoId, PhotoSetVersion, ProductId, Renditions};

/// Catalog product model.
///
/// Carries the photo set version token used for optimistic concurrency and
/// the nullable homepage carousel position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub photo_set_version: PhotoSetVersion,
    pub carousel_position: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// Committed product photo model.
///
/// `renditions` is persisted as a JSON sub-record; the underlying files are
/// shared between photos with the same content hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Photo {
    pub id: PhotoId,
    pub product_id: ProductId,
    pub content_hash: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub renditions: Renditions,
    pub is_primary: bool,
    pub display_order: u32,
    pub created_at: DateTime<Utc>,
}

/// Ingest ledger entry for an upload that has been validated and transcoded.
///
/// An upload is not a committed photo; the sweeper expires entries whose hash
/// never reached the photos table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Upload {
    pub content_hash: String,
    pub product_id: ProductId,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub renditions: Renditions,
    pub created_at: DateTime<Utc>,
}

/// One occupied homepage carousel slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CarouselEntry {
    pub product_id: ProductId,
    pub name: String,
    pub position: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_common::Rendition;

    fn sample_renditions() -> Renditions {
        let r = |tag: &str| Rendition {
            path: format!("ab12/{tag}.jpg"),
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

    #[test]
    fn test_photo_serialization_roundtrip() {
        let photo = Photo {
            id: PhotoId::new(),
            product_id: ProductId::new(),
            content_hash: "ab12cd34".to_string(),
            width: Some(1600),
            height: Some(1200),
            renditions: sample_renditions(),
            is_primary: true,
            display_order: 1,
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&photo).unwrap();
        let back: Photo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, photo);
    }

    #[test]
    fn test_product_version_default_zero() {
        let product = Product {
            id: ProductId::new(),
            name: "Walnut desk".to_string(),
            photo_set_version: PhotoSetVersion::default(),
            carousel_position: None,
            created_at: Utc::now(),
        };
        assert_eq!(product.photo_set_version.value(), 0);
        assert!(product.carousel_position.is_none());
    }
}
