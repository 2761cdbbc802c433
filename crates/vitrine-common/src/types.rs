//! Core type definitions for renditions and photo set versioning.
//!
//! This module defines the rendition size tags, the per-photo rendition
//! sub-record persisted alongside photo metadata, and the version token used
//! for optimistic concurrency on a product's photo set.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size tag for stored renditions.
///
/// Every ingested photo is transcoded into all four sizes; the bound is the
/// longest edge in pixels, aspect preserved, never upscaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeTag {
    /// Thumbnail rendition (160px longest edge).
    Thumb,
    /// Small rendition (320px longest edge).
    Small,
    /// Medium rendition (640px longest edge).
    Medium,
    /// Large rendition (1280px longest edge).
    Large,
}

impl SizeTag {
    /// Longest-edge bound in pixels for this size tag.
    pub fn max_edge(&self) -> u32 {
        match self {
            Self::Thumb => 160,
            Self::Small => 320,
            Self::Medium => 640,
            Self::Large => 1280,
        }
    }

    /// All size tags, in ascending size order.
    pub fn all() -> &'static [SizeTag] {
        &[Self::Thumb, Self::Small, Self::Medium, Self::Large]
    }

    /// Parse a size tag from its lowercase name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "thumb" => Some(Self::Thumb),
            "small" => Some(Self::Small),
            "medium" => Some(Self::Medium),
            "large" => Some(Self::Large),
            _ => None,
        }
    }
}

impl fmt::Display for SizeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thumb => write!(f, "thumb"),
            Self::Small => write!(f, "small"),
            Self::Medium => write!(f, "medium"),
            Self::Large => write!(f, "large"),
        }
    }
}

/// One stored rendition of a photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rendition {
    /// Path of the rendition relative to the store root.
    pub path: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// The full rendition sub-record for a photo, one entry per size tag.
///
/// Persisted as a JSON column on the photo row; two photos with the same
/// content hash share the same underlying files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Renditions {
    pub thumb: Rendition,
    pub small: Rendition,
    pub medium: Rendition,
    pub large: Rendition,
}

impl Renditions {
    /// Get the rendition for a size tag.
    pub fn get(&self, tag: SizeTag) -> &Rendition {
        match tag {
            SizeTag::Thumb => &self.thumb,
            SizeTag::Small => &self.small,
            SizeTag::Medium => &self.medium,
            SizeTag::Large => &self.large,
        }
    }
}

/// Monotonic version token for a product's committed photo set.
///
/// Every successful commit increments the version; a staged edit session
/// carries the version it was opened against and commit fails with a conflict
/// when the two no longer match.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct PhotoSetVersion(i64);

impl PhotoSetVersion {
    /// Wrap a raw version number.
    pub fn new(v: i64) -> Self {
        Self(v)
    }

    /// The raw version number.
    pub fn value(&self) -> i64 {
        self.0
    }

    /// The version that follows a successful commit.
    #[must_use]
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for PhotoSetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maximum number of committed photos per product.
pub const MAX_PHOTOS_PER_PRODUCT: usize = 5;

/// Maximum accepted upload size in bytes (5 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;
