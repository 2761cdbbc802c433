//! Vitrine-Common: Shared types, constants, and utilities.
//!
//! This crate provides common functionality used across vitrine:
//!
//! - **Typed IDs**: Type-safe UUID wrappers for products and photos
//! - **Core Types**: Rendition size tags, rendition records, and version tokens
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use vitrine_common::{PhotoId, ProductId, SizeTag, Error, Result};
//!
//! // Create typed IDs
//! let product_id = ProductId::new();
//! let photo_id = PhotoId::new();
//!
//! // Work with rendition sizes
//! assert_eq!(SizeTag::Thumb.max_edge(), 160);
//!
//! // Use common error types
//! fn example() -> Result<()> {
//!     Err(Error::not_found("photo"))
//! }
//! ```

pub mod error;
pub mod ids;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
