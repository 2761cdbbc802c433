//! Database query modules.
//!
//! This module organizes all database operations into logical groups:
//! - products: Product CRUD, version tokens, and reference checks
//! - photos: Committed photo rows and commit-apply helpers
//! - uploads: Ingest ledger and orphan lookups
//! - carousel: Homepage slot assignment and listing

pub mod carousel;
pub mod photos;
pub mod products;
pub mod uploads;
