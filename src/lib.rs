//! Vitrine - catalog photo management and homepage carousel service
//!
//! This library crate exposes the core functionality for integration testing.

pub mod carousel;
pub mod config;
pub mod photos;
pub mod server;
