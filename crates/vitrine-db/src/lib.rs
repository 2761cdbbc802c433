//! Vitrine-DB: Database schema, migrations, and query operations
//!
//! This crate provides database functionality for vitrine using SQLite
//! with rusqlite and r2d2 connection pooling.
//!
//! # Modules
//!
//! - `migrations` - Database schema migrations
//! - `pool` - Connection pool management
//! - `models` - Rust models matching database schema
//! - `queries` - Database query operations
//!
//! # Example
//!
//! ```no_run
//! use vitrine_db::pool::{init_pool, get_conn};
//! use vitrine_db::queries::products;
//!
//! let pool = init_pool("/var/lib/vitrine/db.sqlite").unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let product = products::create_product(&conn, "Walnut desk").unwrap();
//! println!("Created product: {}", product.id);
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
