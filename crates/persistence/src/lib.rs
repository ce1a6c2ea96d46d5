//! # Persistence
//!
//! High-level, application-specific interface to the PostgreSQL database.
//! The system's permanent archive of bots, orders, positions, spread
//! history, trade logs, and exchange account credentials.
//!
//! ## Architectural Principles
//!
//! - **Layer 3 Adapter:** encapsulates all database-specific logic behind a
//!   clean, abstract API; the rest of the application never writes SQL.
//! - **Asynchronous & Pooled:** every operation is async, backed by a shared
//!   `PgPool`.
//!
//! ## Public API
//!
//! - `connect`/`run_migrations`: startup plumbing.
//! - `DbRepository`: CRUD + transactional writes over the entity tables.
//! - `backup`: daily archival snapshot with retention.
//! - `DbError`: this crate's error type.

pub mod backup;
pub mod connection;
pub mod error;
pub mod repository;

pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use repository::DbRepository;
