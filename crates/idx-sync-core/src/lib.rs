//! # idx-sync Core
//!
//! Platform-free logic for idx-sync: index fragment models, the in-memory
//! schema cache, and the [`store::TableStore`] abstraction that the
//! synchronizer and upsert engine write through.
//!
//! This crate contains no tokio, sqlx, or network dependencies. The
//! database-backed stores live in the `idx-sync` crate.

pub mod models;
pub mod schema;
pub mod store;
