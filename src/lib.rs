//! # idx-sync
//!
//! Schema-on-write synchronization of per-document index fragments into a
//! relational store.
//!
//! Each document of a content repository has an index fragment: a JSON
//! object mapping table names to `{"entries": {...}}`. idx-sync scans the
//! repository tree, fetches every fragment, grows the destination schema
//! (tables and columns) to fit whatever entries appear, and upserts one row
//! per `(document, table)` keyed by the document path.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────────────────────┐   ┌──────────┐
//! │ GitHub     │──▶│ Fragment     │──▶│ Orchestrator                 │──▶│ SQLite / │
//! │ tree scan  │   │ fetch (HTTP) │   │ SchemaSynchronizer + Upsert  │   │ Postgres │
//! └────────────┘   └──────────────┘   └──────────────────────────────┘   └──────────┘
//! ```
//!
//! Two storage modes exist: *columnar* (one text column per entry name) and
//! *json* (a single `entries` document column).
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Fatal and per-item error taxonomy |
//! | [`sql`] | Identifier quoting and statement builders |
//! | [`db`] | Store connection by URL scheme |
//! | [`sqlite_store`] | SQLite table store |
//! | [`pg_store`] | PostgreSQL table store |
//! | [`schema_sync`] | Table and column creation |
//! | [`upsert`] | Row construction and upsert |
//! | [`orchestrator`] | Concurrent fan-out and run summary |
//! | [`traits`] | Tree and fragment source seams |
//! | [`connector_github`] | GitHub tree scan |
//! | [`fetch`] | HTTP fragment retrieval |
//! | [`ingest`] | End-to-end sync run |
//! | [`progress`] | Progress reporting |

pub mod config;
pub mod connector_github;
pub mod db;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod orchestrator;
pub mod pg_store;
pub mod progress;
pub mod schema_sync;
pub mod sql;
pub mod sqlite_store;
pub mod traits;
pub mod upsert;

pub use idx_sync_core as core;
