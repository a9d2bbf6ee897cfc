//! # Ingestors Library
//!
//! Schema-agnostic HTTP ingestion and entity reconciliation: a poller that
//! fetches arbitrary JSON APIs, declarative field mappings that project the
//! payloads onto a fixed entity model, and identity-keyed upserts into the
//! reconciliation tables.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod models;
pub mod poller;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub use migration;
