//! # Repository Layer
//!
//! Repositories encapsulating SeaORM operations for the configuration
//! tables (sources, endpoints, mappings), the five reconciliation targets,
//! and the outbox. This is the narrow persistence surface the ingestion
//! engine is allowed to touch.

pub mod entities;
pub mod outbox;
pub mod source;

pub use entities::EntityRepository;
pub use outbox::OutboxRepository;
pub use source::SourceRepository;
