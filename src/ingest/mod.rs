//! Ingestion engine
//!
//! The core of the service: authentication lifecycle, delta detection,
//! schema-agnostic field extraction, entity resolution, and the per-source
//! sync orchestrator that ties them together.

pub mod auth;
pub mod delta;
pub mod mapper;
pub mod orchestrator;
pub mod resolver;
pub mod token_discovery;
pub mod unwrap;

pub use auth::{AuthSession, AuthState, RequestSpec, UpstreamResponse};
pub use delta::{DeltaDetector, DeltaOutcome};
pub use mapper::{MappedItem, extract_path, map_item};
pub use orchestrator::{SyncOrchestrator, SyncOutcome};
pub use resolver::{EntityResolver, TargetKind, TypeCache};
pub use token_discovery::{DiscoveredTokens, discover_tokens};
pub use unwrap::unwrap_payload;
