//! Persistence store for generations and their audit trail
//!
//! `store` holds the traits the coordinator depends on; the PostgreSQL
//! repositories and the in-memory store implement them.

pub mod asset;
pub mod event;
pub mod explain;
pub mod generation;
pub mod memory;
pub mod store;
pub mod transaction;

pub use asset::AssetRepository;
pub use event::EventRepository;
pub use explain::ExplainRepository;
pub use generation::GenerationRepository;
pub use memory::InMemoryStore;
pub use store::{AssetStore, EventStore, ExplainStore, GenerationStore, Persistence};
pub use transaction::TransactionGuard;
