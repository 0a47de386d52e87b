//! Clearance-aware document access core for an enterprise
//! self-sovereign-identity deployment: section parsing and encryption,
//! a zero-knowledge document registry, the re-encryption/access-grant
//! engine, and the ephemeral-copy lifecycle.

pub mod blob_store;
pub mod canonical;
pub mod config;
pub mod copy;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod identity_agent;
pub mod parser;
pub mod registry;
pub mod revocation;
pub mod tier;

pub use config::CoreConfig;
pub use engine::{AccessRequest, Denial, EngineConfig, GrantedAccess, ReEncryptionEngine};
pub use error::ErrorCode;
pub use registry::{DocumentRegistry, SharedRegistry};
pub use tier::Tier;
