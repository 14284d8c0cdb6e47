//! Reactive formula engine.
//!
//! Every node holds a formula over other nodes' ids. Saving a node resolves
//! its dependencies, evaluates it, and re-evaluates everything downstream in
//! breadth-first order; deleting one rewrites its dependents to `#REF!`.
//! Nodes may belong to an owning entity, which is touched whenever the
//! node's stored result changes and which gates who may read the result.
//!
//! # Modules
//!
//! - [`engine`]: `Engine`, the lifecycle entry points
//! - [`resolver`]: formula identifiers to `depends_on` and environment
//! - [`evaluate`]: compile and run with sentinel mapping
//! - [`propagate`]: breadth-first change propagation
//! - [`cascade`]: deletion cascade
//! - [`owner`]: owner touch
//! - [`mask`]: read-time access masking
//! - [`access`]: requester permissions
//! - [`integrity`]: whole-graph verification
//! - [`config`]: EngineConfig
//! - [`error`]: EngineError

pub mod access;
pub mod cascade;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod integrity;
pub mod mask;
pub mod owner;
pub mod propagate;
pub mod resolver;

pub use access::{AccessContext, CollectionAccess, Superuser};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use evaluate::{Outcome, MISSING_REFERENCE};
pub use integrity::IntegrityReport;
