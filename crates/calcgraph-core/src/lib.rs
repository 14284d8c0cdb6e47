//! Data model shared by every calcgraph crate.
//!
//! # Modules
//!
//! - [`id`]: `NodeId`, the identifier that doubles as a formula variable name
//! - [`node`]: `Node` and its write-once `OwnerRef` triple
//! - [`entity`]: `Entity`, the external record a node augments
//! - [`sentinel`]: Excel-style error tokens stored in place of a value
//! - [`encode`]: JSON encoding of stored node values
//! - [`error`]: CoreError

pub mod encode;
pub mod entity;
pub mod error;
pub mod id;
pub mod node;
pub mod sentinel;

pub use encode::{as_sentinel, decode_value, encode_sentinel, encode_value};
pub use entity::Entity;
pub use error::CoreError;
pub use id::{is_identifier, NodeId, RESERVED_WORDS};
pub use node::{Node, OwnerRef};
pub use sentinel::{Sentinel, RESERVED_TOKENS, UNAUTHORIZED_TOKEN};
