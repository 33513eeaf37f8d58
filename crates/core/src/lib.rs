#![warn(missing_docs)]
//! Core primitives shared across the workspace.
//!
//! Object identifiers and the read/write scopes that steer the object-graph
//! codec live here so that the network and persistence layers agree on them
//! without depending on each other.

pub mod object_id;
pub mod scope;

pub use object_id::{ObjectId, ObjectIdError};
pub use scope::{ReadScope, ScopeError, Visible, WriteScope, WriteScopeKind};
