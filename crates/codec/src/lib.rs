#![warn(missing_docs)]
//! Object-graph codec.
//!
//! Serializes a cyclic, identity-bearing entity graph to tag-structured
//! markup and back. Reads intern entities in a [`World`] so that repeated
//! ids resolve to one live instance; writes redact per [`WriteScope`].
//! Entity types plug in through the [`Entity`] trait and a [`TypeRegistry`].
//!
//! [`WriteScope`]: colonia_core::WriteScope

pub mod compat;
pub mod entity;
pub mod error;
pub mod markup;
pub mod reader;
pub mod registry;
pub mod save;
pub mod world;
pub mod writer;

pub use entity::{weak_id, Entity, EntityHandle, Shared, WeakHandle};
pub use error::{CodecError, ParseError, Result};
pub use markup::{CursorOptions, MarkupReader, MarkupWriter, TagKind};
pub use reader::{GraphReader, ID_ATTRIBUTE, LEGACY_ID_ATTRIBUTE};
pub use registry::{IdentityRegistry, TypeRegistry};
pub use save::{read_game, write_game, LoadedGame};
pub use world::{Detached, World};
pub use writer::{to_markup, GraphWriter, WriterOptions};
