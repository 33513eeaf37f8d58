#![warn(missing_docs)]
//! Shared test support: a fixture entity model, a populated sample world and
//! structural snapshot helpers for markup documents.

pub mod fixtures;
mod sample;
mod snapshot;

pub use fixtures::{
    empty_world, fixture_types, register_types, Game, Player, Stance, Tile, TileItemContainer,
    Unit,
};
pub use sample::{id, sample_world, Sample};
pub use snapshot::*;
