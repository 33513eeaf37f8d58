//! Save-document envelope.
//!
//! A save is one `<savedGame version="N">` element wrapping the top-level
//! entities, written with full save fidelity. Opening files, archives and
//! compression belong to whoever supplies the byte stream.

use std::io::{Read, Write};

use colonia_core::{ReadScope, WriteScope};
use tracing::info;

use crate::entity::EntityHandle;
use crate::error::{CodecError, Result};
use crate::reader::GraphReader;
use crate::world::World;
use crate::writer::{GraphWriter, WriterOptions};

/// Format version written into new saves.
pub const SAVE_FORMAT_VERSION: u32 = 2;

/// Document element of a save.
pub const SAVE_ROOT_TAG: &str = "savedGame";

/// Version attribute on the document element.
pub const VERSION_ATTRIBUTE: &str = "version";

/// Result of [`read_game`].
#[derive(Debug)]
pub struct LoadedGame {
    /// Format version recorded in the document.
    pub version: u32,
    /// Top-level entities, in document order.
    pub roots: Vec<EntityHandle>,
}

/// Write `roots` as a save document to `sink`.
pub fn write_game<W: Write>(sink: W, roots: &[EntityHandle], options: WriterOptions) -> Result<()> {
    let mut xw = GraphWriter::with_options(sink, WriteScope::save(), options)?;
    xw.write_start(SAVE_ROOT_TAG)?;
    xw.write_attribute(VERSION_ATTRIBUTE, SAVE_FORMAT_VERSION)?;
    for root in roots {
        xw.write_handle(root)?;
    }
    xw.write_end()?;
    xw.finish()?;
    info!(roots = roots.len(), version = SAVE_FORMAT_VERSION, "saved game");
    Ok(())
}

/// Read a save document from `source` into `world`.
///
/// Saves always intern: [`ReadScope::NoIntern`] is rejected.
pub fn read_game<R: Read>(source: R, world: &mut World, scope: ReadScope) -> Result<LoadedGame> {
    if !scope.should_intern() {
        return Err(CodecError::Unsupported(format!(
            "save documents cannot be read with scope {scope}"
        )));
    }
    let mut xr = GraphReader::new(source, world, scope);
    xr.enter_tag(SAVE_ROOT_TAG)?;
    let version: u32 = xr.require(VERSION_ATTRIBUTE)?;
    if version > SAVE_FORMAT_VERSION {
        return Err(CodecError::Unsupported(format!(
            "save format {version} is newer than {SAVE_FORMAT_VERSION}"
        )));
    }
    let mut roots = Vec::new();
    while xr.more_tags()? {
        roots.push(xr.read_any()?);
    }
    xr.expect_tag(SAVE_ROOT_TAG)?;
    if xr.try_next_tag()?.is_some() {
        return Err(xr.parse_error("content after the end of the save"));
    }
    info!(roots = roots.len(), version, "loaded game");
    Ok(LoadedGame { version, roots })
}
