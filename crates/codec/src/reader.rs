//! Object-graph reader: markup cursor plus identity resolution.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::Read;
use std::ops::{Deref, DerefMut};

use colonia_core::{ObjectId, ReadScope};
use tracing::{debug, trace, warn};

use crate::compat::upgrade_id;
use crate::entity::{Entity, EntityHandle, Shared};
use crate::error::{CodecError, Result};
use crate::markup::{CursorOptions, MarkupReader};
use crate::world::{downcast_handle, Detached, World};

/// Reserved identifier attribute.
pub const ID_ATTRIBUTE: &str = "id";

/// Identifier attribute name used by older documents.
pub const LEGACY_ID_ATTRIBUTE: &str = "ID";

/// Reads entities from one markup document into a [`World`].
///
/// Under [`ReadScope::Normal`] and [`ReadScope::Server`] every entity read or
/// referenced is interned in the world, so reading the same ids again updates
/// the same instances. Under [`ReadScope::NoIntern`] new entities go into a
/// map private to this reader and the world is only consulted, never changed.
///
/// Dereferences to the underlying [`MarkupReader`] for tag navigation and
/// attribute access.
pub struct GraphReader<'a> {
    cursor: MarkupReader<'a>,
    world: &'a mut World,
    scope: ReadScope,
    uninterned: BTreeMap<ObjectId, EntityHandle>,
}

impl<'a> GraphReader<'a> {
    /// Reader over `source` resolving into `world`.
    pub fn new<R: Read + 'a>(source: R, world: &'a mut World, scope: ReadScope) -> Self {
        Self::with_options(source, world, scope, CursorOptions::default())
    }

    /// Reader with explicit cursor options.
    pub fn with_options<R: Read + 'a>(
        source: R,
        world: &'a mut World,
        scope: ReadScope,
        options: CursorOptions,
    ) -> Self {
        Self {
            cursor: MarkupReader::with_options(source, options),
            world,
            scope,
            uninterned: BTreeMap::new(),
        }
    }

    /// Active read scope.
    pub fn scope(&self) -> ReadScope {
        self.scope
    }

    /// The world being read into.
    pub fn world(&self) -> &World {
        &*self.world
    }

    /// Identifier of the current element.
    ///
    /// Falls back to the legacy `ID` attribute and upgrades legacy prefixes.
    pub fn read_id(&self) -> Result<Option<ObjectId>> {
        let raw = match self.attribute(ID_ATTRIBUTE) {
            Some(raw) => raw,
            None => match self.attribute(LEGACY_ID_ATTRIBUTE) {
                Some(raw) => {
                    debug!(tag = self.local_name(), "legacy {LEGACY_ID_ATTRIBUTE} attribute");
                    raw
                }
                None => return Ok(None),
            },
        };
        let upgraded = upgrade_id(raw);
        if let Cow::Owned(current) = &upgraded {
            warn!(legacy = raw, current = %current, "upgraded legacy identifier");
        }
        ObjectId::parse(&upgraded)
            .map(Some)
            .map_err(|err| self.parse_error(format!("bad identifier: {err}")))
    }

    /// Identifier of the current element, which must be present.
    pub fn require_id(&self) -> Result<ObjectId> {
        self.read_id()?
            .ok_or_else(|| self.parse_error(format!("missing required attribute {ID_ATTRIBUTE}")))
    }

    /// Instance already known under `id` to this read.
    ///
    /// Non-interning reads see their private entities first, then the world.
    pub fn lookup(&self, id: &ObjectId) -> Option<EntityHandle> {
        if !self.scope.should_intern() {
            if let Some(handle) = self.uninterned.get(id) {
                return Some(handle.clone());
            }
        }
        self.world.get(id)
    }

    /// Resolve the reference held in attribute `attribute` to a `T`.
    ///
    /// An id nobody has seen yet produces an unpopulated placeholder that a
    /// later read of the same id fills in. An absent attribute is an error
    /// when `required`, `None` otherwise.
    pub fn find<T: Entity>(
        &mut self,
        attribute: &str,
        required: bool,
    ) -> Result<Option<Shared<T>>> {
        let Some(raw) = self.attribute(attribute) else {
            if required {
                return Err(self.parse_error(format!("missing required attribute {attribute}")));
            }
            return Ok(None);
        };
        let id = ObjectId::parse(raw)
            .map_err(|err| self.parse_error(format!("bad reference in {attribute}: {err}")))?;
        self.resolve::<T>(&id).map(Some)
    }

    /// Resolve `id` to a `T`, constructing a placeholder when it is unknown.
    pub fn resolve<T: Entity>(&mut self, id: &ObjectId) -> Result<Shared<T>> {
        if let Some(handle) = self.lookup(id) {
            return downcast_handle(self.world.types(), &handle);
        }
        let handle = self
            .world
            .types()
            .construct_as::<T>(id, self.scope.allows_server_variant())?;
        trace!(%id, "placeholder");
        self.intern(handle.clone());
        downcast_handle(self.world.types(), &handle)
    }

    /// Read the entity whose start tag the cursor is on, expecting a `T`.
    ///
    /// Leaves the cursor on the entity's end tag.
    pub fn read_entity<T: Entity>(&mut self) -> Result<Shared<T>> {
        if let Some(expected) = self.world.types().name_of::<T>() {
            if self.is_start_tag() && !self.at_tag(expected) {
                let found = self.local_name().to_string();
                return Err(CodecError::TypeMismatch {
                    id: self.require_id()?,
                    expected: expected.to_string(),
                    found,
                });
            }
        }
        let handle = self.read_any()?;
        downcast_handle(self.world.types(), &handle)
    }

    /// Read the entity whose start tag the cursor is on; the tag name selects
    /// the type.
    pub fn read_any(&mut self) -> Result<EntityHandle> {
        if !self.is_start_tag() {
            return Err(self.parse_error("start of an object expected"));
        }
        let type_name = self.local_name().to_string();
        let id = self.require_id()?;
        let handle = self.resolve_or_construct(&type_name, &id)?;
        if handle.type_name() != type_name {
            return Err(CodecError::TypeMismatch {
                id,
                expected: type_name,
                found: handle.type_name().to_string(),
            });
        }
        self.populate(&handle, &type_name)?;
        Ok(handle)
    }

    /// Advance to the next start tag and read the entity there.
    pub fn read_next<T: Entity>(&mut self) -> Result<Shared<T>> {
        self.next_tag()?;
        self.read_entity::<T>()
    }

    /// Read the next entity without interning anything, returning an
    /// instance independent of the world's.
    pub fn copy<T: Entity>(&mut self) -> Result<Detached<T>> {
        let previous = std::mem::replace(&mut self.scope, ReadScope::NoIntern);
        let root = self.read_next::<T>();
        self.scope = previous;
        let root = root?;
        Ok(Detached::new(root, self.take_uninterned()))
    }

    /// Drain the entities a non-interning read created.
    pub fn take_uninterned(&mut self) -> Vec<EntityHandle> {
        std::mem::take(&mut self.uninterned).into_values().collect()
    }

    fn resolve_or_construct(&mut self, type_name: &str, id: &ObjectId) -> Result<EntityHandle> {
        let existing = if self.scope.should_intern() {
            self.world.get(id)
        } else {
            // Content read under NoIntern never touches the world's instance.
            self.uninterned.get(id).cloned()
        };
        if let Some(handle) = existing {
            return Ok(handle);
        }
        let handle =
            self.world
                .types()
                .construct(type_name, id, self.scope.allows_server_variant())?;
        self.intern(handle.clone());
        Ok(handle)
    }

    fn intern(&mut self, handle: EntityHandle) {
        if self.scope.should_intern() {
            if let Some(replaced) = self.world.adopt(handle) {
                warn!(id = %replaced.id(), "replaced a live instance");
            }
        } else {
            self.uninterned.insert(handle.id().clone(), handle);
        }
    }

    fn populate(&mut self, handle: &EntityHandle, type_name: &str) -> Result<()> {
        let entity = handle.entity().clone();
        let mut entity = entity
            .try_borrow_mut()
            .map_err(|_| self.parse_error(format!("{} is already being read", handle.id())))?;
        entity.read_attributes(self)?;
        entity.read_children(self)?;
        if !self.is_end_tag() || !self.at_tag(type_name) {
            return Err(self.parse_error(format!("end of {type_name} expected")));
        }
        Ok(())
    }
}

impl<'a> Deref for GraphReader<'a> {
    type Target = MarkupReader<'a>;

    fn deref(&self) -> &Self::Target {
        &self.cursor
    }
}

impl DerefMut for GraphReader<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.cursor
    }
}
