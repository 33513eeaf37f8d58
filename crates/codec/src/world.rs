//! The world arena: owner of every interned entity.

use std::any::type_name;
use std::collections::BTreeMap;
use std::rc::Rc;

use colonia_core::{ObjectId, ReadScope, WriteScope};
use tracing::debug;

use crate::entity::{Entity, EntityHandle, Shared};
use crate::error::{CodecError, Result};
use crate::reader::GraphReader;
use crate::registry::{IdentityRegistry, TypeRegistry};
use crate::writer::GraphWriter;

/// Owns the canonical strong references to a world's entities and the
/// identity registry that interns them.
///
/// Entities reference each other by `Weak` handle or by id; dropping an
/// entity from the arena (see [`World::dispose`]) is what ends its life.
#[derive(Debug)]
pub struct World {
    types: Rc<TypeRegistry>,
    registry: IdentityRegistry,
    arena: BTreeMap<ObjectId, EntityHandle>,
    next_serial: u64,
}

impl World {
    /// Empty world constructing entities through `types`.
    pub fn new(types: Rc<TypeRegistry>) -> Self {
        Self {
            types,
            registry: IdentityRegistry::new(),
            arena: BTreeMap::new(),
            next_serial: 1,
        }
    }

    /// Type registry shared by this world.
    pub fn types(&self) -> &Rc<TypeRegistry> {
        &self.types
    }

    /// Identity registry of this world.
    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// Take ownership of `handle` and intern it under its id.
    ///
    /// Returns the previous live instance under that id, which is released.
    pub fn adopt(&mut self, handle: EntityHandle) -> Option<EntityHandle> {
        self.registry.register(&handle);
        let replaced = self.arena.insert(handle.id().clone(), handle.clone());
        replaced.filter(|previous| !previous.ptr_eq(&handle))
    }

    /// Wrap `entity` and adopt it.
    pub fn insert<T: Entity>(&mut self, entity: T) -> Shared<T> {
        let shared = Rc::new(std::cell::RefCell::new(entity));
        self.adopt(EntityHandle::from_shared(shared.clone()));
        shared
    }

    /// Live entity registered under `id`.
    pub fn get(&self, id: &ObjectId) -> Option<EntityHandle> {
        self.registry.lookup(id)
    }

    /// Live entity registered under `id`, checked against `T`.
    pub fn get_as<T: Entity>(&self, id: &ObjectId) -> Result<Shared<T>> {
        let handle = self
            .get(id)
            .ok_or_else(|| CodecError::Unresolved(id.clone()))?;
        downcast_handle(&self.types, &handle)
    }

    /// Whether `id` names a live entity.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.registry.contains(id)
    }

    /// Discard the entity registered under `id`.
    ///
    /// Weak references held by other entities stop resolving once no strong
    /// handle outside the world remains.
    pub fn dispose(&mut self, id: &ObjectId) -> Option<EntityHandle> {
        let removed = self.arena.remove(id);
        self.registry.remove(id);
        if removed.is_some() {
            debug!(%id, "disposed");
        }
        removed
    }

    /// Number of entities owned by the world.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Whether the world owns no entities.
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Ids of the owned entities, in lexical order.
    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.arena.keys()
    }

    /// Owned entities, in id order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityHandle> {
        self.arena.values()
    }

    /// Fresh id `prefix:N` not yet used in this world.
    pub fn next_id(&mut self, prefix: &str) -> ObjectId {
        loop {
            let id = ObjectId::with_prefix(prefix, self.next_serial);
            self.next_serial += 1;
            if !self.arena.contains_key(&id) && !self.registry.contains(&id) {
                return id;
            }
        }
    }

    /// Raise the serial counter so later [`World::next_id`] calls start at
    /// `serial` or above.
    pub fn reserve_serial(&mut self, serial: u64) {
        self.next_serial = self.next_serial.max(serial);
    }

    /// Current serial counter.
    pub fn serial(&self) -> u64 {
        self.next_serial
    }

    /// Deep copy of `entity` that shares nothing the copy itself contains
    /// with this world.
    ///
    /// The entity is written with full fidelity and read back without
    /// interning; references to entities outside the copied subgraph still
    /// resolve to this world's instances.
    pub fn copy<T: Entity>(&mut self, entity: &Shared<T>) -> Result<Detached<T>> {
        let mut buffer = Vec::new();
        {
            let mut xw = GraphWriter::new(&mut buffer, WriteScope::save())?;
            xw.write_entity(&*entity.borrow())?;
            xw.finish()?;
        }
        let mut xr = GraphReader::new(buffer.as_slice(), self, ReadScope::NoIntern);
        xr.copy::<T>()
    }
}

/// A copied entity together with the private arena that keeps its
/// non-interned subgraph alive.
#[derive(Debug)]
pub struct Detached<T> {
    root: Shared<T>,
    arena: Vec<EntityHandle>,
}

impl<T: Entity> Detached<T> {
    pub(crate) fn new(root: Shared<T>, arena: Vec<EntityHandle>) -> Self {
        Self { root, arena }
    }

    /// The copied entity.
    pub fn root(&self) -> &Shared<T> {
        &self.root
    }

    /// Every entity created by the copy, the root included.
    pub fn entities(&self) -> &[EntityHandle] {
        &self.arena
    }

    /// Entity of the copy registered under `id`.
    pub fn get(&self, id: &ObjectId) -> Option<&EntityHandle> {
        self.arena.iter().find(|handle| handle.id() == id)
    }

    /// Split into the root and its arena.
    pub fn into_parts(self) -> (Shared<T>, Vec<EntityHandle>) {
        (self.root, self.arena)
    }
}

/// Downcast `handle` to `T`, reporting the registered type names on failure.
pub(crate) fn downcast_handle<T: Entity>(
    types: &TypeRegistry,
    handle: &EntityHandle,
) -> Result<Shared<T>> {
    handle
        .downcast::<T>()
        .ok_or_else(|| CodecError::TypeMismatch {
            id: handle.id().clone(),
            expected: types
                .name_of::<T>()
                .unwrap_or_else(|| type_name::<T>())
                .to_string(),
            found: handle.type_name().to_string(),
        })
}
