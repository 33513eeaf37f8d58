//! Identity and type registries.
//!
//! [`IdentityRegistry`] interns object ids to live instances for one world.
//! [`TypeRegistry`] maps type names to constructors; entity types register
//! themselves once at startup, and plugins may add more.

use std::any::{type_name, TypeId};
use std::collections::{BTreeMap, HashMap};

use colonia_core::ObjectId;
use tracing::{debug, trace};

use crate::entity::{Entity, EntityHandle, WeakHandle};
use crate::error::{CodecError, Result};

/// Per-world map from object id to a non-owning handle.
///
/// The world arena owns the instances; entries whose instance has been
/// dropped read as absent and are removed by [`IdentityRegistry::prune`].
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    slots: BTreeMap<ObjectId, WeakHandle>,
}

impl IdentityRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Live instance registered under `id`.
    pub fn lookup(&self, id: &ObjectId) -> Option<EntityHandle> {
        self.slots.get(id).and_then(WeakHandle::upgrade)
    }

    /// Whether a live instance is registered under `id`.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.slots.get(id).is_some_and(WeakHandle::is_alive)
    }

    /// Register `handle` under its id, returning the live instance it
    /// replaced, if any.
    pub fn register(&mut self, handle: &EntityHandle) -> Option<EntityHandle> {
        trace!(id = %handle.id(), type_name = handle.type_name(), "register");
        self.slots
            .insert(handle.id().clone(), handle.downgrade())
            .and_then(|previous| previous.upgrade())
            .filter(|previous| !previous.ptr_eq(handle))
    }

    /// Forget `id`.
    pub fn remove(&mut self, id: &ObjectId) -> bool {
        self.slots.remove(id).is_some()
    }

    /// Drop entries whose instance is gone; returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.is_alive());
        let removed = before - self.slots.len();
        if removed > 0 {
            debug!(removed, "pruned dead registry entries");
        }
        removed
    }

    /// Number of entries, dead ones included until pruned.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Registered ids in lexical order.
    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.slots.keys()
    }
}

type Constructor = Box<dyn Fn(&ObjectId) -> EntityHandle>;

struct TypeEntry {
    type_id: TypeId,
    rust_name: &'static str,
    normal: Constructor,
    server: Option<Constructor>,
}

/// Type-name keyed factory.
#[derive(Default)]
pub struct TypeRegistry {
    entries: BTreeMap<String, TypeEntry>,
    names: HashMap<TypeId, String>,
}

impl TypeRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constructor for `name`. Re-registering a name replaces
    /// the previous constructor and drops its server variant.
    pub fn register<T, F>(&mut self, name: &str, constructor: F) -> &mut Self
    where
        T: Entity,
        F: Fn(&ObjectId) -> T + 'static,
    {
        debug!(type_name = name, rust_type = type_name::<T>(), "register type");
        self.entries.insert(
            name.to_string(),
            TypeEntry {
                type_id: TypeId::of::<T>(),
                rust_name: type_name::<T>(),
                normal: Box::new(move |id| EntityHandle::new(constructor(id))),
                server: None,
            },
        );
        self.names.insert(TypeId::of::<T>(), name.to_string());
        self
    }

    /// Register a server-only constructor for an already registered `name`.
    ///
    /// The variant must build the same concrete type so references resolved
    /// on the server downcast exactly as on clients.
    pub fn register_server<T, F>(&mut self, name: &str, constructor: F) -> Result<&mut Self>
    where
        T: Entity,
        F: Fn(&ObjectId) -> T + 'static,
    {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| CodecError::UnknownType {
                type_name: name.to_string(),
            })?;
        if entry.type_id != TypeId::of::<T>() {
            return Err(CodecError::TypeMismatch {
                id: ObjectId::with_prefix("type", name),
                expected: entry.rust_name.to_string(),
                found: type_name::<T>().to_string(),
            });
        }
        entry.server = Some(Box::new(move |id| EntityHandle::new(constructor(id))));
        Ok(self)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered type names in lexical order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Name `T` was registered under.
    pub fn name_of<T: Entity>(&self) -> Option<&str> {
        self.names.get(&TypeId::of::<T>()).map(String::as_str)
    }

    /// Build a fresh, unpopulated instance of `name`.
    ///
    /// With `server` set, the server variant is used when one is registered.
    pub fn construct(&self, name: &str, id: &ObjectId, server: bool) -> Result<EntityHandle> {
        let entry = self.entries.get(name).ok_or_else(|| CodecError::UnknownType {
            type_name: name.to_string(),
        })?;
        let constructor = match (&entry.server, server) {
            (Some(server_constructor), true) => server_constructor,
            _ => &entry.normal,
        };
        let handle = constructor(id);
        debug_assert_eq!(handle.id(), id, "constructor for {name} ignored its id");
        trace!(type_name = name, %id, server, "constructed");
        Ok(handle)
    }

    /// Build a fresh instance of the type `T` was registered under.
    pub fn construct_as<T: Entity>(&self, id: &ObjectId, server: bool) -> Result<EntityHandle> {
        let name = self
            .name_of::<T>()
            .ok_or_else(|| CodecError::UnknownType {
                type_name: type_name::<T>().to_string(),
            })?
            .to_string();
        self.construct(&name, id, server)
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
