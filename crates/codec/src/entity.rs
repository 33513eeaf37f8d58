//! The boundary with the entity model.
//!
//! The codec supplies traversal and identity; each entity type supplies its
//! own field semantics through the [`Entity`] callbacks, calling back into the
//! reader or writer for nested values.

use std::any::Any;
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use colonia_core::{ObjectId, Visible};

use crate::error::Result;
use crate::reader::GraphReader;
use crate::writer::GraphWriter;

/// Shared, mutable handle to a concrete entity.
pub type Shared<T> = Rc<RefCell<T>>;

/// An identifiable, serializable unit of world state.
pub trait Entity: Visible + Any {
    /// Stable type name; doubles as the element name and the factory key.
    fn type_name(&self) -> &'static str;

    /// Identifier of this instance.
    fn id(&self) -> &ObjectId;

    /// Populate scalar fields and references from the current start tag.
    fn read_attributes(&mut self, _xr: &mut GraphReader<'_>) -> Result<()> {
        Ok(())
    }

    /// Read every child element, leaving the cursor on this entity's end tag.
    ///
    /// Types holding child collections override this to clear them first, so
    /// that re-reading an interned entity replaces rather than appends.
    fn read_children(&mut self, xr: &mut GraphReader<'_>) -> Result<()> {
        while xr.more_tags()? {
            self.read_child(xr)?;
        }
        Ok(())
    }

    /// Read one child element; the cursor is on its start tag and must be left
    /// on its end tag.
    fn read_child(&mut self, xr: &mut GraphReader<'_>) -> Result<()> {
        Err(xr.parse_error(format!(
            "unexpected child of {}: {}",
            self.type_name(),
            xr.local_name()
        )))
    }

    /// Emit attributes other than the identifier.
    fn write_attributes(&self, _xw: &mut GraphWriter<'_>) -> Result<()> {
        Ok(())
    }

    /// Emit child elements.
    fn write_children(&self, _xw: &mut GraphWriter<'_>) -> Result<()> {
        Ok(())
    }
}

/// Type-erased strong handle to an entity.
///
/// Carries the entity both as a trait object (for the read/write callbacks)
/// and as `dyn Any` (for checked downcasts back to the concrete type).
#[derive(Clone)]
pub struct EntityHandle {
    id: ObjectId,
    type_name: &'static str,
    any: Rc<dyn Any>,
    entity: Rc<RefCell<dyn Entity>>,
}

impl EntityHandle {
    /// Wrap a freshly built entity.
    pub fn new<T: Entity>(entity: T) -> Self {
        Self::from_shared(Rc::new(RefCell::new(entity)))
    }

    /// Wrap an existing shared entity.
    pub fn from_shared<T: Entity>(shared: Shared<T>) -> Self {
        let (id, type_name) = {
            let entity = shared.borrow();
            (entity.id().clone(), entity.type_name())
        };
        let any: Rc<dyn Any> = shared.clone();
        let entity: Rc<RefCell<dyn Entity>> = shared;
        Self {
            id,
            type_name,
            any,
            entity,
        }
    }

    /// Identifier of the entity.
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Type name of the entity.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The entity as a trait object.
    pub fn entity(&self) -> &Rc<RefCell<dyn Entity>> {
        &self.entity
    }

    /// Borrow the entity.
    pub fn borrow(&self) -> Ref<'_, dyn Entity> {
        self.entity.borrow()
    }

    /// Whether the entity is a `T`.
    pub fn is<T: Entity>(&self) -> bool {
        self.any.is::<RefCell<T>>()
    }

    /// Recover the concrete handle, if the entity is a `T`.
    pub fn downcast<T: Entity>(&self) -> Option<Shared<T>> {
        self.any.clone().downcast::<RefCell<T>>().ok()
    }

    /// Whether both handles point at the same instance.
    pub fn ptr_eq(&self, other: &EntityHandle) -> bool {
        Rc::ptr_eq(&self.any, &other.any)
    }

    /// Non-owning version of this handle.
    pub fn downgrade(&self) -> WeakHandle {
        WeakHandle {
            id: self.id.clone(),
            type_name: self.type_name,
            any: Rc::downgrade(&self.any),
            entity: Rc::downgrade(&self.entity),
        }
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityHandle")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Non-owning handle; the world holds the owning ones.
#[derive(Clone)]
pub struct WeakHandle {
    id: ObjectId,
    type_name: &'static str,
    any: Weak<dyn Any>,
    entity: Weak<RefCell<dyn Entity>>,
}

impl WeakHandle {
    /// Identifier of the referenced entity.
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Type name of the referenced entity.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether the entity is still alive.
    pub fn is_alive(&self) -> bool {
        self.any.strong_count() > 0
    }

    /// Strong handle, if the entity is still alive.
    pub fn upgrade(&self) -> Option<EntityHandle> {
        Some(EntityHandle {
            id: self.id.clone(),
            type_name: self.type_name,
            any: self.any.upgrade()?,
            entity: self.entity.upgrade()?,
        })
    }
}

impl fmt::Debug for WeakHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHandle")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Identifier of the entity behind a weak reference, if it is still alive.
pub fn weak_id<T: Entity>(weak: &Weak<RefCell<T>>) -> Option<ObjectId> {
    weak.upgrade().map(|shared| shared.borrow().id().clone())
}
