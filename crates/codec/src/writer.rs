//! Object-graph writer: scope-aware serialization into a buffered document.

use std::cell::RefCell;
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::rc::Weak;

use colonia_core::{ObjectId, Visible, WriteScope};
use tracing::trace;

use crate::entity::{weak_id, Entity, EntityHandle};
use crate::error::Result;
use crate::markup::{pretty_print, MarkupWriter};
use crate::reader::ID_ATTRIBUTE;

/// Options for [`GraphWriter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WriterOptions {
    /// Indent the document before it reaches the sink.
    pub pretty: bool,
}

/// Serializes entities under one [`WriteScope`].
///
/// Markup is buffered in memory and handed to the sink only by
/// [`GraphWriter::finish`], so a failed write never leaves half a document
/// behind. Several writers may append to the same sink in turn.
///
/// Dereferences to the underlying [`MarkupWriter`] for raw element and
/// attribute output.
pub struct GraphWriter<'a> {
    markup: MarkupWriter,
    sink: Box<dyn Write + 'a>,
    scope: WriteScope,
    options: WriterOptions,
}

impl<'a> GraphWriter<'a> {
    /// Writer flushing to `sink`; fails if `scope` is inconsistent.
    pub fn new<W: Write + 'a>(sink: W, scope: WriteScope) -> Result<Self> {
        Self::with_options(sink, scope, WriterOptions::default())
    }

    /// Writer with explicit options.
    pub fn with_options<W: Write + 'a>(
        sink: W,
        scope: WriteScope,
        options: WriterOptions,
    ) -> Result<Self> {
        scope.check_valid()?;
        Ok(Self {
            markup: MarkupWriter::new(),
            sink: Box::new(sink),
            scope,
            options,
        })
    }

    /// Active write scope.
    pub fn scope(&self) -> &WriteScope {
        &self.scope
    }

    /// Player this output is prepared for, if it is a client write.
    pub fn client_player(&self) -> Option<&ObjectId> {
        self.scope.player()
    }

    /// Whether `object`'s private state may be written under this scope.
    pub fn is_visible<V: Visible + ?Sized>(&self, object: &V) -> bool {
        self.scope.valid_for(object)
    }

    /// Whether the output must be able to rebuild the world from nothing.
    pub fn is_save(&self) -> bool {
        self.scope.is_save_complete()
    }

    /// Write the reserved identifier attribute.
    pub fn write_id(&mut self, id: &ObjectId) -> Result<()> {
        self.markup.write_attribute(ID_ATTRIBUTE, id)
    }

    /// Write a reference: the id only, never the referenced content.
    pub fn write_ref(&mut self, attribute: &str, id: &ObjectId) -> Result<()> {
        self.markup.write_attribute(attribute, id)
    }

    /// Write a reference held as a weak handle; a dead or empty reference
    /// writes nothing.
    pub fn write_weak_ref<T: Entity>(
        &mut self,
        attribute: &str,
        target: &Weak<RefCell<T>>,
    ) -> Result<()> {
        match weak_id(target) {
            Some(id) => self.write_ref(attribute, &id),
            None => Ok(()),
        }
    }

    /// Write `entity` in full: start tag, id, attributes, children, end tag.
    pub fn write_entity(&mut self, entity: &dyn Entity) -> Result<()> {
        trace!(id = %entity.id(), type_name = entity.type_name(), scope = %self.scope, "write");
        self.markup.write_start(entity.type_name())?;
        self.write_id(entity.id())?;
        entity.write_attributes(self)?;
        entity.write_children(self)?;
        self.markup.write_end()
    }

    /// Write the entity behind `handle` in full.
    pub fn write_handle(&mut self, handle: &EntityHandle) -> Result<()> {
        let entity = handle.borrow();
        self.write_entity(&*entity)
    }

    /// Write an element named `tag` carrying only an inline list.
    pub fn write_array_element<T: std::fmt::Display>(
        &mut self,
        tag: &str,
        items: &[T],
    ) -> Result<()> {
        self.markup.write_start(tag)?;
        self.markup.write_indexed_attributes(items)?;
        self.markup.write_end()
    }

    /// Markup buffered so far.
    pub fn buffered(&self) -> &str {
        self.markup.as_str()
    }

    /// Hand the finished document to the sink, pretty-printed if requested.
    pub fn finish(self) -> Result<()> {
        let GraphWriter {
            markup,
            mut sink,
            options,
            ..
        } = self;
        let mut document = markup.finish()?;
        if options.pretty {
            document = pretty_print(&document)?;
        }
        sink.write_all(document.as_bytes())?;
        sink.flush()?;
        Ok(())
    }

    /// Finish into a string, discarding the sink.
    pub fn into_string(self) -> Result<String> {
        let pretty = self.options.pretty;
        let document = self.markup.finish()?;
        if pretty {
            pretty_print(&document)
        } else {
            Ok(document)
        }
    }
}

impl Deref for GraphWriter<'_> {
    type Target = MarkupWriter;

    fn deref(&self) -> &Self::Target {
        &self.markup
    }
}

impl DerefMut for GraphWriter<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.markup
    }
}

/// Serialize one entity to a string under `scope`.
pub fn to_markup(entity: &dyn Entity, scope: WriteScope) -> Result<String> {
    let mut xw = GraphWriter::new(std::io::sink(), scope)?;
    xw.write_entity(entity)?;
    xw.into_string()
}
