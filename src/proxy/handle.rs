//! The bound tag list handle.

use super::tagged::{persist, RecordExtension};
use super::validation::{self, TagError};
use super::{TagInput, TagListProxy};
use crate::error::Result;
use crate::model::Taggable;
use crate::schema::ContextPlan;
use crate::storage::Store;
use std::sync::Arc;

/// A tag list proxy bound to its store and record for one call chain.
///
/// ```ignore
/// car.list(&mut store, "colors")?
///     .add("red, blue")?
///     .remove(["blue"])?;
/// ```
pub struct TagList<'a, T: Taggable> {
    store: &'a mut Store,
    record: &'a mut T,
    proxy: &'a mut TagListProxy,
}

impl<'a, T: Taggable> TagList<'a, T> {
    pub(crate) fn new(
        store: &'a mut Store,
        record: &'a mut T,
        proxy: &'a mut TagListProxy,
    ) -> Self {
        Self { store, record, proxy }
    }

    #[must_use]
    pub fn plan(&self) -> &Arc<ContextPlan> {
        self.proxy.plan()
    }

    #[must_use]
    pub fn context(&self) -> &str {
        self.proxy.context()
    }

    /// # Errors
    ///
    /// Returns an error if the read-through fails.
    pub fn add(&mut self, input: impl Into<TagInput>) -> Result<&mut Self> {
        self.proxy
            .add(self.store.conn(), self.record.id(), &*self.record, &input.into())?;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns an error if the read-through fails.
    pub fn remove(&mut self, input: impl Into<TagInput>) -> Result<&mut Self> {
        self.proxy
            .remove(self.store.conn(), self.record.id(), &input.into())?;
        Ok(self)
    }

    pub fn set(&mut self, input: impl Into<TagInput>) -> &mut Self {
        self.proxy.set(&input.into());
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.proxy.clear();
        self
    }

    /// Delete every persisted tagging now and reset the counter cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear_now(&mut self) -> Result<()> {
        if let Some(owner_id) = self.record.id() {
            let proxy = &mut *self.proxy;
            self.store
                .mutate("clear_tags", |tx, ctx| proxy.clear_persisted(tx, owner_id, ctx))?;
        }
        self.proxy.reset();
        Ok(())
    }

    /// Current names, pending edits included.
    ///
    /// # Errors
    ///
    /// Returns an error if the read-through fails.
    pub fn to_vec(&self) -> Result<Vec<String>> {
        self.proxy.current(self.store.conn(), self.record.id())
    }

    /// Current names joined by the context transformer.
    ///
    /// # Errors
    ///
    /// Returns an error if the read-through fails.
    pub fn to_tag_string(&self) -> Result<String> {
        Ok(self.proxy.plan().transformer.serialize(&self.to_vec()?))
    }

    /// # Errors
    ///
    /// Returns an error if the read-through fails.
    pub fn contains(&self, name: &str) -> Result<bool> {
        let name = name.trim();
        Ok(self.to_vec()?.iter().any(|n| n == name))
    }

    /// # Errors
    ///
    /// Returns an error if the read-through fails.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.to_vec()?.is_empty())
    }

    /// Number of current names, pending edits included.
    ///
    /// # Errors
    ///
    /// Returns an error if the read-through fails.
    pub fn len(&self) -> Result<usize> {
        Ok(self.to_vec()?.len())
    }

    /// Number of persisted taggings, ignoring pending edits.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn count(&self) -> Result<i64> {
        match self.record.id() {
            Some(id) => self.store.tagging_count(self.proxy.plan(), id),
            None => Ok(0),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the persisted read fails.
    pub fn is_changed(&self) -> Result<bool> {
        self.proxy.is_changed(self.store.conn(), self.record.id())
    }

    /// # Errors
    ///
    /// Returns an error if the persisted read fails.
    pub fn additions(&self) -> Result<Vec<String>> {
        self.proxy.additions(self.store.conn(), self.record.id())
    }

    /// # Errors
    ///
    /// Returns an error if the persisted read fails.
    pub fn removals(&self) -> Result<Vec<String>> {
        self.proxy.removals(self.store.conn(), self.record.id())
    }

    /// Validate the pending set without saving, recording any problems.
    ///
    /// # Errors
    ///
    /// Returns an error if a lookup fails.
    pub fn validate(&mut self) -> Result<bool> {
        self.proxy.clear_errors();
        RecordExtension::validate(
            &mut *self.proxy,
            self.store.conn(),
            self.record.id(),
            &*self.record,
        )
    }

    /// Persist this list (and the record, if new and the list changed).
    ///
    /// Returns true without touching storage when nothing changed.
    pub fn save(&mut self) -> bool {
        let mut extensions: [&mut dyn RecordExtension; 1] = [&mut *self.proxy];
        // The record is only inserted alongside a changed list, so its
        // failures always land on the proxy.
        persist(self.store, self.record, &mut extensions, false, &mut Vec::new())
    }

    /// Like [`TagList::save`], but failures are returned as errors.
    ///
    /// # Errors
    ///
    /// Returns `Validation` or `Persistence` with every recorded message.
    pub fn save_strict(&mut self) -> Result<()> {
        if self.save() {
            Ok(())
        } else {
            Err(validation::into_error(self.proxy.errors()))
        }
    }

    /// Add then save.
    ///
    /// # Errors
    ///
    /// Returns an error if the read-through fails; save failures return `Ok(false)`.
    pub fn add_now(&mut self, input: impl Into<TagInput>) -> Result<bool> {
        self.add(input)?;
        Ok(self.save())
    }

    /// Remove then save.
    ///
    /// # Errors
    ///
    /// Returns an error if the read-through fails; save failures return `Ok(false)`.
    pub fn remove_now(&mut self, input: impl Into<TagInput>) -> Result<bool> {
        self.remove(input)?;
        Ok(self.save())
    }

    #[must_use]
    pub fn errors(&self) -> &[TagError] {
        self.proxy.errors()
    }
}
