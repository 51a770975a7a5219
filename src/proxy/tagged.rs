//! Host records with attached tag lists.
//!
//! [`Tagged`] owns a record and an ordered collection of attached
//! extensions. Its save pipeline iterates that collection directly:
//! check which extensions changed, validate them all, then write them in
//! one transaction after inserting the record if it is new.

use super::handle::TagList;
use super::validation::{self, TagError};
use super::{TagInput, TagListProxy};
use crate::error::Result;
use crate::model::Taggable;
use crate::schema::ContextPlan;
use crate::storage::{MutationContext, Store};
use rusqlite::Connection;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, warn};

/// Capability every attached extension provides to the save pipeline.
pub trait RecordExtension {
    /// Name used in logs (the context name for tag lists).
    fn name(&self) -> &str;

    /// Whether a save would change storage.
    ///
    /// # Errors
    ///
    /// Returns an error if reading persisted state fails.
    fn is_changed(&self, conn: &Connection, owner: Option<i64>) -> Result<bool>;

    /// Validate pending changes, recording problems on the extension.
    ///
    /// # Errors
    ///
    /// Returns an error if a lookup fails.
    fn validate(&mut self, conn: &Connection, owner: Option<i64>, record: &dyn Any) -> Result<bool>;

    /// Write pending changes inside the save transaction.
    ///
    /// # Errors
    ///
    /// Any error rolls back the whole save.
    fn save(&mut self, tx: &Connection, owner_id: i64, ctx: &mut MutationContext) -> Result<()>;

    /// Called once the transaction has committed.
    fn committed(&mut self);

    fn errors(&self) -> &[TagError];

    fn push_error(&mut self, error: TagError);

    fn clear_errors(&mut self);
}

/// Run the save pipeline over `extensions`.
///
/// With `persist_record`, a new record is inserted even when no extension
/// changed. Returns false after recording the failure on the extensions,
/// or in `record_errors` when no extension changed.
pub(crate) fn persist<T: Taggable>(
    store: &mut Store,
    record: &mut T,
    extensions: &mut [&mut dyn RecordExtension],
    persist_record: bool,
    record_errors: &mut Vec<TagError>,
) -> bool {
    record_errors.clear();
    for ext in extensions.iter_mut() {
        ext.clear_errors();
    }
    let owner = record.id();

    let mut changed = Vec::new();
    let mut valid = true;
    for (i, ext) in extensions.iter_mut().enumerate() {
        match ext.is_changed(store.conn(), owner) {
            Ok(true) => changed.push(i),
            Ok(false) => {}
            Err(e) => {
                ext.push_error(TagError::Persistence(e.to_string()));
                valid = false;
            }
        }
    }
    if !valid {
        return false;
    }
    if changed.is_empty() && !(persist_record && owner.is_none()) {
        for ext in extensions.iter_mut() {
            ext.committed();
        }
        return true;
    }

    for &i in &changed {
        let ext = &mut *extensions[i];
        match ext.validate(store.conn(), owner, &*record) {
            Ok(true) => {}
            Ok(false) => valid = false,
            Err(e) => {
                ext.push_error(TagError::Persistence(e.to_string()));
                valid = false;
            }
        }
    }
    if !valid {
        debug!(type_name = T::TYPE_NAME, "Tag validation failed, nothing written");
        return false;
    }

    let mut parent_error = None;
    let mut current = None;
    let result = store.mutate("save_tags", |tx, ctx| {
        let owner_id = match record.id() {
            Some(id) => id,
            None => record
                .insert(tx)
                .inspect_err(|e| parent_error = Some(e.to_string()))?,
        };
        for &i in &changed {
            current = Some(i);
            extensions[i].save(tx, owner_id, ctx)?;
        }
        Ok(owner_id)
    });

    match result {
        Ok(owner_id) => {
            if owner.is_none() {
                record.set_id(owner_id);
            }
            for ext in extensions.iter_mut() {
                ext.committed();
            }
            debug!(type_name = T::TYPE_NAME, owner_id, lists = changed.len(), "Record tags saved");
            true
        }
        Err(e) => {
            warn!(type_name = T::TYPE_NAME, error = %e, "Tag save rolled back");
            let (error, target) = match parent_error {
                Some(reason) => (TagError::ParentNotSaved(reason), changed.first().copied()),
                None => (
                    TagError::Persistence(e.to_string()),
                    current.or_else(|| changed.first().copied()),
                ),
            };
            match target {
                Some(i) => extensions[i].push_error(error),
                None => record_errors.push(error),
            }
            false
        }
    }
}

/// Ordered tag lists attached to one record, created on first access.
#[derive(Debug, Clone, Default)]
pub struct TagLists {
    proxies: Vec<TagListProxy>,
}

impl TagLists {
    #[must_use]
    pub fn get(&self, context: &str) -> Option<&TagListProxy> {
        self.proxies.iter().find(|p| p.context() == context)
    }

    pub(crate) fn get_or_attach(&mut self, plan: &Arc<ContextPlan>) -> &mut TagListProxy {
        let idx = match self.proxies.iter().position(|p| p.context() == plan.context) {
            Some(idx) => idx,
            None => {
                self.proxies.push(TagListProxy::new(Arc::clone(plan)));
                self.proxies.len() - 1
            }
        };
        &mut self.proxies[idx]
    }

    /// Detach a list, discarding its pending edits.
    pub fn detach(&mut self, context: &str) -> bool {
        let before = self.proxies.len();
        self.proxies.retain(|p| p.context() != context);
        self.proxies.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &TagListProxy> {
        self.proxies.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    fn extensions(&mut self) -> Vec<&mut dyn RecordExtension> {
        self.proxies
            .iter_mut()
            .map(|p| p as &mut dyn RecordExtension)
            .collect()
    }
}

/// A host record together with its tag lists.
#[derive(Debug, Clone)]
pub struct Tagged<T: Taggable> {
    record: T,
    lists: TagLists,
    /// Failures of the record itself when no list changed.
    errors: Vec<TagError>,
}

impl<T: Taggable> Tagged<T> {
    pub fn new(record: T) -> Self {
        Self {
            record,
            lists: TagLists::default(),
            errors: Vec::new(),
        }
    }

    pub fn record(&self) -> &T {
        &self.record
    }

    /// Mutable access to the record's own fields.
    pub fn record_mut(&mut self) -> &mut T {
        &mut self.record
    }

    pub fn into_inner(self) -> T {
        self.record
    }

    #[must_use]
    pub fn lists(&self) -> &TagLists {
        &self.lists
    }

    /// The tag list for `context`, attached on first access.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` / `UnknownContext` if the context is not declared.
    pub fn list<'a>(&'a mut self, store: &'a mut Store, context: &str) -> Result<TagList<'a, T>> {
        let plan = store.plan(T::TYPE_NAME, context)?;
        let Self { record, lists, .. } = self;
        let proxy = lists.get_or_attach(&plan);
        Ok(TagList::new(store, record, proxy))
    }

    /// Replace the context's pending list.
    ///
    /// # Errors
    ///
    /// Returns an error if the context is not declared.
    pub fn set_list(
        &mut self,
        store: &mut Store,
        context: &str,
        input: impl Into<TagInput>,
    ) -> Result<()> {
        self.list(store, context)?.set(input);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the context is not declared or the read-through fails.
    pub fn add(
        &mut self,
        store: &mut Store,
        context: &str,
        input: impl Into<TagInput>,
    ) -> Result<()> {
        self.list(store, context)?.add(input)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the context is not declared or the read-through fails.
    pub fn remove(
        &mut self,
        store: &mut Store,
        context: &str,
        input: impl Into<TagInput>,
    ) -> Result<()> {
        self.list(store, context)?.remove(input)?;
        Ok(())
    }

    /// Same as [`Tagged::set_list`].
    ///
    /// # Errors
    ///
    /// Returns an error if the context is not declared.
    pub fn set(
        &mut self,
        store: &mut Store,
        context: &str,
        input: impl Into<TagInput>,
    ) -> Result<()> {
        self.set_list(store, context, input)
    }

    /// Request the empty set on next save.
    ///
    /// # Errors
    ///
    /// Returns an error if the context is not declared.
    pub fn clear(&mut self, store: &mut Store, context: &str) -> Result<()> {
        self.list(store, context)?.clear();
        Ok(())
    }

    /// Delete the context's taggings immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the context is not declared or the delete fails.
    pub fn clear_now(&mut self, store: &mut Store, context: &str) -> Result<()> {
        self.list(store, context)?.clear_now()
    }

    /// Discard the context's pending edits.
    pub fn reset_list(&mut self, context: &str) {
        self.lists.detach(context);
    }

    /// Whether any attached list has unsaved changes.
    ///
    /// # Errors
    ///
    /// Returns an error if reading persisted state fails.
    pub fn is_changed(&self, store: &Store) -> Result<bool> {
        for proxy in self.lists.iter() {
            if proxy.is_changed(store.conn(), self.record.id())? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Save the record (if new) and every changed list atomically.
    ///
    /// Returns false if any list fails validation or storage; nothing is
    /// written in that case and the problems are available from
    /// [`Tagged::errors`]. Restricted names that disappeared after
    /// validation are dropped from a successful save and also reported
    /// there.
    pub fn save(&mut self, store: &mut Store) -> bool {
        let mut extensions = self.lists.extensions();
        persist(store, &mut self.record, &mut extensions, true, &mut self.errors)
    }

    /// Like [`Tagged::save`], but failures are returned as errors.
    ///
    /// # Errors
    ///
    /// Returns `Validation` or `Persistence` with every recorded message.
    pub fn save_strict(&mut self, store: &mut Store) -> Result<()> {
        if self.save(store) {
            Ok(())
        } else {
            Err(validation::into_error(self.errors()))
        }
    }

    /// Problems recorded by the last save or validation: the record's own
    /// first, then each list's in attach order.
    pub fn errors(&self) -> impl Iterator<Item = &TagError> {
        self.errors
            .iter()
            .chain(self.lists.iter().flat_map(TagListProxy::errors))
    }
}
