//! Tag list proxies.
//!
//! A [`TagListProxy`] is the per-(record, context) edit buffer:
//!
//! ```text
//!            add/remove/set                 save ok
//! Unloaded ────────────────▶ Pending(names) ────────▶ Unloaded
//!    │                          ▲   │
//!    │ clear                add │   │ clear
//!    ▼                          │   ▼
//! Clearing ─────────────────────┘ Clearing ──save ok──▶ Unloaded
//! ```
//!
//! Reads while `Unloaded` fall through to storage. The first mutation
//! seeds the pending set from storage, so later saves replace the whole
//! set (last writer wins against concurrent edits).
//!
//! Proxies do not hold the store or the record. [`TagList`] binds them
//! together for one call chain, and [`Tagged`] owns a record plus its
//! proxies and drives the save pipeline.

pub mod handle;
pub mod tagged;
pub mod validation;

pub use handle::TagList;
pub use tagged::{RecordExtension, TagLists, Tagged};
pub use validation::TagError;

use crate::error::Result;
use crate::schema::ContextPlan;
use crate::storage::{wiring, MutationContext};
use crate::transform::{normalize_names, TagTransformer};
use rusqlite::Connection;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, warn};

/// Tag names as supplied by callers.
///
/// A single string is split by the context transformer; every element
/// of a sequence is split the same way, then the result is flattened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagInput {
    Delimited(String),
    Names(Vec<String>),
}

impl TagInput {
    /// Trimmed, de-duplicated, blank-free names in input order.
    #[must_use]
    pub fn parse(&self, transformer: &dyn TagTransformer) -> Vec<String> {
        match self {
            Self::Delimited(input) => normalize_names(transformer.parse(input)),
            Self::Names(names) => {
                normalize_names(names.iter().flat_map(|n| transformer.parse(n)))
            }
        }
    }
}

impl From<&str> for TagInput {
    fn from(s: &str) -> Self {
        Self::Delimited(s.to_string())
    }
}

impl From<String> for TagInput {
    fn from(s: String) -> Self {
        Self::Delimited(s)
    }
}

impl From<&String> for TagInput {
    fn from(s: &String) -> Self {
        Self::Delimited(s.clone())
    }
}

impl From<Vec<String>> for TagInput {
    fn from(names: Vec<String>) -> Self {
        Self::Names(names)
    }
}

impl From<Vec<&str>> for TagInput {
    fn from(names: Vec<&str>) -> Self {
        Self::Names(names.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for TagInput {
    fn from(names: &[&str]) -> Self {
        Self::Names(names.iter().map(|s| (*s).to_string()).collect())
    }
}

impl From<&[String]> for TagInput {
    fn from(names: &[String]) -> Self {
        Self::Names(names.to_vec())
    }
}

impl<const N: usize> From<[&str; N]> for TagInput {
    fn from(names: [&str; N]) -> Self {
        Self::Names(names.iter().map(|s| (*s).to_string()).collect())
    }
}

/// Proxy state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyState {
    /// Reads fall through to storage.
    Unloaded,
    /// Full desired set after queued edits.
    Pending(Vec<String>),
    /// Explicit request for the empty set.
    Clearing,
}

/// Edit buffer for one (record, context).
#[derive(Debug, Clone)]
pub struct TagListProxy {
    plan: Arc<ContextPlan>,
    state: ProxyState,
    errors: Vec<TagError>,
}

impl TagListProxy {
    #[must_use]
    pub fn new(plan: Arc<ContextPlan>) -> Self {
        Self {
            plan,
            state: ProxyState::Unloaded,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn plan(&self) -> &Arc<ContextPlan> {
        &self.plan
    }

    #[must_use]
    pub fn context(&self) -> &str {
        &self.plan.context
    }

    #[must_use]
    pub fn state(&self) -> &ProxyState {
        &self.state
    }

    #[must_use]
    pub fn errors(&self) -> &[TagError] {
        &self.errors
    }

    /// Drop pending edits and recorded errors.
    pub fn reset(&mut self) {
        self.state = ProxyState::Unloaded;
        self.errors.clear();
    }

    /// Persisted names; empty for an unsaved record.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn persisted(&self, conn: &Connection, owner: Option<i64>) -> Result<Vec<String>> {
        match owner {
            Some(id) => wiring::tag_names(conn, &self.plan, id),
            None => Ok(Vec::new()),
        }
    }

    /// Names as the record currently sees them, pending edits included.
    ///
    /// # Errors
    ///
    /// Returns an error if a read-through fails.
    pub fn current(&self, conn: &Connection, owner: Option<i64>) -> Result<Vec<String>> {
        match &self.state {
            ProxyState::Unloaded => self.persisted(conn, owner),
            ProxyState::Pending(names) => Ok(names.clone()),
            ProxyState::Clearing => Ok(Vec::new()),
        }
    }

    /// Union `input` into the pending set.
    ///
    /// No-op when the list is already at its limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the read-through fails.
    pub fn add(
        &mut self,
        conn: &Connection,
        owner: Option<i64>,
        record: &dyn Any,
        input: &TagInput,
    ) -> Result<()> {
        let mut names = self.current(conn, owner)?;
        if let Some(limit) = validation::resolve_limit(&self.plan, record) {
            if names.len() >= limit {
                debug!(context = %self.plan.context, limit, "Tag limit reached, add ignored");
                return Ok(());
            }
        }
        let new = input.parse(self.plan.transformer.as_ref());
        if new.is_empty() {
            return Ok(());
        }
        for name in new {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        debug!(context = %self.plan.context, pending = names.len(), "Tags added");
        self.state = ProxyState::Pending(names);
        Ok(())
    }

    /// Subtract `input` from the pending set.
    ///
    /// # Errors
    ///
    /// Returns an error if the read-through fails.
    pub fn remove(
        &mut self,
        conn: &Connection,
        owner: Option<i64>,
        input: &TagInput,
    ) -> Result<()> {
        if self.state == ProxyState::Clearing {
            return Ok(());
        }
        let gone = input.parse(self.plan.transformer.as_ref());
        let mut names = self.current(conn, owner)?;
        names.retain(|n| !gone.contains(n));
        debug!(context = %self.plan.context, pending = names.len(), "Tags removed");
        self.state = ProxyState::Pending(names);
        Ok(())
    }

    /// Replace the pending set in one step.
    pub fn set(&mut self, input: &TagInput) {
        self.state = ProxyState::Pending(input.parse(self.plan.transformer.as_ref()));
    }

    pub fn clear(&mut self) {
        self.state = ProxyState::Clearing;
    }

    /// Target set a save would write, `None` while unloaded.
    #[must_use]
    pub fn target(&self) -> Option<&[String]> {
        match &self.state {
            ProxyState::Unloaded => None,
            ProxyState::Pending(names) => Some(names),
            ProxyState::Clearing => Some(&[]),
        }
    }

    /// Whether a save would change storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted read fails.
    pub fn is_changed(&self, conn: &Connection, owner: Option<i64>) -> Result<bool> {
        match &self.state {
            ProxyState::Unloaded => Ok(false),
            ProxyState::Clearing => Ok(true),
            ProxyState::Pending(names) => {
                let persisted = self.persisted(conn, owner)?;
                Ok(names.len() != persisted.len() || names.iter().any(|n| !persisted.contains(n)))
            }
        }
    }

    /// Pending names not yet persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted read fails.
    pub fn additions(&self, conn: &Connection, owner: Option<i64>) -> Result<Vec<String>> {
        let Some(target) = self.target() else {
            return Ok(Vec::new());
        };
        let persisted = self.persisted(conn, owner)?;
        Ok(target.iter().filter(|n| !persisted.contains(n)).cloned().collect())
    }

    /// Persisted names the pending set drops.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted read fails.
    pub fn removals(&self, conn: &Connection, owner: Option<i64>) -> Result<Vec<String>> {
        let Some(target) = self.target() else {
            return Ok(Vec::new());
        };
        let persisted = self.persisted(conn, owner)?;
        Ok(persisted.into_iter().filter(|n| !target.contains(n)).collect())
    }

    /// Delete every persisted tagging now, bypassing the pending set.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete or counter update fails.
    pub(crate) fn clear_persisted(
        &mut self,
        tx: &Connection,
        owner_id: i64,
        ctx: &mut MutationContext,
    ) -> Result<()> {
        ctx.taggings_deleted += wiring::delete_taggings(tx, &self.plan, owner_id)?;
        wiring::update_counter(tx, &self.plan, owner_id, 0)?;
        Ok(())
    }

    /// Replace the persisted set with the target set.
    ///
    /// Restricted names are resolved ignoring case. A name with no
    /// matching row (deleted since validation) is dropped and recorded as
    /// [`TagError::UnknownTags`]; the remaining names are still written.
    fn write(&mut self, tx: &Connection, owner_id: i64, ctx: &mut MutationContext) -> Result<()> {
        let Some(target) = self.target().map(<[String]>::to_vec) else {
            return Ok(());
        };
        let plan = Arc::clone(&self.plan);

        ctx.taggings_deleted += wiring::delete_taggings(tx, &plan, owner_id)?;

        let mut missing = Vec::new();
        let mut tag_ids: Vec<i64> = Vec::with_capacity(target.len());
        for name in &target {
            let tag = if plan.restrict_to_existing {
                match wiring::find_tag(tx, &plan, name, true)? {
                    Some(tag) => tag,
                    None => {
                        missing.push(name.clone());
                        continue;
                    }
                }
            } else {
                let (tag, created) = wiring::find_or_create_tag(tx, &plan, name, ctx.now)?;
                if created {
                    ctx.tags_created += 1;
                }
                tag
            };
            // Restricted names can fold onto the same stored tag.
            if !tag_ids.contains(&tag.id) {
                wiring::insert_tagging(tx, &plan, tag.id, owner_id, ctx.now)?;
                tag_ids.push(tag.id);
            }
        }

        if !missing.is_empty() {
            warn!(
                context = %plan.context,
                owner_id,
                dropped = missing.len(),
                "Restricted tags vanished before save, dropped"
            );
            self.errors.push(TagError::UnknownTags { names: missing });
        }

        let count = i64::try_from(tag_ids.len()).unwrap_or(i64::MAX);
        wiring::update_counter(tx, &plan, owner_id, count)?;
        ctx.taggings_inserted += tag_ids.len();
        debug!(
            taggable = %plan.taggable.name,
            context = %plan.context,
            owner_id,
            count,
            "Tag list written"
        );
        Ok(())
    }
}

impl RecordExtension for TagListProxy {
    fn name(&self) -> &str {
        &self.plan.context
    }

    fn is_changed(&self, conn: &Connection, owner: Option<i64>) -> Result<bool> {
        TagListProxy::is_changed(self, conn, owner)
    }

    fn validate(
        &mut self,
        conn: &Connection,
        _owner: Option<i64>,
        record: &dyn Any,
    ) -> Result<bool> {
        let Some(target) = self.target().map(<[String]>::to_vec) else {
            return Ok(true);
        };
        let found = validation::validate(conn, &self.plan, record, &target)?;
        let valid = found.is_empty();
        self.errors.extend(found);
        Ok(valid)
    }

    fn save(&mut self, tx: &Connection, owner_id: i64, ctx: &mut MutationContext) -> Result<()> {
        self.write(tx, owner_id, ctx)
    }

    fn committed(&mut self) {
        self.state = ProxyState::Unloaded;
    }

    fn errors(&self) -> &[TagError] {
        &self.errors
    }

    fn push_error(&mut self, error: TagError) {
        self.errors.push(error);
    }

    fn clear_errors(&mut self) {
        self.errors.clear();
    }
}
