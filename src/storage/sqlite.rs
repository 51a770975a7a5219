//! SQLite store.
//!
//! The store owns the connection and the shared registry. Writes go
//! through [`Store::mutate`], which wraps the closure in one IMMEDIATE
//! transaction; reads go straight to the connection.

use super::wiring::{self, SchemaReport, TypeFilter};
use crate::error::Result;
use crate::model::{Owner, Tag, Tagging};
use crate::query::{Dialect, Query};
use crate::schema::{ContextPlan, Registry};
use rusqlite::{params_from_iter, Connection, Transaction};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// SQLite-backed tag store.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    registry: Arc<Registry>,
}

/// Context for one mutation, tracking its side effects.
///
/// Passed to mutation closures so every write in a transaction shares
/// one timestamp and the commit can be logged with row counts.
#[derive(Debug, Clone)]
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Transaction timestamp (Unix milliseconds).
    pub now: i64,
    pub tags_created: usize,
    pub taggings_deleted: usize,
    pub taggings_inserted: usize,
}

impl MutationContext {
    #[must_use]
    pub fn new(op_name: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            now: chrono::Utc::now().timestamp_millis(),
            tags_created: 0,
            taggings_deleted: 0,
            taggings_inserted: 0,
        }
    }
}

impl Store {
    /// Open a database file and install every declared context.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or wiring fails.
    pub fn open(path: &Path, registry: Arc<Registry>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(registry.config().busy_timeout_ms))?;
        Self::init(conn, registry)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or wiring fails.
    pub fn open_memory(registry: Arc<Registry>) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, registry)
    }

    fn init(conn: Connection, registry: Arc<Registry>) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self { conn, registry };
        store.install_all()?;
        Ok(store)
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Look up a declared plan.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` / `UnknownContext` when not declared.
    pub fn plan(&self, taggable: &str, context: &str) -> Result<Arc<ContextPlan>> {
        self.registry.plan(taggable, context).map(Arc::clone)
    }

    /// Install wiring for one plan. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if DDL fails or the existing tables have the wrong shape.
    pub fn install(&self, plan: &ContextPlan) -> Result<()> {
        wiring::install(&self.conn, plan)
    }

    /// Install wiring for every declared plan.
    ///
    /// Safe to call again, e.g. after host tables are created so that
    /// counter-cache columns can be added.
    ///
    /// # Errors
    ///
    /// Returns the first wiring error.
    pub fn install_all(&self) -> Result<()> {
        for plan in self.registry.plans() {
            self.install(plan)?;
        }
        Ok(())
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op);

        let result = match f(&tx, &mut ctx) {
            Ok(result) => result,
            Err(e) => {
                warn!(op, error = %e, "Mutation rolled back");
                return Err(e);
            }
        };

        tx.commit()?;

        debug!(
            op,
            tags_created = ctx.tags_created,
            taggings_deleted = ctx.taggings_deleted,
            taggings_inserted = ctx.taggings_inserted,
            "Mutation committed"
        );
        Ok(result)
    }

    // ==================
    // Associations
    // ==================

    /// Tag names of one owner, in tagging order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn tag_names(&self, plan: &ContextPlan, owner_id: i64) -> Result<Vec<String>> {
        wiring::tag_names(&self.conn, plan, owner_id)
    }

    /// Tagging rows of one owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn taggings(&self, plan: &ContextPlan, owner_id: i64) -> Result<Vec<Tagging>> {
        wiring::taggings(&self.conn, plan, owner_id)
    }

    /// Owners tagged with `tag_name` in the plan's context.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn taggables(
        &self,
        plan: &ContextPlan,
        tag_name: &str,
        filter: &TypeFilter,
    ) -> Result<Vec<Owner>> {
        wiring::taggables(&self.conn, plan, tag_name, filter)
    }

    /// Every tag in the plan's tag table.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn tags(&self, plan: &ContextPlan) -> Result<Vec<Tag>> {
        wiring::list_tags(&self.conn, plan)
    }

    /// Find a tag by name under the context's case policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_tag(&self, plan: &ContextPlan, name: &str) -> Result<Option<Tag>> {
        wiring::find_tag(&self.conn, plan, name.trim(), !plan.case_sensitive)
    }

    /// Create a tag row directly, e.g. to seed a restricted vocabulary.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn create_tag(&mut self, plan: &ContextPlan, name: &str) -> Result<Tag> {
        let name = name.trim().to_string();
        self.mutate("create_tag", |tx, ctx| {
            let (tag, created) = wiring::find_or_create_tag(tx, plan, &name, ctx.now)?;
            if created {
                ctx.tags_created += 1;
            }
            Ok(tag)
        })
    }

    /// Persisted tagging count for one owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn tagging_count(&self, plan: &ContextPlan, owner_id: i64) -> Result<i64> {
        wiring::count_taggings(&self.conn, plan, owner_id)
    }

    /// Counter-cache value for one owner, `None` if not counter-cached
    /// or the record does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn counter(&self, plan: &ContextPlan, owner_id: i64) -> Result<Option<i64>> {
        wiring::read_counter(&self.conn, plan, owner_id)
    }

    /// Compare the plan's tables against what it needs.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog queries fail.
    pub fn check(&self, plan: &ContextPlan) -> Result<SchemaReport> {
        wiring::check(&self.conn, plan)
    }

    // ==================
    // Queries
    // ==================

    /// Ids of the records matching `query`, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn ids(&self, query: &Query<'_>) -> Result<Vec<i64>> {
        let stmt = query.ids_sql(Dialect::Sqlite);
        let mut prepared = self.conn.prepare(&stmt.sql)?;
        let rows = prepared.query_map(params_from_iter(stmt.params), |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<i64>>>()?)
    }

    /// Number of records matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self, query: &Query<'_>) -> Result<i64> {
        let stmt = query.count_records_sql(Dialect::Sqlite);
        Ok(self
            .conn
            .query_row(&stmt.sql, params_from_iter(stmt.params), |row| row.get(0))?)
    }

    /// `(id, tag count in context)` for every record matching `query`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownContext` or a query error.
    pub fn tag_counts(&self, query: &Query<'_>, context: &str) -> Result<Vec<(i64, i64)>> {
        let stmt = query.count_sql(context, Dialect::Sqlite)?;
        let mut prepared = self.conn.prepare(&stmt.sql)?;
        let rows = prepared.query_map(params_from_iter(stmt.params), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
