//! Relational wiring for declared contexts.
//!
//! `install` materializes a plan's tag and tagging tables, the uniqueness
//! constraints, and the optional counter-cache column. Every statement is
//! guarded (`IF NOT EXISTS`, column probes) so installing the same plan
//! again is a no-op.
//!
//! The remaining functions are the associations a plan implies:
//! owner → taggings (filtered by context label) → tags, and
//! tag → taggings → owners. They take a plain `&Connection` so they work
//! both on the store connection and inside a save transaction.

use crate::error::{Error, Result};
use crate::model::{Owner, Tag, Tagging};
use crate::query::Dialect;
use crate::schema::{ContextPlan, Scope, OWNER_ID_COLUMN, OWNER_TYPE_COLUMN};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Columns every tag table needs.
pub const REQUIRED_TAG_COLUMNS: &[&str] = &["name"];

fn q(ident: &str) -> String {
    Dialect::Sqlite.quote(ident)
}

// ====================
// Installation
// ====================

/// Install the tables, indexes and counter column for `plan`.
///
/// # Errors
///
/// Returns a configuration error if an existing tagging table has the
/// wrong ownership shape, or a database error if DDL fails.
pub fn install(conn: &Connection, plan: &ContextPlan) -> Result<()> {
    let tags = &plan.tag_table;
    let taggings = &plan.tagging_table;

    let owner_columns = match plan.scope {
        Scope::Local => format!("{OWNER_ID_COLUMN} INTEGER NOT NULL,"),
        Scope::Shared => {
            format!("{OWNER_TYPE_COLUMN} TEXT NOT NULL,\n    {OWNER_ID_COLUMN} INTEGER NOT NULL,")
        }
    };
    let unique_columns = match plan.scope {
        Scope::Local => format!("{OWNER_ID_COLUMN}, context, tag_id"),
        Scope::Shared => format!("{OWNER_TYPE_COLUMN}, {OWNER_ID_COLUMN}, context, tag_id"),
    };
    let owner_index_columns = match plan.scope {
        Scope::Local => OWNER_ID_COLUMN.to_string(),
        Scope::Shared => format!("{OWNER_TYPE_COLUMN}, {OWNER_ID_COLUMN}"),
    };

    let ddl = format!(
        r"
CREATE TABLE IF NOT EXISTS {tags_q} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS {tag_name_idx} ON {tags_q}(name);

CREATE TABLE IF NOT EXISTS {taggings_q} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tag_id INTEGER NOT NULL,
    {owner_columns}
    context TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (tag_id) REFERENCES {tags_q}(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS {unique_idx} ON {taggings_q}({unique_columns});
CREATE INDEX IF NOT EXISTS {tag_idx} ON {taggings_q}(tag_id);
CREATE INDEX IF NOT EXISTS {context_idx} ON {taggings_q}(context);
CREATE INDEX IF NOT EXISTS {owner_idx} ON {taggings_q}({owner_index_columns});
",
        tags_q = q(tags),
        taggings_q = q(taggings),
        tag_name_idx = q(&format!("idx_{tags}_name")),
        unique_idx = q(&format!("idx_{taggings}_uniqueness")),
        tag_idx = q(&format!("idx_{taggings}_tag")),
        context_idx = q(&format!("idx_{taggings}_context")),
        owner_idx = q(&format!("idx_{taggings}_owner")),
    );
    if table_exists(conn, taggings)? {
        verify_tagging_shape(conn, plan)?;
    }
    conn.execute_batch(&ddl)?;
    install_counter_column(conn, plan)?;

    info!(
        taggable = %plan.taggable.name,
        context = %plan.context,
        tag_table = %tags,
        tagging_table = %taggings,
        "Installed tag context"
    );
    Ok(())
}

/// A pre-existing tagging table must match the plan's ownership shape.
fn verify_tagging_shape(conn: &Connection, plan: &ContextPlan) -> Result<()> {
    let has_type = column_exists(conn, &plan.tagging_table, OWNER_TYPE_COLUMN)?;
    match (plan.scope, has_type) {
        (Scope::Shared, false) => Err(Error::Configuration(format!(
            "shared context {}.{} needs '{}.{OWNER_TYPE_COLUMN}'",
            plan.taggable.name, plan.context, plan.tagging_table
        ))),
        (Scope::Local, true) => Err(Error::Configuration(format!(
            "local context {}.{} points at '{}', which is a shared tagging table",
            plan.taggable.name, plan.context, plan.tagging_table
        ))),
        _ => Ok(()),
    }
}

fn install_counter_column(conn: &Connection, plan: &ContextPlan) -> Result<()> {
    let Some(column) = &plan.counter_cache_column else {
        return Ok(());
    };
    if !table_exists(conn, &plan.taggable.table)? {
        warn!(
            table = %plan.taggable.table,
            column = %column,
            "Taggable table missing, counter column not installed yet"
        );
        return Ok(());
    }
    if column_exists(conn, &plan.taggable.table, column)? {
        return Ok(());
    }
    conn.execute_batch(&format!(
        "ALTER TABLE {} ADD COLUMN {} INTEGER NOT NULL DEFAULT 0",
        q(&plan.taggable.table),
        q(column)
    ))?;
    debug!(table = %plan.taggable.table, column = %column, "Added counter cache column");
    Ok(())
}

/// Check if a table exists.
///
/// # Errors
///
/// Returns an error if the catalog query fails.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    Ok(conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?
        .exists([table])?)
}

/// Check if a column exists in a table.
///
/// # Errors
///
/// Returns an error if the catalog query fails.
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    Ok(conn
        .prepare("SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2")?
        .exists([table, column])?)
}

/// All column names of a table, in table order.
///
/// # Errors
///
/// Returns an error if the catalog query fails.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let rows = stmt.query_map([table], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
}

// ====================
// Schema report
// ====================

/// Presence and column check for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub name: String,
    pub exists: bool,
    pub missing_columns: Vec<String>,
    pub columns: Vec<String>,
}

impl TableReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.exists && self.missing_columns.is_empty()
    }
}

/// Result of checking a context's tables against what the plan needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub taggable: String,
    pub context: String,
    pub tag_table: TableReport,
    pub tagging_table: TableReport,
}

impl SchemaReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.tag_table.is_ok() && self.tagging_table.is_ok()
    }
}

/// Columns a plan's tagging table needs.
#[must_use]
pub fn required_tagging_columns(plan: &ContextPlan) -> Vec<&'static str> {
    match plan.scope {
        Scope::Local => vec!["tag_id", OWNER_ID_COLUMN, "context"],
        Scope::Shared => vec!["tag_id", OWNER_TYPE_COLUMN, OWNER_ID_COLUMN, "context"],
    }
}

/// Inspect the tables of `plan` without changing anything.
///
/// # Errors
///
/// Returns an error if the catalog queries fail.
pub fn check(conn: &Connection, plan: &ContextPlan) -> Result<SchemaReport> {
    let report = |table: &str, required: &[&str]| -> Result<TableReport> {
        let exists = table_exists(conn, table)?;
        let columns = if exists { table_columns(conn, table)? } else { Vec::new() };
        let missing_columns = required
            .iter()
            .filter(|c| !columns.iter().any(|have| have == *c))
            .map(|c| (*c).to_string())
            .collect();
        Ok(TableReport {
            name: table.to_string(),
            exists,
            missing_columns,
            columns,
        })
    };

    Ok(SchemaReport {
        taggable: plan.taggable.name.clone(),
        context: plan.context.clone(),
        tag_table: report(&plan.tag_table, REQUIRED_TAG_COLUMNS)?,
        tagging_table: report(&plan.tagging_table, &required_tagging_columns(plan))?,
    })
}

// ====================
// Owner → tags
// ====================

/// `WHERE` fragment selecting one owner's taggings in this context.
fn owner_filter(plan: &ContextPlan, alias: &str, owner_id: i64) -> (String, Vec<Value>) {
    match plan.scope {
        Scope::Local => (
            format!("{alias}.{OWNER_ID_COLUMN} = ? AND {alias}.context = ?"),
            vec![Value::Integer(owner_id), Value::Text(plan.label.clone())],
        ),
        Scope::Shared => (
            format!(
                "{alias}.{OWNER_TYPE_COLUMN} = ? AND {alias}.{OWNER_ID_COLUMN} = ? AND {alias}.context = ?"
            ),
            vec![
                Value::Text(plan.taggable.name.clone()),
                Value::Integer(owner_id),
                Value::Text(plan.label.clone()),
            ],
        ),
    }
}

/// Tag names of one owner in this context, in tagging order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn tag_names(conn: &Connection, plan: &ContextPlan, owner_id: i64) -> Result<Vec<String>> {
    let (filter, params) = owner_filter(plan, "tg", owner_id);
    let sql = format!(
        "SELECT t.name FROM {} tg JOIN {} t ON t.id = tg.tag_id WHERE {filter} ORDER BY tg.id",
        q(&plan.tagging_table),
        q(&plan.tag_table)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params), |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
}

/// Tagging rows of one owner in this context.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn taggings(conn: &Connection, plan: &ContextPlan, owner_id: i64) -> Result<Vec<Tagging>> {
    let (filter, params) = owner_filter(plan, "tg", owner_id);
    let sql = format!(
        "SELECT tg.id, tg.tag_id, tg.context, tg.created_at, tg.updated_at
         FROM {} tg WHERE {filter} ORDER BY tg.id",
        q(&plan.tagging_table)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params), |row| {
        Ok(Tagging {
            id: row.get(0)?,
            tag_id: row.get(1)?,
            owner: plan.owner(owner_id),
            context: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Number of taggings one owner has in this context.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_taggings(conn: &Connection, plan: &ContextPlan, owner_id: i64) -> Result<i64> {
    let (filter, params) = owner_filter(plan, "tg", owner_id);
    let sql = format!("SELECT COUNT(*) FROM {} tg WHERE {filter}", q(&plan.tagging_table));
    Ok(conn.query_row(&sql, params_from_iter(params), |row| row.get(0))?)
}

/// Delete every tagging of one owner in this context.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete_taggings(conn: &Connection, plan: &ContextPlan, owner_id: i64) -> Result<usize> {
    let table = q(&plan.tagging_table);
    let (filter, params) = owner_filter(plan, &table, owner_id);
    let sql = format!("DELETE FROM {table} WHERE {filter}");
    Ok(conn.execute(&sql, params_from_iter(params))?)
}

/// Insert one tagging row.
///
/// # Errors
///
/// Returns an error on constraint violation or write failure.
pub fn insert_tagging(
    conn: &Connection,
    plan: &ContextPlan,
    tag_id: i64,
    owner_id: i64,
    now: i64,
) -> Result<i64> {
    match plan.scope {
        Scope::Local => conn.execute(
            &format!(
                "INSERT INTO {} (tag_id, {OWNER_ID_COLUMN}, context, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                q(&plan.tagging_table)
            ),
            rusqlite::params![tag_id, owner_id, plan.label, now],
        )?,
        Scope::Shared => conn.execute(
            &format!(
                "INSERT INTO {} (tag_id, {OWNER_TYPE_COLUMN}, {OWNER_ID_COLUMN}, context, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                q(&plan.tagging_table)
            ),
            rusqlite::params![tag_id, plan.taggable.name, owner_id, plan.label, now],
        )?,
    };
    Ok(conn.last_insert_rowid())
}

/// Write the counter-cache column for one owner.
///
/// # Errors
///
/// Returns an error if the update fails (e.g. the column is missing).
pub fn update_counter(
    conn: &Connection,
    plan: &ContextPlan,
    owner_id: i64,
    count: i64,
) -> Result<()> {
    if let Some(column) = &plan.counter_cache_column {
        conn.execute(
            &format!(
                "UPDATE {} SET {} = ?1 WHERE {} = ?2",
                q(&plan.taggable.table),
                q(column),
                q(&plan.taggable.primary_key)
            ),
            rusqlite::params![count, owner_id],
        )?;
    }
    Ok(())
}

/// Read the counter-cache column for one owner.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn read_counter(conn: &Connection, plan: &ContextPlan, owner_id: i64) -> Result<Option<i64>> {
    let Some(column) = &plan.counter_cache_column else {
        return Ok(None);
    };
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM {} WHERE {} = ?1",
                q(column),
                q(&plan.taggable.table),
                q(&plan.taggable.primary_key)
            ),
            [owner_id],
            |row| row.get(0),
        )
        .optional()?)
}

// ====================
// Tags
// ====================

fn map_tag(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

/// Find a tag by name, exactly or ignoring case.
///
/// `ignore_case` uses SQLite's `LOWER`, which folds ASCII letters only.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_tag(
    conn: &Connection,
    plan: &ContextPlan,
    name: &str,
    ignore_case: bool,
) -> Result<Option<Tag>> {
    let condition = if ignore_case { "LOWER(name) = LOWER(?1)" } else { "name = ?1" };
    let sql = format!(
        "SELECT id, name, created_at, updated_at FROM {} WHERE {condition} ORDER BY id LIMIT 1",
        q(&plan.tag_table)
    );
    Ok(conn.query_row(&sql, [name], map_tag).optional()?)
}

/// Find a tag by exact name, creating it when absent.
///
/// The flag is true when the row was created by this call.
///
/// # Errors
///
/// Returns an error if the insert or lookup fails.
pub fn find_or_create_tag(
    conn: &Connection,
    plan: &ContextPlan,
    name: &str,
    now: i64,
) -> Result<(Tag, bool)> {
    let created = conn.execute(
        &format!(
            "INSERT INTO {} (name, created_at, updated_at) VALUES (?1, ?2, ?2)
             ON CONFLICT(name) DO NOTHING",
            q(&plan.tag_table)
        ),
        rusqlite::params![name, now],
    )? > 0;
    let tag = find_tag(conn, plan, name, false)?.ok_or_else(|| {
        Error::Persistence(format!("tag '{name}' vanished from {}", plan.tag_table))
    })?;
    Ok((tag, created))
}

/// Stored tag names matching any of `names` ignoring ASCII case.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn existing_names_ignoring_case(
    conn: &Connection,
    plan: &ContextPlan,
    names: &[String],
) -> Result<Vec<String>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["LOWER(?)"; names.len()].join(", ");
    let sql = format!(
        "SELECT name FROM {} WHERE LOWER(name) IN ({placeholders}) ORDER BY id",
        q(&plan.tag_table)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(names.iter()), |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
}

/// Every row of the plan's tag table.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_tags(conn: &Connection, plan: &ContextPlan) -> Result<Vec<Tag>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, name, created_at, updated_at FROM {} ORDER BY id",
        q(&plan.tag_table)
    ))?;
    let rows = stmt.query_map([], map_tag)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ====================
// Tag → owners
// ====================

/// Which owner types the tag side of a shared context returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TypeFilter {
    /// Only owners of the plan's own taggable type.
    #[default]
    Own,
    /// Only owners of the named type.
    Only(String),
    /// Owners of every type.
    Any,
}

/// Owners tagged with `tag_name` in this context.
///
/// Local contexts only ever hold one owner type, so `filter` only matters
/// for shared contexts. Name matching follows the context's case policy.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn taggables(
    conn: &Connection,
    plan: &ContextPlan,
    tag_name: &str,
    filter: &TypeFilter,
) -> Result<Vec<Owner>> {
    let name_condition = if plan.case_sensitive {
        "t.name = ?"
    } else {
        "LOWER(t.name) = LOWER(?)"
    };
    let mut params = vec![Value::Text(tag_name.to_string()), Value::Text(plan.label.clone())];

    let (select, type_condition) = match plan.scope {
        Scope::Local => (format!("tg.{OWNER_ID_COLUMN}, NULL"), String::new()),
        Scope::Shared => {
            let condition = match filter {
                TypeFilter::Own => {
                    params.push(Value::Text(plan.taggable.name.clone()));
                    format!(" AND tg.{OWNER_TYPE_COLUMN} = ?")
                }
                TypeFilter::Only(owner_type) => {
                    params.push(Value::Text(owner_type.clone()));
                    format!(" AND tg.{OWNER_TYPE_COLUMN} = ?")
                }
                TypeFilter::Any => String::new(),
            };
            (format!("tg.{OWNER_ID_COLUMN}, tg.{OWNER_TYPE_COLUMN}"), condition)
        }
    };

    let sql = format!(
        "SELECT DISTINCT {select} FROM {} tg JOIN {} t ON t.id = tg.tag_id
         WHERE {name_condition} AND tg.context = ?{type_condition}
         ORDER BY 2, 1",
        q(&plan.tagging_table),
        q(&plan.tag_table)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params), |row| {
        let id: i64 = row.get(0)?;
        let owner_type: Option<String> = row.get(1)?;
        Ok(match owner_type {
            Some(owner_type) => Owner::Typed { owner_type, id },
            None => Owner::Record { id },
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
