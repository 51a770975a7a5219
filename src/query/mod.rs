//! Set-predicate queries over a taggable collection.
//!
//! A [`Query`] starts from one taggable type's table and accumulates
//! predicates, all joined with `AND`:
//! - `with_any` / `with_all` / `with_exact` over a context's tag names
//! - `without` (no tags in the context) / `without_any`
//! - arbitrary column [`Filter`]s on the base table
//!
//! Every tag predicate renders as `pk [NOT] IN (subquery)`, so predicates
//! compose freely. Empty name lists are decided at build time:
//!
//! | predicate | empty input |
//! |---|---|
//! | `with_any` | matches nothing |
//! | `with_all` | matches nothing |
//! | `with_exact` | same as `without` |
//! | `without_any` | unfiltered |

pub mod dialect;

pub use dialect::{Dialect, Statement};

use crate::error::{Error, Result};
use crate::inflect::is_identifier;
use crate::model::{Taggable, TaggableType};
use crate::schema::{ContextPlan, Registry, Scope, OWNER_ID_COLUMN, OWNER_TYPE_COLUMN};
use crate::transform::normalize_names;
use dialect::SqlBuilder;
use rusqlite::types::Value;
use std::sync::Arc;

const TAGGING_ALIAS: &str = "tg";
const TAG_ALIAS: &str = "t";

/// Column comparison on the base table.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Le(String, Value),
    Gt(String, Value),
    Ge(String, Value),
    Like(String, String),
    In(String, Vec<Value>),
    IsNull(String),
    IsNotNull(String),
}

impl Filter {
    pub fn equals(column: &str, value: impl Into<Value>) -> Self {
        Self::Eq(column.to_string(), value.into())
    }

    pub fn not_equals(column: &str, value: impl Into<Value>) -> Self {
        Self::Ne(column.to_string(), value.into())
    }

    pub fn less_than(column: &str, value: impl Into<Value>) -> Self {
        Self::Lt(column.to_string(), value.into())
    }

    pub fn greater_than(column: &str, value: impl Into<Value>) -> Self {
        Self::Gt(column.to_string(), value.into())
    }

    #[must_use]
    pub fn like(column: &str, pattern: &str) -> Self {
        Self::Like(column.to_string(), pattern.to_string())
    }

    fn column(&self) -> &str {
        match self {
            Self::Eq(c, _)
            | Self::Ne(c, _)
            | Self::Lt(c, _)
            | Self::Le(c, _)
            | Self::Gt(c, _)
            | Self::Ge(c, _)
            | Self::Like(c, _)
            | Self::In(c, _)
            | Self::IsNull(c)
            | Self::IsNotNull(c) => c,
        }
    }

    fn render(&self, b: &mut SqlBuilder, table: &str) {
        let comparison = |b: &mut SqlBuilder, column: &str, op: &str, value: &Value| {
            b.column(table, column).push(op).bind(value.clone());
        };
        match self {
            Self::Eq(c, v) => comparison(b, c, " = ", v),
            Self::Ne(c, v) => comparison(b, c, " <> ", v),
            Self::Lt(c, v) => comparison(b, c, " < ", v),
            Self::Le(c, v) => comparison(b, c, " <= ", v),
            Self::Gt(c, v) => comparison(b, c, " > ", v),
            Self::Ge(c, v) => comparison(b, c, " >= ", v),
            Self::Like(c, pattern) => {
                b.column(table, c).push(" LIKE ").bind(pattern.clone());
            }
            Self::In(c, values) => {
                if values.is_empty() {
                    b.push("1 = 0");
                } else {
                    b.column(table, c).push(" IN (");
                    for (i, v) in values.iter().enumerate() {
                        if i > 0 {
                            b.push(", ");
                        }
                        b.bind(v.clone());
                    }
                    b.push(")");
                }
            }
            Self::IsNull(c) => {
                b.column(table, c).push(" IS NULL");
            }
            Self::IsNotNull(c) => {
                b.column(table, c).push(" IS NOT NULL");
            }
        }
    }
}

/// One tag predicate over a context.
#[derive(Debug, Clone)]
enum TagPredicate {
    Any(Vec<String>),
    All(Vec<String>),
    Exact(Vec<String>),
    Untagged,
    NoneOf(Vec<String>),
}

#[derive(Debug, Clone)]
enum Clause {
    Tags(Arc<ContextPlan>, TagPredicate),
    Column(Filter),
}

/// Query over one taggable type's records.
#[derive(Debug, Clone)]
pub struct Query<'r> {
    registry: &'r Registry,
    taggable: TaggableType,
    clauses: Vec<Clause>,
}

impl<'r> Query<'r> {
    /// Start a query over every record of `type_name`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` if the type has no declared contexts.
    pub fn new(registry: &'r Registry, type_name: &str) -> Result<Self> {
        Ok(Self {
            registry,
            taggable: registry.taggable(type_name)?.clone(),
            clauses: Vec::new(),
        })
    }

    /// Start a query over records of `T`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` if `T` has no declared contexts.
    pub fn of<T: Taggable>(registry: &'r Registry) -> Result<Self> {
        Self::new(registry, T::TYPE_NAME)
    }

    #[must_use]
    pub fn taggable(&self) -> &TaggableType {
        &self.taggable
    }

    /// Records with at least one of `names` in `context`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownContext` if the context is not declared.
    pub fn with_any<I, S>(self, context: &str, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tag_clause(context, names, TagPredicate::Any)
    }

    /// Records tagged with every one of `names` in `context`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownContext` if the context is not declared.
    pub fn with_all<I, S>(self, context: &str, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tag_clause(context, names, TagPredicate::All)
    }

    /// Records whose tag set in `context` equals `names`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownContext` if the context is not declared.
    pub fn with_exact<I, S>(self, context: &str, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tag_clause(context, names, |names| {
            if names.is_empty() {
                TagPredicate::Untagged
            } else {
                TagPredicate::Exact(names)
            }
        })
    }

    /// Records with no tags at all in `context`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownContext` if the context is not declared.
    pub fn without(mut self, context: &str) -> Result<Self> {
        let plan = Arc::clone(self.registry.plan(&self.taggable.name, context)?);
        self.clauses.push(Clause::Tags(plan, TagPredicate::Untagged));
        Ok(self)
    }

    /// Records having none of `names` in `context`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownContext` if the context is not declared.
    pub fn without_any<I, S>(self, context: &str, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tag_clause(context, names, TagPredicate::NoneOf)
    }

    /// Add a column comparison on the base table.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the column is not a plain identifier.
    pub fn filter(mut self, filter: Filter) -> Result<Self> {
        if !is_identifier(filter.column()) {
            return Err(Error::Configuration(format!(
                "filter column must be a plain identifier, got '{}'",
                filter.column()
            )));
        }
        self.clauses.push(Clause::Column(filter));
        Ok(self)
    }

    fn tag_clause<I, S, F>(mut self, context: &str, names: I, make: F) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnOnce(Vec<String>) -> TagPredicate,
    {
        let plan = Arc::clone(self.registry.plan(&self.taggable.name, context)?);
        let names = query_names(&plan, names);
        self.clauses.push(Clause::Tags(plan, make(names)));
        Ok(self)
    }

    /// `SELECT base.* ... ORDER BY pk`
    #[must_use]
    pub fn to_sql(&self, dialect: Dialect) -> Statement {
        self.select(dialect, |b, table, _| {
            b.ident(table).push(".*");
        })
    }

    /// `SELECT pk ... ORDER BY pk`
    #[must_use]
    pub fn ids_sql(&self, dialect: Dialect) -> Statement {
        self.select(dialect, |b, table, pk| {
            b.column(table, pk);
        })
    }

    /// Number of matching records.
    #[must_use]
    pub fn count_records_sql(&self, dialect: Dialect) -> Statement {
        let table = &self.taggable.table;
        let mut b = SqlBuilder::new(dialect);
        b.push("SELECT COUNT(*) FROM ").ident(table);
        self.render_where(&mut b);
        b.finish()
    }

    /// Per-record tag counts in `context`, left-joined so untagged records
    /// report zero. Columns: `pk`, `{context}_count`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownContext` if the context is not declared.
    pub fn count_sql(&self, context: &str, dialect: Dialect) -> Result<Statement> {
        let plan = self.registry.plan(&self.taggable.name, context)?;
        let table = &self.taggable.table;
        let pk = &self.taggable.primary_key;

        let mut b = SqlBuilder::new(dialect);
        b.push("SELECT ")
            .column(table, pk)
            .push(", COUNT(")
            .column(TAGGING_ALIAS, "id")
            .push(") AS ")
            .ident(&format!("{context}_count"))
            .push(" FROM ")
            .ident(table)
            .push(" LEFT JOIN ")
            .ident(&plan.tagging_table)
            .push(" ")
            .ident(TAGGING_ALIAS)
            .push(" ON ")
            .column(TAGGING_ALIAS, OWNER_ID_COLUMN)
            .push(" = ")
            .column(table, pk)
            .push(" AND ")
            .column(TAGGING_ALIAS, "context")
            .push(" = ")
            .bind(plan.label.clone());
        if plan.scope == Scope::Shared {
            b.push(" AND ")
                .column(TAGGING_ALIAS, OWNER_TYPE_COLUMN)
                .push(" = ")
                .bind(plan.taggable.name.clone());
        }
        self.render_where(&mut b);
        b.push(" GROUP BY ")
            .column(table, pk)
            .push(" ORDER BY ")
            .column(table, pk);
        Ok(b.finish())
    }

    fn select<F>(&self, dialect: Dialect, columns: F) -> Statement
    where
        F: FnOnce(&mut SqlBuilder, &str, &str),
    {
        let table = &self.taggable.table;
        let pk = &self.taggable.primary_key;
        let mut b = SqlBuilder::new(dialect);
        b.push("SELECT ");
        columns(&mut b, table, pk);
        b.push(" FROM ").ident(table);
        self.render_where(&mut b);
        b.push(" ORDER BY ").column(table, pk);
        b.finish()
    }

    fn render_where(&self, b: &mut SqlBuilder) {
        for (i, clause) in self.clauses.iter().enumerate() {
            b.push(if i == 0 { " WHERE (" } else { " AND (" });
            match clause {
                Clause::Tags(plan, predicate) => self.render_tags(b, plan, predicate),
                Clause::Column(filter) => filter.render(b, &self.taggable.table),
            }
            b.push(")");
        }
    }

    fn render_tags(&self, b: &mut SqlBuilder, plan: &ContextPlan, predicate: &TagPredicate) {
        let fold = !plan.case_sensitive;
        match predicate {
            TagPredicate::Any(names) if names.is_empty() => {
                b.push("1 = 0");
            }
            TagPredicate::All(names) if names.is_empty() => {
                b.push("1 = 0");
            }
            TagPredicate::NoneOf(names) if names.is_empty() => {
                b.push("1 = 1");
            }
            TagPredicate::Any(names) => {
                self.owner_in(b, false);
                owners_with_names(b, plan, names, fold, false);
                b.push(")");
            }
            TagPredicate::All(names) => {
                self.owner_in(b, false);
                owners_with_all(b, plan, names, fold);
                b.push(")");
            }
            TagPredicate::Exact(names) => {
                self.owner_in(b, false);
                owners_with_all(b, plan, names, fold);
                b.push(") AND ");
                self.owner_in(b, true);
                owners_with_names(b, plan, names, fold, true);
                b.push(")");
            }
            TagPredicate::Untagged => {
                self.owner_in(b, true);
                owners_in_context(b, plan);
                b.push(")");
            }
            TagPredicate::NoneOf(names) => {
                self.owner_in(b, true);
                owners_with_names(b, plan, names, fold, false);
                b.push(")");
            }
        }
    }

    fn owner_in(&self, b: &mut SqlBuilder, negate: bool) {
        b.column(&self.taggable.table, &self.taggable.primary_key)
            .push(if negate { " NOT IN (" } else { " IN (" });
    }
}

/// Flatten through the context transformer, then de-duplicate under the
/// context's case policy. Folding is ASCII-only, like SQLite's `LOWER`.
fn query_names<I, S>(plan: &ContextPlan, names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parsed: Vec<String> = names
        .into_iter()
        .flat_map(|n| plan.transformer.parse(n.as_ref()))
        .collect();
    let mut names = normalize_names(parsed);
    if !plan.case_sensitive {
        let mut seen: Vec<String> = Vec::with_capacity(names.len());
        names.retain(|n| {
            let folded = n.to_ascii_lowercase();
            if seen.contains(&folded) {
                false
            } else {
                seen.push(folded);
                true
            }
        });
    }
    names
}

/// `SELECT tg.taggable_id FROM taggings tg WHERE <context> [AND <type>]`
fn owners_in_context(b: &mut SqlBuilder, plan: &ContextPlan) {
    b.push("SELECT ")
        .column(TAGGING_ALIAS, OWNER_ID_COLUMN)
        .push(" FROM ")
        .ident(&plan.tagging_table)
        .push(" ")
        .ident(TAGGING_ALIAS);
    context_filter(b, plan, " WHERE ");
}

fn context_filter(b: &mut SqlBuilder, plan: &ContextPlan, lead: &str) {
    b.push(lead)
        .column(TAGGING_ALIAS, "context")
        .push(" = ")
        .bind(plan.label.clone());
    if plan.scope == Scope::Shared {
        b.push(" AND ")
            .column(TAGGING_ALIAS, OWNER_TYPE_COLUMN)
            .push(" = ")
            .bind(plan.taggable.name.clone());
    }
}

fn join_tags(b: &mut SqlBuilder, plan: &ContextPlan) {
    b.push("SELECT ")
        .column(TAGGING_ALIAS, OWNER_ID_COLUMN)
        .push(" FROM ")
        .ident(&plan.tagging_table)
        .push(" ")
        .ident(TAGGING_ALIAS)
        .push(" JOIN ")
        .ident(&plan.tag_table)
        .push(" ")
        .ident(TAG_ALIAS)
        .push(" ON ")
        .column(TAG_ALIAS, "id")
        .push(" = ")
        .column(TAGGING_ALIAS, "tag_id");
}

/// Owners having a tag whose name is (or with `negate`, is not) in `names`.
fn owners_with_names(
    b: &mut SqlBuilder,
    plan: &ContextPlan,
    names: &[String],
    fold: bool,
    negate: bool,
) {
    join_tags(b, plan);
    context_filter(b, plan, " WHERE ");
    b.push(" AND ")
        .name_list(TAG_ALIAS, "name", names, fold, negate);
}

/// Owners having every one of `names`.
fn owners_with_all(b: &mut SqlBuilder, plan: &ContextPlan, names: &[String], fold: bool) {
    owners_with_names(b, plan, names, fold, false);
    b.push(" GROUP BY ")
        .column(TAGGING_ALIAS, OWNER_ID_COLUMN)
        .push(" HAVING COUNT(DISTINCT ")
        .folded_column(TAG_ALIAS, "name", fold)
        .push(") = ")
        .bind(i64::try_from(names.len()).unwrap_or(i64::MAX));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaggingConfig;
    use crate::schema::ContextOptions;

    fn registry() -> Registry {
        let mut registry = Registry::new(TaggingConfig::default());
        let car = TaggableType::new("Car", "cars");
        registry.declare(&car, &["colors"], &ContextOptions::default()).unwrap();
        registry
            .declare(&car, &["fuel_types"], &ContextOptions::new().case_insensitive())
            .unwrap();
        registry
            .declare(&car, &["labels"], &ContextOptions::new().shared())
            .unwrap();
        registry
    }

    #[test]
    fn test_with_any_renders_subquery() {
        let registry = registry();
        let stmt = Query::new(&registry, "Car")
            .unwrap()
            .with_any("colors", ["red", "blue"])
            .unwrap()
            .ids_sql(Dialect::Sqlite);

        assert_eq!(
            stmt.sql,
            "SELECT \"cars\".\"id\" FROM \"cars\" WHERE (\"cars\".\"id\" IN (\
             SELECT \"tg\".\"taggable_id\" FROM \"car_taggings\" \"tg\" \
             JOIN \"car_tags\" \"t\" ON \"t\".\"id\" = \"tg\".\"tag_id\" \
             WHERE \"tg\".\"context\" = ? AND \"t\".\"name\" IN (?, ?))) \
             ORDER BY \"cars\".\"id\""
        );
        assert_eq!(
            stmt.params,
            vec![
                Value::Text("color".into()),
                Value::Text("red".into()),
                Value::Text("blue".into())
            ]
        );
    }

    #[test]
    fn test_names_are_flattened_and_deduplicated() {
        let registry = registry();
        let stmt = Query::new(&registry, "Car")
            .unwrap()
            .with_all("colors", ["red, blue", "red", " "])
            .unwrap()
            .ids_sql(Dialect::Sqlite);
        // context, red, blue, count
        assert_eq!(stmt.params.len(), 4);
        assert_eq!(stmt.params[3], Value::Integer(2));
        assert!(stmt.sql.contains("HAVING COUNT(DISTINCT \"t\".\"name\") = ?"));
    }

    #[test]
    fn test_case_insensitive_folds_both_sides() {
        let registry = registry();
        let stmt = Query::new(&registry, "Car")
            .unwrap()
            .with_all("fuel_types", ["Diesel", "diesel", "LPG"])
            .unwrap()
            .to_sql(Dialect::Postgres);

        assert!(stmt.sql.contains("LOWER(\"t\".\"name\") IN (LOWER($2), LOWER($3))"));
        assert!(stmt.sql.contains("COUNT(DISTINCT LOWER(\"t\".\"name\")) = $4"));
        assert_eq!(stmt.params[3], Value::Integer(2));
    }

    #[test]
    fn test_empty_inputs() {
        let registry = registry();
        let q = || Query::new(&registry, "Car").unwrap();

        let none: [&str; 0] = [];
        let any = q().with_any("colors", none).unwrap().ids_sql(Dialect::Mysql);
        assert!(any.sql.contains("WHERE (1 = 0)"));
        assert!(!any.sql.contains("IN ()"));

        let all = q().with_all("colors", none).unwrap().ids_sql(Dialect::Mysql);
        assert!(all.sql.contains("WHERE (1 = 0)"));

        let none_of = q().without_any("colors", none).unwrap().ids_sql(Dialect::Mysql);
        assert!(none_of.sql.contains("WHERE (1 = 1)"));

        let exact = q().with_exact("colors", none).unwrap().ids_sql(Dialect::Sqlite);
        let without = q().without("colors").unwrap().ids_sql(Dialect::Sqlite);
        assert_eq!(exact, without);
    }

    #[test]
    fn test_exact_combines_all_and_not_in() {
        let registry = registry();
        let stmt = Query::new(&registry, "Car")
            .unwrap()
            .with_exact("colors", ["red"])
            .unwrap()
            .ids_sql(Dialect::Sqlite);
        assert!(stmt.sql.contains("HAVING COUNT(DISTINCT"));
        assert!(stmt.sql.contains("\"cars\".\"id\" NOT IN ("));
        assert!(stmt.sql.contains("\"t\".\"name\" NOT IN (?)"));
    }

    #[test]
    fn test_shared_context_filters_owner_type() {
        let registry = registry();
        let stmt = Query::new(&registry, "Car")
            .unwrap()
            .with_any("labels", ["fast"])
            .unwrap()
            .ids_sql(Dialect::Sqlite);
        assert!(stmt.sql.contains("\"application_taggings\""));
        assert!(stmt.sql.contains("\"tg\".\"taggable_type\" = ?"));
        assert_eq!(stmt.params[1], Value::Text("Car".into()));
    }

    #[test]
    fn test_composes_with_filters() {
        let registry = registry();
        let stmt = Query::new(&registry, "Car")
            .unwrap()
            .filter(Filter::equals("make", "Toyota".to_string()))
            .unwrap()
            .with_any("colors", ["red"])
            .unwrap()
            .without("fuel_types")
            .unwrap()
            .to_sql(Dialect::Mysql);

        let head = "SELECT `cars`.* FROM `cars` WHERE (`cars`.`make` = ?) AND (";
        assert!(stmt.sql.starts_with(head));
        assert_eq!(stmt.sql.matches(" AND (").count(), 2);
        assert_eq!(stmt.params[0], Value::Text("Toyota".into()));
    }

    #[test]
    fn test_count_sql_left_joins() {
        let registry = registry();
        let stmt = Query::new(&registry, "Car")
            .unwrap()
            .count_sql("labels", Dialect::Postgres)
            .unwrap();
        assert!(stmt.sql.contains("LEFT JOIN \"application_taggings\" \"tg\""));
        assert!(stmt.sql.contains("AS \"labels_count\""));
        assert!(stmt.sql.contains("\"tg\".\"taggable_type\" = $2"));
        assert!(stmt.sql.ends_with("GROUP BY \"cars\".\"id\" ORDER BY \"cars\".\"id\""));
    }

    #[test]
    fn test_unknown_context_and_bad_filter() {
        let registry = registry();
        let err = Query::new(&registry, "Car")
            .unwrap()
            .with_any("wheels", ["x"])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownContext { .. }));

        assert!(Query::new(&registry, "Car")
            .unwrap()
            .filter(Filter::IsNull("make; drop".into()))
            .is_err());
        assert!(matches!(
            Query::new(&registry, "Truck"),
            Err(Error::UnknownType { .. })
        ));
    }
}
