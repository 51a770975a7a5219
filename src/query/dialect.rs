//! SQL dialects and statement assembly.
//!
//! Dialect differences are confined to identifier quoting, placeholder
//! syntax and empty-list handling. Empty `IN` / `NOT IN` lists never reach
//! the database: they render as constant predicates.

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
    #[serde(alias = "postgresql")]
    Postgres,
    #[serde(alias = "mysql2")]
    Mysql,
}

impl Dialect {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
        }
    }

    /// Parse an adapter name; anything unrecognized is treated as SQLite.
    #[must_use]
    pub fn from_adapter(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "postgres" | "postgresql" => Self::Postgres,
            "mysql" | "mysql2" | "trilogy" => Self::Mysql,
            _ => Self::Sqlite,
        }
    }

    /// Quote an identifier.
    #[must_use]
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Self::Sqlite | Self::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
            Self::Mysql => format!("`{}`", ident.replace('`', "``")),
        }
    }

    /// Placeholder for the `n`-th (1-based) bound parameter.
    #[must_use]
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Self::Sqlite | Self::Mysql => "?".to_string(),
            Self::Postgres => format!("${n}"),
        }
    }
}

/// Rendered SQL plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Incremental statement writer that keeps placeholders numbered.
pub(crate) struct SqlBuilder {
    dialect: Dialect,
    sql: String,
    params: Vec<Value>,
}

impl SqlBuilder {
    pub(crate) fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    pub(crate) fn ident(&mut self, name: &str) -> &mut Self {
        let quoted = self.dialect.quote(name);
        self.sql.push_str(&quoted);
        self
    }

    /// `"table"."column"`
    pub(crate) fn column(&mut self, table: &str, column: &str) -> &mut Self {
        self.ident(table).push(".").ident(column)
    }

    pub(crate) fn bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.params.push(value.into());
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// `LOWER(<bound>)` when folding, the bare placeholder otherwise.
    pub(crate) fn bind_name(&mut self, name: &str, fold: bool) -> &mut Self {
        if fold {
            self.push("LOWER(").bind(name.to_string()).push(")")
        } else {
            self.bind(name.to_string())
        }
    }

    /// `<column> [NOT] IN (...)` over tag names.
    ///
    /// An empty list renders `1 = 0` (IN) or `1 = 1` (NOT IN).
    pub(crate) fn name_list(
        &mut self,
        table: &str,
        column: &str,
        names: &[String],
        fold: bool,
        negate: bool,
    ) -> &mut Self {
        if names.is_empty() {
            return self.push(if negate { "1 = 1" } else { "1 = 0" });
        }
        self.folded_column(table, column, fold);
        self.push(if negate { " NOT IN (" } else { " IN (" });
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.bind_name(name, fold);
        }
        self.push(")")
    }

    pub(crate) fn folded_column(&mut self, table: &str, column: &str, fold: bool) -> &mut Self {
        if fold {
            self.push("LOWER(").column(table, column).push(")")
        } else {
            self.column(table, column)
        }
    }

    pub(crate) fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoting() {
        assert_eq!(Dialect::Sqlite.quote("cars"), "\"cars\"");
        assert_eq!(Dialect::Postgres.quote("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(Dialect::Mysql.quote("cars"), "`cars`");
    }

    #[test]
    fn test_placeholders_are_numbered_for_postgres() {
        let mut b = SqlBuilder::new(Dialect::Postgres);
        b.push("a = ").bind(1).push(" AND b = ").bind("x".to_string());
        let stmt = b.finish();
        assert_eq!(stmt.sql, "a = $1 AND b = $2");
        assert_eq!(stmt.params.len(), 2);

        let mut b = SqlBuilder::new(Dialect::Mysql);
        b.push("a = ").bind(1);
        assert_eq!(b.finish().sql, "a = ?");
    }

    #[test]
    fn test_empty_lists_render_constants() {
        let mut b = SqlBuilder::new(Dialect::Sqlite);
        b.name_list("tags", "name", &[], false, false);
        assert_eq!(b.finish().sql, "1 = 0");

        let mut b = SqlBuilder::new(Dialect::Mysql);
        b.name_list("tags", "name", &[], true, true);
        assert_eq!(b.finish().sql, "1 = 1");
    }

    #[test]
    fn test_folded_list() {
        let mut b = SqlBuilder::new(Dialect::Postgres);
        b.name_list("tags", "name", &["Red".into(), "blue".into()], true, false);
        let stmt = b.finish();
        assert_eq!(
            stmt.sql,
            "LOWER(\"tags\".\"name\") IN (LOWER($1), LOWER($2))"
        );
    }

    #[test]
    fn test_from_adapter() {
        assert_eq!(Dialect::from_adapter("PostgreSQL"), Dialect::Postgres);
        assert_eq!(Dialect::from_adapter("mysql2"), Dialect::Mysql);
        assert_eq!(Dialect::from_adapter("sqlite3"), Dialect::Sqlite);
    }

    #[test]
    fn test_serde_aliases() {
        let d: Dialect = serde_json::from_str("\"postgresql\"").unwrap();
        assert_eq!(d, Dialect::Postgres);
        assert_eq!(serde_json::to_string(&Dialect::Mysql).unwrap(), "\"mysql\"");
    }
}
