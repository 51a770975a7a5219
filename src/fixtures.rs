//! Host records and registries shared by unit tests.

use crate::config::TaggingConfig;
use crate::error::Result;
use crate::model::{Taggable, TaggableType};
use crate::schema::{ContextOptions, Limit, Registry};
use crate::storage::Store;
use rusqlite::Connection;
use std::sync::Arc;

pub const HOST_DDL: &str = "
CREATE TABLE IF NOT EXISTS cars (id INTEGER PRIMARY KEY, make TEXT NOT NULL);
CREATE TABLE IF NOT EXISTS trucks (id INTEGER PRIMARY KEY, make TEXT NOT NULL);
CREATE TABLE IF NOT EXISTS passengers (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    premium INTEGER NOT NULL DEFAULT 0
);
";

#[derive(Debug, Clone, Default)]
pub struct Car {
    pub id: Option<i64>,
    pub make: String,
}

impl Car {
    pub fn new(make: &str) -> Self {
        Self {
            id: None,
            make: make.to_string(),
        }
    }
}

impl Taggable for Car {
    const TYPE_NAME: &'static str = "Car";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn insert(&self, conn: &Connection) -> Result<i64> {
        conn.execute("INSERT INTO cars (make) VALUES (?1)", [&self.make])?;
        Ok(conn.last_insert_rowid())
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

#[derive(Debug, Clone, Default)]
pub struct Truck {
    pub id: Option<i64>,
    pub make: String,
}

impl Taggable for Truck {
    const TYPE_NAME: &'static str = "Truck";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn insert(&self, conn: &Connection) -> Result<i64> {
        conn.execute("INSERT INTO trucks (make) VALUES (?1)", [&self.make])?;
        Ok(conn.last_insert_rowid())
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

/// `name: None` makes the insert fail on the NOT NULL constraint.
#[derive(Debug, Clone, Default)]
pub struct Passenger {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub premium: bool,
}

impl Passenger {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: Some(name.to_string()),
            premium: false,
        }
    }
}

impl Taggable for Passenger {
    const TYPE_NAME: &'static str = "Passenger";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn insert(&self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO passengers (name, premium) VALUES (?1, ?2)",
            rusqlite::params![self.name, self.premium],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

/// Airline registry:
/// - Car: `colors` (local), `fuel_types` (case-insensitive, counter cache),
///   `labels` (shared)
/// - Truck: `labels` (shared)
/// - Passenger: `special_needs` (limit 3, counter cache),
///   `meal_preferences` (restricted), `excuses` (shared),
///   `upgrades` (limit 1, or 3 for premium passengers)
pub fn registry() -> Arc<Registry> {
    let mut registry = Registry::new(TaggingConfig::default());
    let car = TaggableType::new("Car", "cars");
    let truck = TaggableType::new("Truck", "trucks");
    let passenger = TaggableType::new("Passenger", "passengers");

    registry.declare(&car, &["colors"], &ContextOptions::default()).unwrap();
    registry
        .declare(&car, &["fuel_types"], &ContextOptions::new().case_insensitive().counter_cache())
        .unwrap();
    registry.declare(&car, &["labels"], &ContextOptions::new().shared()).unwrap();
    registry.declare(&truck, &["labels"], &ContextOptions::new().shared()).unwrap();
    registry
        .declare(&passenger, &["special_needs"], &ContextOptions::new().limit(3).counter_cache())
        .unwrap();
    registry
        .declare(&passenger, &["meal_preferences"], &ContextOptions::new().restrict_to_existing())
        .unwrap();
    registry.declare(&passenger, &["excuses"], &ContextOptions::new().shared()).unwrap();
    let upgrades = Limit::per_record(|p: &Passenger| if p.premium { 3 } else { 1 });
    registry
        .declare(&passenger, &["upgrades"], &ContextOptions::new().limit_with(upgrades))
        .unwrap();
    Arc::new(registry)
}

/// In-memory store with host tables and wiring installed.
pub fn store() -> Store {
    let store = Store::open_memory(registry()).unwrap();
    store.conn().execute_batch(HOST_DDL).unwrap();
    store.install_all().unwrap();
    store
}
