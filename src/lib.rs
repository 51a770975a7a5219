//! nofly - multi-context tagging for SQLite-backed records
//!
//! Record types declare named tag contexts (colors, meal preferences,
//! excuses...). Each context either gets tables dedicated to its type or
//! shares one global tag vocabulary with other types.
//!
//! # Architecture
//!
//! - [`schema`] - Context options, the planner and the plan registry
//! - [`storage`] - SQLite store and per-context table wiring
//! - [`proxy`] - Deferred tag list edits, validation and atomic save
//! - [`query`] - ANY / ALL / EXACT / NONE predicates rendered per dialect
//! - [`transform`] - Tag string codecs
//! - [`config`] - Global configuration and declaration files
//! - [`model`] - Persisted row types and the `Taggable` trait
//! - [`error`] - Error types and handling
//!
//! # Example
//!
//! ```ignore
//! let mut registry = Registry::new(TaggingConfig::load(path)?.with_env_overrides()?);
//! registry.declare(&TaggableType::new("Car", "cars"), &["colors"], &ContextOptions::default())?;
//! let mut store = Store::open(db_path, Arc::new(registry))?;
//!
//! let mut car = Tagged::new(Car::new("Toyota"));
//! car.add(&mut store, "colors", "red, blue")?;
//! assert!(car.save(&mut store));
//!
//! let red = Query::of::<Car>(store.registry())?.with_any("colors", ["red"])?;
//! let ids = store.ids(&red)?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod inflect;
pub mod model;
pub mod proxy;
pub mod query;
pub mod schema;
pub mod storage;
pub mod transform;

#[cfg(test)]
pub(crate) mod fixtures;

pub use config::{Declarations, TaggingConfig};
pub use error::{Error, ErrorCode, Result};
pub use model::{Owner, Tag, Taggable, TaggableType, Tagging};
pub use proxy::{RecordExtension, TagError, TagInput, TagList, Tagged};
pub use query::{Dialect, Filter, Query, Statement};
pub use schema::{ContextOptions, ContextPlan, Limit, Registry, Scope};
pub use storage::{SchemaReport, Store, TypeFilter};
pub use transform::{DelimitedTransformer, TagTransformer};
