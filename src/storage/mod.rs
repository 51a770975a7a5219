//! SQLite storage layer for nofly.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic tag saves
//! - Idempotent wiring of tag and tagging tables per declared context
//!
//! # Submodules
//!
//! - [`sqlite`] - The store: connection, transactions, reads
//! - [`wiring`] - DDL and association queries for one context plan

pub mod sqlite;
pub mod wiring;

pub use sqlite::{MutationContext, Store};
pub use wiring::{SchemaReport, TableReport, TypeFilter};
