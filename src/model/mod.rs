//! Data models for nofly.
//!
//! This module contains the persisted shapes:
//! - TaggableType / Taggable (host records)
//! - Tag
//! - Tagging and its Owner reference

pub mod tag;
pub mod taggable;

pub use tag::{Owner, Tag, Tagging};
pub use taggable::{Taggable, TaggableType};
