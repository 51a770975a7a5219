//! Schema planning for tag contexts.
//!
//! Declaring a context runs the planner once and stores the resulting
//! [`ContextPlan`] in the [`Registry`]. Everything downstream (wiring,
//! proxies, queries) reads the plan instead of re-deriving names.
//!
//! # Submodules
//!
//! - [`options`] - Declaration options and limits
//! - [`plan`] - The pure planner
//! - [`registry`] - Per-(type, context) plan registry

pub mod options;
pub mod plan;
pub mod registry;

pub use options::{ContextOptions, Limit};
pub use plan::{plan, ContextPlan, Scope, OWNER_ID_COLUMN, OWNER_TYPE_COLUMN};
pub use registry::Registry;
