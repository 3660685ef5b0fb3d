//! Domain models for Cohort.
//!
//! # Core Concepts
//!
//! - [`Project`]: a unit of work with a one-way status (`in_progress` → `completed`).
//! - [`Intern`]: a person assigned to at most one in-progress project at a time.
//! - [`Task`]: work an intern performs within a project. When every task in a
//!   project is completed, the project completes and its interns are released.
//! - [`HistoryItem`]: append-only audit log of assignments and status changes.
//! - [`AssignedInternsMap`]: the current project → interns membership.

mod assignment;
mod history;
mod intern;
mod project;
mod task;

pub use assignment::*;
pub use history::*;
pub use intern::*;
pub use project::*;
pub use task::*;

/// Server-assigned row identifier.
pub type DbId = i64;
