//! Cohort: intern, project and task tracking with automatic project completion.
//!
//! Administrators create projects, register interns, assign interns to
//! projects and hand out tasks. When every task in a project is completed the
//! project completes and its interns are released. All of it is recorded in a
//! per-project audit history.

pub mod api;
pub mod backend;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod workflow;
