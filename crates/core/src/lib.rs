//! Orchestration core for turning a normalized project snapshot into a
//! project database file.
//!
//! The pipeline resolves which database server to use, validates the
//! per-category merge policy, attaches an empty template under a uniquely
//! named working database, runs the external transform against it, saves
//! the result and always drops the working database afterwards.

pub mod command;
pub mod config;
pub mod discovery;
pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod policy;
pub mod sidecar;
pub mod sqlcmd;
pub mod transform;

pub use orchestrator::{Orchestrator, RunSummary};
