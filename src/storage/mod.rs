//! Storage module for project paths and persistent sshgrid state
//!
//! This module locates the BOINC project on disk and keeps the small key
//! database used by sshgrid jobs.

mod keys;
mod paths;

pub use keys::{KeyRecord, KeyStore, DEFAULT_KEY_DB};
pub use paths::ProjectPaths;
