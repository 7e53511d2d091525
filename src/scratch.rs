//! The per-run scratch directory
//!
//! `docker save` output, generated keys and the input template all live in
//! one temporary directory. It is removed however the run ends: finished,
//! failed, or cancelled.

use anyhow::{Context, Result};
use std::future::Future;
use std::path::PathBuf;
use tracing::debug;

/// How a run inside the scratch directory ended
#[derive(Debug)]
pub enum Outcome<T> {
    Finished(T),
    Cancelled,
}

/// Run `work` in a fresh scratch directory until it completes or `cancel`
/// resolves, then remove the directory.
///
/// `cancel` is checked first, so a run that is already cancelled never starts
/// its work.
pub async fn with_scratch<T, W, F, C>(work: W, cancel: C) -> Result<Outcome<T>>
where
    W: FnOnce(PathBuf) -> F,
    F: Future<Output = Result<T>>,
    C: Future,
{
    let scratch = tempfile::Builder::new()
        .prefix("boinc2docker")
        .tempdir()
        .context("Failed to create scratch directory")?;
    debug!("Scratch directory: {:?}", scratch.path());

    let result = tokio::select! {
        biased;
        _ = cancel => None,
        result = work(scratch.path().to_path_buf()) => Some(result),
    };

    if result.is_none() {
        println!("Cleaning up temporary files...");
    }

    // A failed removal must not mask the run's own result
    let scratch_path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        debug!("Failed to remove {:?}: {}", scratch_path, e);
    }

    match result {
        Some(Ok(value)) => Ok(Outcome::Finished(value)),
        Some(Err(e)) => Err(e),
        None => Ok(Outcome::Cancelled),
    }
}
