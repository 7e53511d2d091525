//! Placing files in the project's download hierarchy

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

use crate::process;
use crate::storage::ProjectPaths;

/// The project's download directory, as laid out by `bin/dir_hier_path`
pub struct DownloadHierarchy<'a> {
    paths: &'a ProjectPaths,
}

impl<'a> DownloadHierarchy<'a> {
    pub fn new(paths: &'a ProjectPaths) -> Self {
        Self { paths }
    }

    /// Full path `filename` lives at in the download hierarchy.
    ///
    /// The fanout directory is created by the tool if it does not exist yet.
    pub async fn path(&self, filename: &str) -> Result<PathBuf> {
        let out = process::run(
            Command::new(self.paths.tool("dir_hier_path"))
                .arg(filename)
                .current_dir(self.paths.base_dir()),
        )
        .await?;
        let path = PathBuf::from(out.lines().last().unwrap_or_default().trim());
        debug!("{} -> {:?}", filename, path);
        Ok(path)
    }

    /// Stage generated contents and return their physical file name.
    ///
    /// Files are named after a hash of their contents, so identical
    /// contents are written once and shared.
    pub async fn stage(&self, contents: &[u8]) -> Result<String> {
        let name = staged_name(contents);
        let path = self.path(&name).await?;

        if path.exists() {
            debug!("{} already staged", name);
        } else {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
            tokio::fs::write(&path, contents)
                .await
                .with_context(|| format!("Failed to write {:?}", path))?;
        }
        Ok(name)
    }
}

/// `jf_<sha256 of contents>`
pub fn staged_name(contents: &[u8]) -> String {
    format!("jf_{}", hex::encode(Sha256::digest(contents)))
}
