//! Handing a finished job to the project's `create_work` tool

use anyhow::Result;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

use crate::process;
use crate::storage::ProjectPaths;

/// Options forwarded to `create_work` as `--<name> <value>`.
///
/// Insertion order is kept; setting a name twice replaces the earlier value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateWorkOptions {
    options: Vec<(String, String)>,
}

impl CreateWorkOptions {
    pub fn set(&mut self, name: &str, value: impl ToString) {
        let value = value.to_string();
        match self.options.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.options.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Flatten into command line arguments
    pub fn to_args(&self) -> Vec<String> {
        self.options
            .iter()
            .flat_map(|(name, value)| [format!("--{}", name), value.clone()])
            .collect()
    }
}

/// A work unit ready for submission
pub struct WorkUnit<'a> {
    pub appname: &'a str,
    pub template: &'a Path,
    pub options: &'a CreateWorkOptions,
    /// Physical input file names, in template order
    pub files: &'a [String],
}

/// Run `bin/create_work` and return what it printed
pub async fn create_work(paths: &ProjectPaths, wu: &WorkUnit<'_>) -> Result<String> {
    info!("Submitting work unit for app '{}'...", wu.appname);
    debug!("Input files: {:?}", wu.files);

    process::run(
        Command::new(paths.tool("create_work"))
            .arg("--appname")
            .arg(wu.appname)
            .arg("--wu_template")
            .arg(wu.template)
            .args(wu.options.to_args())
            .args(wu.files)
            .current_dir(paths.base_dir()),
    )
    .await
}
