//! Path management for the BOINC project directory

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static MASTER_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<master_url>\s*([^<\s]+)\s*</master_url>").expect("valid regex"));

/// Locates the pieces of a BOINC project we read from or hand work to
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    base_dir: PathBuf,
}

impl ProjectPaths {
    /// Create a new ProjectPaths rooted at the project directory
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let base_dir = std::fs::canonicalize(&base_dir)
            .with_context(|| format!("BOINC project directory {:?} not found", base_dir))?;
        Ok(Self { base_dir })
    }

    /// Get the project directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get the project's bin directory (create_work, dir_hier_path, ...)
    pub fn bin_dir(&self) -> PathBuf {
        self.base_dir.join("bin")
    }

    /// Get the path to a project tool in bin/
    pub fn tool(&self, name: &str) -> PathBuf {
        self.bin_dir().join(name)
    }

    /// Get the project's config.xml
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.xml")
    }

    /// Read `<master_url>` from config.xml
    pub fn master_url(&self) -> Result<String> {
        let config = std::fs::read_to_string(self.config_file())
            .context("Failed to read project config.xml")?;
        MASTER_URL
            .captures(&config)
            .map(|c| c[1].to_string())
            .context("config.xml has no <master_url>")
    }

    /// Host name of the project server, from its master URL
    pub fn server_hostname(&self) -> Result<String> {
        let master_url = self.master_url()?;
        let url = url::Url::parse(&master_url)
            .with_context(|| format!("Invalid master_url {:?}", master_url))?;
        url.host_str()
            .map(str::to_string)
            .with_context(|| format!("master_url {:?} has no host", master_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project_with_config(config: &str) -> (TempDir, ProjectPaths) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.xml"), config).unwrap();
        let paths = ProjectPaths::new(dir.path()).unwrap();
        (dir, paths)
    }

    #[test]
    fn test_server_hostname() {
        let (_dir, paths) = project_with_config(
            "<boinc>\n  <config>\n    <master_url> https://grid.example.org/myproj/ </master_url>\n  </config>\n</boinc>\n",
        );
        assert_eq!(paths.master_url().unwrap(), "https://grid.example.org/myproj/");
        assert_eq!(paths.server_hostname().unwrap(), "grid.example.org");
    }

    #[test]
    fn test_missing_master_url() {
        let (_dir, paths) = project_with_config("<boinc><config></config></boinc>");
        assert!(paths.master_url().is_err());
    }

    #[test]
    fn test_tool_paths() {
        let (dir, paths) = project_with_config("");
        let base = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(paths.tool("create_work"), base.join("bin/create_work"));
    }

    #[test]
    fn test_missing_project_dir() {
        assert!(ProjectPaths::new("/nonexistent/boinc/project").is_err());
    }
}
