//! The metadata `docker save` writes next to the layers
//!
//! `manifest.json` names the config and layers of each image. Exports from
//! newer daemons are also OCI layouts, where `index.json` points at manifest
//! blobs under `blobs/`; those blobs have to travel with the image metadata.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::errors::SubmitError;

/// One entry of the `manifest.json` written by `docker save`.
///
/// Older daemons lay layers out as `<id>/layer.tar`; newer ones write an OCI
/// layout where layers are `blobs/sha256/<id>`. Both are handled here.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ImageManifest {
    #[serde(rename = "Config")]
    pub config: String,
    #[serde(rename = "RepoTags", default)]
    pub repo_tags: Option<Vec<String>>,
    #[serde(rename = "Layers")]
    pub layers: Vec<String>,
}

/// Top-level metadata files that may accompany the manifest in an export
pub const OPTIONAL_METADATA: &[&str] = &["repositories", "index.json", "oci-layout"];

pub const MANIFEST_FILE: &str = "manifest.json";

pub const OCI_INDEX_FILE: &str = "index.json";

/// Content descriptor inside an OCI index
#[derive(Clone, Debug, Deserialize)]
struct Descriptor {
    #[serde(rename = "mediaType", default)]
    media_type: String,
    digest: String,
}

impl Descriptor {
    /// An index (or Docker manifest list) rather than an image manifest
    fn is_index(&self) -> bool {
        self.media_type.contains("image.index") || self.media_type.contains("manifest.list")
    }

    /// `sha256:<hex>` -> `blobs/sha256/<hex>`
    fn blob_entry(&self) -> Option<String> {
        self.digest
            .split_once(':')
            .map(|(algorithm, hex)| format!("blobs/{}/{}", algorithm, hex))
    }
}

#[derive(Clone, Debug, Deserialize)]
struct OciIndex {
    #[serde(default)]
    manifests: Vec<Descriptor>,
}

/// Blob entries under `root` that `index.json` refers to, nested indexes
/// included, in discovery order. Empty when the export is not an OCI layout.
///
/// Descriptors whose blob was not exported (attestations of other platforms,
/// for instance) are skipped.
pub fn index_blobs(root: &Path) -> Result<Vec<String>> {
    let mut blobs: Vec<String> = Vec::new();
    let index_path = root.join(OCI_INDEX_FILE);
    if !index_path.exists() {
        return Ok(blobs);
    }

    let mut pending = vec![index_path];
    while let Some(path) = pending.pop() {
        let data = std::fs::read(&path).with_context(|| format!("Failed to read {:?}", path))?;
        let index: OciIndex = serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse OCI index {:?}", path))?;

        for descriptor in index.manifests {
            let Some(entry) = descriptor.blob_entry() else {
                debug!("Ignoring descriptor with digest {:?}", descriptor.digest);
                continue;
            };
            if blobs.contains(&entry) {
                continue;
            }
            let blob_path = root.join(&entry);
            if !blob_path.is_file() {
                debug!("Blob {} not in export, skipping", entry);
                continue;
            }
            if descriptor.is_index() {
                pending.push(blob_path);
            }
            blobs.push(entry);
        }
    }

    Ok(blobs)
}

/// A layer as it appears inside the exported archive
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layer {
    /// Content id used to name the packaged file
    pub id: String,
    /// Archive entry (directory or blob) holding the layer
    pub entry: String,
}

impl ImageManifest {
    /// Parse a `manifest.json` document and take the first image in it
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let mut manifests: Vec<ImageManifest> = serde_json::from_slice(data)?;
        if manifests.is_empty() {
            return Err(SubmitError::EmptyManifest.into());
        }
        Ok(manifests.swap_remove(0))
    }

    /// Layers in manifest order
    pub fn layers(&self) -> Vec<Layer> {
        self.layers.iter().map(|path| layer_from_path(path)).collect()
    }
}

fn layer_from_path(path: &str) -> Layer {
    let p = Path::new(path);
    let is_legacy = p.file_name().map(|f| f == "layer.tar").unwrap_or(false);

    if is_legacy {
        // <id>/layer.tar: ship the whole <id>/ directory
        let dir = p
            .parent()
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_default();
        Layer {
            id: dir.clone(),
            entry: dir,
        }
    } else {
        // blobs/sha256/<id>
        let id = p
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        Layer {
            id,
            entry: path.to_string(),
        }
    }
}
