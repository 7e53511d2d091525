//! Turning an exported image into download-hierarchy input files
//!
//! Every layer becomes its own file so that images sharing layers share
//! downloads. Files are named by content id and marked sticky, so a client
//! that already has a layer from an earlier job does not fetch it again.

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::request::{FileFlag, InputFile};
use crate::boinc::DownloadHierarchy;
use crate::docker::manifest::{index_blobs, ImageManifest, Layer, MANIFEST_FILE, OPTIONAL_METADATA};

/// Suffix for files the guest gunzips itself
pub const MANUAL_GZ_SUFFIX: &str = ".manual.gz";

/// Directory inside the shared folder that holds image files
pub const GUEST_IMAGE_DIR: &str = "shared/image";

/// How packaged files are compressed for delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// `.tar` registered with the `gzip` flag; the BOINC client unzips
    Native,
    /// `.tar.manual.gz`; the guest unzips. Avoids a client bug with
    /// gzip-flagged sticky files.
    Manual,
}

impl Delivery {
    pub fn from_native_unzip(native_unzip: bool) -> Self {
        if native_unzip {
            Delivery::Native
        } else {
            Delivery::Manual
        }
    }

    /// Physical file name for a tar named `tar_name`
    pub fn filename(&self, tar_name: &str) -> String {
        match self {
            Delivery::Native => tar_name.to_string(),
            Delivery::Manual => format!("{}{}", tar_name, MANUAL_GZ_SUFFIX),
        }
    }

    /// Flags every image file carries
    pub fn flags(&self) -> Vec<FileFlag> {
        let mut flags = vec![FileFlag::Sticky, FileFlag::NoDelete];
        if *self == Delivery::Native {
            flags.push(FileFlag::Gzip);
        }
        flags
    }
}

pub fn image_tar_name(image_id: &str) -> String {
    format!("image_{}.tar", image_id)
}

pub fn layer_tar_name(layer_id: &str) -> String {
    format!("layer_{}.tar", layer_id)
}

/// Writes image and layer files into the download hierarchy
pub struct Packager<'a> {
    pub hierarchy: &'a DownloadHierarchy<'a>,
    /// Where the image was unpacked by `docker save`
    pub scratch: &'a Path,
    pub delivery: Delivery,
    pub force_reimport: bool,
    /// The image was freshly exported this run
    pub extracted: bool,
}

impl Packager<'_> {
    /// Input file for one layer, building it when needed
    pub async fn layer(&self, layer: &Layer) -> Result<InputFile> {
        let filename = self.delivery.filename(&layer_tar_name(&layer.id));
        let path = self.hierarchy.path(&filename).await?;

        if self.force_reimport || (self.extracted && !path.exists()) {
            info!("Creating input file for layer {}...", short(&layer.id));
            self.build(&path, &layer_tar_name(&layer.id), &[layer.entry.as_str()])?;
        } else {
            debug!("Layer {} already in download hierarchy", short(&layer.id));
        }

        Ok(self.input_file(filename))
    }

    /// Input file for the image metadata (manifest, config, tags)
    pub async fn image(&self, image_id: &str, manifest: &ImageManifest) -> Result<InputFile> {
        let filename = self.delivery.filename(&image_tar_name(image_id));
        let path = self.hierarchy.path(&filename).await?;

        if self.force_reimport || self.extracted {
            info!("Creating input file for image {}...", short(image_id));
            let mut entries = vec![MANIFEST_FILE.to_string(), manifest.config.clone()];
            entries.extend(
                OPTIONAL_METADATA
                    .iter()
                    .filter(|name| self.scratch.join(name).exists())
                    .map(|name| name.to_string()),
            );
            for blob in index_blobs(self.scratch)? {
                if !entries.contains(&blob) {
                    entries.push(blob);
                }
            }
            let entries: Vec<&str> = entries.iter().map(String::as_str).collect();
            self.build(&path, &image_tar_name(image_id), &entries)?;
        }

        Ok(self.input_file(filename))
    }

    fn input_file(&self, filename: String) -> InputFile {
        InputFile::staged(
            format!("{}/{}", GUEST_IMAGE_DIR, filename),
            filename,
            self.delivery.flags(),
        )
    }

    /// Archive `entries` from the scratch directory next to `target`
    fn build(&self, target: &Path, tar_name: &str, entries: &[&str]) -> Result<()> {
        let dir = target
            .parent()
            .with_context(|| format!("{:?} has no parent directory", target))?;
        let tar_path = dir.join(tar_name);

        write_tar(self.scratch, entries, &tar_path)?;

        match self.delivery {
            Delivery::Native => {
                // Keep the tar; the server hands out the .gz alongside it
                let gz_path = append_suffix(&tar_path, ".gz");
                gzip(&tar_path, &gz_path)?;
            }
            Delivery::Manual => {
                gzip(&tar_path, target)?;
                std::fs::remove_file(&tar_path)
                    .with_context(|| format!("Failed to remove {:?}", tar_path))?;
            }
        }
        Ok(())
    }
}

fn write_tar(base: &Path, entries: &[&str], dest: &Path) -> Result<()> {
    let file = File::create(dest).with_context(|| format!("Failed to create {:?}", dest))?;
    let mut builder = tar::Builder::new(BufWriter::new(file));

    for entry in entries {
        let src = base.join(entry);
        if src.is_dir() {
            builder
                .append_dir_all(entry, &src)
                .with_context(|| format!("Failed to archive {:?}", src))?;
        } else {
            builder
                .append_path_with_name(&src, entry)
                .with_context(|| format!("Failed to archive {:?}", src))?;
        }
    }

    builder
        .into_inner()
        .context("Failed to finish tar archive")?
        .into_inner()
        .map_err(|e| e.into_error())
        .context("Failed to flush tar archive")?;
    debug!("Wrote {:?}", dest);
    Ok(())
}

fn gzip(src: &Path, dest: &Path) -> Result<()> {
    let mut input = BufReader::new(File::open(src).with_context(|| format!("Failed to open {:?}", src))?);
    let output = File::create(dest).with_context(|| format!("Failed to create {:?}", dest))?;
    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
    std::io::copy(&mut input, &mut encoder).with_context(|| format!("Failed to compress {:?}", src))?;
    encoder
        .finish()
        .context("Failed to finish gzip stream")?
        .into_inner()
        .map_err(|e| e.into_error())
        .context("Failed to flush gzip stream")?;
    debug!("Compressed {:?} -> {:?}", src, dest);
    Ok(())
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

fn short(id: &str) -> &str {
    &id[..12.min(id.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boinc::hierarchy::tests::fake_project;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    const LAYER_ID: &str = "aaaabbbbccccddddeeee";

    /// A scratch dir shaped like a legacy `docker save`
    fn exported_image() -> (TempDir, ImageManifest) {
        let scratch = TempDir::new().unwrap();
        let layer_dir = scratch.path().join(LAYER_ID);
        std::fs::create_dir_all(&layer_dir).unwrap();
        std::fs::write(layer_dir.join("layer.tar"), b"layer bytes").unwrap();
        std::fs::write(layer_dir.join("VERSION"), b"1.0").unwrap();
        std::fs::write(scratch.path().join("cfg.json"), b"{}").unwrap();
        std::fs::write(scratch.path().join("repositories"), b"{}").unwrap();
        let manifest_json = format!(
            r#"[{{"Config":"cfg.json","RepoTags":["alpine:latest"],"Layers":["{}/layer.tar"]}}]"#,
            LAYER_ID
        );
        std::fs::write(scratch.path().join("manifest.json"), &manifest_json).unwrap();
        let manifest = ImageManifest::from_slice(manifest_json.as_bytes()).unwrap();
        (scratch, manifest)
    }

    fn entry_names<R: Read>(reader: R) -> Vec<String> {
        let mut archive = tar::Archive::new(reader);
        let mut names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().trim_end_matches('/').to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_delivery_names_and_flags() {
        assert_eq!(Delivery::Manual.filename("layer_x.tar"), "layer_x.tar.manual.gz");
        assert_eq!(Delivery::Native.filename("layer_x.tar"), "layer_x.tar");
        assert_eq!(Delivery::Manual.flags(), vec![FileFlag::Sticky, FileFlag::NoDelete]);
        assert_eq!(
            Delivery::Native.flags(),
            vec![FileFlag::Sticky, FileFlag::NoDelete, FileFlag::Gzip]
        );
    }

    #[tokio::test]
    async fn test_manual_layer_is_gzipped_and_tar_removed() {
        let (_project, paths) = fake_project();
        let hierarchy = DownloadHierarchy::new(&paths);
        let (scratch, manifest) = exported_image();
        let packager = Packager {
            hierarchy: &hierarchy,
            scratch: scratch.path(),
            delivery: Delivery::Manual,
            force_reimport: false,
            extracted: true,
        };

        let file = packager.layer(&manifest.layers()[0]).await.unwrap();
        let filename = format!("layer_{}.tar.manual.gz", LAYER_ID);
        assert_eq!(file.open_name, format!("shared/image/{}", filename));
        assert_eq!(file.flags, vec![FileFlag::Sticky, FileFlag::NoDelete]);

        let path = hierarchy.path(&filename).await.unwrap();
        assert!(path.exists());
        assert!(!path.with_file_name(format!("layer_{}.tar", LAYER_ID)).exists());

        let names = entry_names(GzDecoder::new(File::open(&path).unwrap()));
        assert_eq!(
            names,
            vec![
                LAYER_ID.to_string(),
                format!("{}/VERSION", LAYER_ID),
                format!("{}/layer.tar", LAYER_ID),
            ]
        );
    }

    #[tokio::test]
    async fn test_native_keeps_tar_and_gz() {
        let (_project, paths) = fake_project();
        let hierarchy = DownloadHierarchy::new(&paths);
        let (scratch, manifest) = exported_image();
        let packager = Packager {
            hierarchy: &hierarchy,
            scratch: scratch.path(),
            delivery: Delivery::Native,
            force_reimport: false,
            extracted: true,
        };

        let file = packager.image("feedface", &manifest).await.unwrap();
        assert_eq!(file.open_name, "shared/image/image_feedface.tar");
        assert!(file.flags.contains(&FileFlag::Gzip));

        let path = hierarchy.path("image_feedface.tar").await.unwrap();
        assert!(path.exists());
        assert!(append_suffix(&path, ".gz").exists());
        assert_eq!(
            entry_names(File::open(&path).unwrap()),
            vec!["cfg.json", "manifest.json", "repositories"]
        );
    }

    #[tokio::test]
    async fn test_existing_layer_not_rebuilt() {
        let (_project, paths) = fake_project();
        let hierarchy = DownloadHierarchy::new(&paths);
        let (scratch, manifest) = exported_image();
        let filename = format!("layer_{}.tar.manual.gz", LAYER_ID);
        let path = hierarchy.path(&filename).await.unwrap();
        std::fs::write(&path, b"previous import").unwrap();

        let packager = Packager {
            hierarchy: &hierarchy,
            scratch: scratch.path(),
            delivery: Delivery::Manual,
            force_reimport: false,
            extracted: true,
        };
        packager.layer(&manifest.layers()[0]).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"previous import");

        // Unless a reimport is forced
        let forced = Packager {
            force_reimport: true,
            ..packager
        };
        forced.layer(&manifest.layers()[0]).await.unwrap();
        assert_ne!(std::fs::read(&path).unwrap(), b"previous import");
    }

    #[tokio::test]
    async fn test_oci_image_carries_index_blobs() {
        let (_project, paths) = fake_project();
        let hierarchy = DownloadHierarchy::new(&paths);
        let scratch = TempDir::new().unwrap();
        let blobs = scratch.path().join("blobs/sha256");
        std::fs::create_dir_all(&blobs).unwrap();
        std::fs::write(blobs.join("cfg"), b"{}").unwrap();
        std::fs::write(blobs.join("lay"), b"layer bytes").unwrap();
        std::fs::write(blobs.join("man"), b"{}").unwrap();
        std::fs::write(scratch.path().join("oci-layout"), br#"{"imageLayoutVersion":"1.0.0"}"#).unwrap();
        std::fs::write(
            scratch.path().join("index.json"),
            br#"{"schemaVersion":2,"manifests":[{"mediaType":"application/vnd.oci.image.manifest.v1+json","digest":"sha256:man"}]}"#,
        )
        .unwrap();
        let manifest_json = r#"[{"Config":"blobs/sha256/cfg","RepoTags":["alpine:latest"],"Layers":["blobs/sha256/lay"]}]"#;
        std::fs::write(scratch.path().join("manifest.json"), manifest_json).unwrap();
        let manifest = ImageManifest::from_slice(manifest_json.as_bytes()).unwrap();

        let packager = Packager {
            hierarchy: &hierarchy,
            scratch: scratch.path(),
            delivery: Delivery::Native,
            force_reimport: false,
            extracted: true,
        };
        packager.image("feedface", &manifest).await.unwrap();

        let path = hierarchy.path("image_feedface.tar").await.unwrap();
        assert_eq!(
            entry_names(File::open(&path).unwrap()),
            vec![
                "blobs/sha256/cfg",
                "blobs/sha256/man",
                "index.json",
                "manifest.json",
                "oci-layout",
            ]
        );
    }

    #[tokio::test]
    async fn test_cached_image_not_rebuilt() {
        let (_project, paths) = fake_project();
        let hierarchy = DownloadHierarchy::new(&paths);
        let (scratch, manifest) = exported_image();
        let packager = Packager {
            hierarchy: &hierarchy,
            scratch: scratch.path(),
            delivery: Delivery::Manual,
            force_reimport: false,
            extracted: false,
        };

        let file = packager.image("feedface", &manifest).await.unwrap();
        assert_eq!(file.open_name, "shared/image/image_feedface.tar.manual.gz");
        let path = hierarchy.path("image_feedface.tar.manual.gz").await.unwrap();
        assert!(!path.exists());
    }
}
