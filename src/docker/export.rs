//! Exporting an image with `docker save`, and reading back a cached export

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

use super::manifest::{ImageManifest, MANIFEST_FILE};
use crate::errors::SubmitError;
use crate::process;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Export `image` and unpack the archive into `dest`, returning its manifest
pub async fn save_image(image: &str, dest: &Path) -> Result<ImageManifest> {
    info!("Exporting '{}' to tar file...", image);

    let archive_path = dest.join(".docker-save.tar");
    process::run(
        Command::new("docker")
            .arg("save")
            .arg("-o")
            .arg(&archive_path)
            .arg(image),
    )
    .await?;

    debug!("Unpacking {:?} into {:?}", archive_path, dest);
    {
        let file = File::open(&archive_path).context("Failed to open exported image")?;
        let mut archive = tar::Archive::new(BufReader::new(file));
        archive
            .unpack(dest)
            .context("Failed to extract tar archive")?;
    }
    std::fs::remove_file(&archive_path).context("Failed to remove exported image archive")?;

    let manifest_path = dest.join(MANIFEST_FILE);
    let data = std::fs::read(&manifest_path)
        .map_err(|_| SubmitError::MissingManifest(dest.to_path_buf()))?;
    ImageManifest::from_slice(&data).context("Failed to parse image manifest")
}

/// Read `manifest.json` out of a previously packaged image file.
///
/// The file may be a plain tar or gzip-compressed; the magic bytes decide.
pub fn read_cached_manifest(path: &Path) -> Result<ImageManifest> {
    info!("Image already imported into BOINC. Reading existing info...");

    let mut file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut magic = [0u8; 2];
    let gzipped = file.read_exact(&mut magic).is_ok() && magic == GZIP_MAGIC;
    file.seek(SeekFrom::Start(0))?;

    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries().context("Failed to read image archive")? {
        let mut entry = entry.context("Failed to read image archive entry")?;
        let is_manifest = entry
            .path()
            .map(|p| p.strip_prefix(".").unwrap_or(&*p) == Path::new(MANIFEST_FILE))
            .unwrap_or(false);
        if is_manifest {
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            return ImageManifest::from_slice(&data).context("Failed to parse image manifest");
        }
    }

    Err(SubmitError::MissingManifest(path.to_path_buf()).into())
}
