//! Docker image lookup and pulling

use anyhow::{Context, Result};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures_util::StreamExt;
use tracing::{debug, info};

use super::reference::pull_target;
use crate::errors::SubmitError;

/// Information about a local Docker image
#[derive(Debug, Clone)]
pub struct ImageInfo {
    /// Normalized reference the image was resolved from
    pub reference: String,
    /// Content id without the `sha256:` prefix
    pub id: String,
    /// Reported size in bytes
    pub size: i64,
}

impl ImageInfo {
    /// Size in megabytes (10^6 bytes), as used by the memory estimate
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / 1e6
    }

    /// First 12 characters of the id, for log lines
    pub fn short_id(&self) -> &str {
        &self.id[..12.min(self.id.len())]
    }
}

/// Connect to the local Docker daemon
pub fn connect() -> Result<Docker> {
    Docker::connect_with_local_defaults().context("Failed to connect to Docker daemon")
}

/// Look up a (normalized) image, pulling it once if the daemon doesn't have it
pub async fn resolve_image(docker: &Docker, image: &str) -> Result<ImageInfo> {
    match inspect_image(docker, image).await {
        Err(e) if matches!(e.downcast_ref::<SubmitError>(), Some(SubmitError::ImageNotFound(_))) => {
            info!("Pulling '{}'...", image);
            pull_image(docker, image).await?;
            inspect_image(docker, image).await
        }
        other => other,
    }
}

async fn inspect_image(docker: &Docker, image: &str) -> Result<ImageInfo> {
    let inspect = match docker.inspect_image(image).await {
        Ok(inspect) => inspect,
        Err(DockerError::DockerResponseServerError { status_code: 404, .. }) => {
            return Err(SubmitError::ImageNotFound(image.to_string()).into());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to inspect image {}", image)),
    };

    let id = inspect
        .id
        .with_context(|| format!("Docker returned no id for {}", image))?;

    let info = ImageInfo {
        reference: image.to_string(),
        id: strip_digest_algorithm(&id).to_string(),
        size: inspect.size.unwrap_or(0),
    };
    debug!("Image {} has id {} and size {}", image, info.id, info.size);
    Ok(info)
}

/// Pull an image from its registry, logging progress at debug level
async fn pull_image(docker: &Docker, image: &str) -> Result<()> {
    let (repo, tag) = pull_target(image);
    let options = CreateImageOptions {
        from_image: repo,
        tag,
        ..Default::default()
    };

    let mut stream = docker.create_image(Some(options), None, None);

    while let Some(result) = stream.next().await {
        match result {
            Ok(info) => {
                if let Some(status) = info.status {
                    if let Some(progress) = info.progress {
                        debug!("{}: {}", status, progress);
                    } else {
                        debug!("{}", status);
                    }
                }
            }
            Err(e) => {
                return Err(anyhow::anyhow!("Failed to pull image {}: {}", image, e));
            }
        }
    }

    Ok(())
}

/// `sha256:abcd...` -> `abcd...`
pub fn strip_digest_algorithm(id: &str) -> &str {
    id.split_once(':').map(|(_, hex)| hex).unwrap_or(id)
}
