//! VM memory sizing

use tracing::{info, warn};

/// Fixed headroom for the guest OS and Docker daemon, in MB
pub const MEMORY_OVERHEAD_MB: f64 = 500.0;

/// `docker load` holds roughly this many copies of the image in memory
/// while importing (plus one when the guest has to gunzip layers).
pub const IMAGE_SIZE_FACTOR: f64 = 4.0;

/// Memory needed to load an image of `image_size_mb`, unrounded
fn required_mb(image_size_mb: f64) -> f64 {
    IMAGE_SIZE_FACTOR * image_size_mb + MEMORY_OVERHEAD_MB
}

/// Smallest allocation that can load an image of `image_size_mb`
pub fn minimum_memory_mb(image_size_mb: f64) -> u64 {
    required_mb(image_size_mb) as u64
}

/// Whether `memory` falls short of what the image needs. Compared before
/// rounding, so an allocation equal to the truncated minimum still counts
/// as short when the real minimum is fractional.
pub fn below_minimum(image_size_mb: f64, memory: u64) -> bool {
    (memory as f64) < required_mb(image_size_mb)
}

/// Pick the VM memory size in MB.
///
/// An explicit request is always honoured, even when it is below what the
/// image needs; in that case only a warning is emitted.
pub fn memory_check(image_size_mb: f64, memory: Option<u64>) -> u64 {
    let need = minimum_memory_mb(image_size_mb);

    match memory {
        None => {
            info!("Automatically setting memory allocation for job to {}MB.", need);
            need
        }
        Some(memory) if below_minimum(image_size_mb, memory) => {
            warn!(
                "You allocated {}MB of memory for this job which is less than the predicted minimum needed of {}MB; job may fail.",
                memory, need
            );
            memory
        }
        Some(memory) => memory,
    }
}
