//! Docker image handling module
//!
//! This module resolves image references against the local daemon, pulls
//! missing images, and exports images into their layer files.

pub mod export;
mod image;
pub mod manifest;
pub mod reference;

pub use export::{read_cached_manifest, save_image};
pub use image::{connect, resolve_image, ImageInfo};
pub use manifest::{ImageManifest, Layer};
pub use reference::normalize_reference;
