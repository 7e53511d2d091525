//! Job construction
//!
//! This module turns a [`JobRequest`] into the artifacts a work unit needs:
//! the VM descriptor, the guest script, and the packaged image files.

pub mod memory;
pub mod package;
mod request;
pub mod script;
pub mod vbox;

pub use memory::memory_check;
pub use package::{Delivery, Packager};
pub use request::{FileFlag, FileSource, InputFile, JobCommand, JobRequest};
pub use script::GuestScript;
pub use vbox::VboxOption;
