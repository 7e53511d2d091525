//! Error types you might see while building or submitting a work unit

use thiserror::Error;

/// Errors with a distinct meaning to the submission flow
#[derive(Error, Debug)]
pub enum SubmitError {
    /// an external program exited unsuccessfully
    #[error("{program} failed:\n{output}")]
    CommandFailed { program: String, output: String },

    /// the image is not present in the local Docker daemon
    #[error("no such image: {0}")]
    ImageNotFound(String),

    /// the exported image did not contain a manifest.json
    #[error("image archive at {0:?} has no manifest.json")]
    MissingManifest(std::path::PathBuf),

    /// manifest.json parsed but listed no images
    #[error("image manifest is empty")]
    EmptyManifest,

    /// malformed --input-file argument
    #[error("invalid input file {0:?}, expected OPEN_NAME=PATH")]
    InvalidInputFile(String),

    /// malformed --vbox-option argument
    #[error("invalid vbox_job.xml option {0:?}")]
    InvalidVboxOption(String),
}

impl SubmitError {
    /// Output captured from a failed external command, if that is what this is
    pub fn command_output(&self) -> Option<&str> {
        match self {
            SubmitError::CommandFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}
