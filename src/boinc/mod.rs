//! BOINC project integration
//!
//! Everything that touches the project server: where files go in the
//! download hierarchy, the input template, and the `create_work` tool.

mod create_work;
pub mod hierarchy;
pub mod template;

pub use create_work::{create_work, CreateWorkOptions, WorkUnit};
pub use hierarchy::DownloadHierarchy;
pub use template::{escape_xml, render_input_template};
