//! What a single submission asks for

use std::path::PathBuf;

use crate::boinc::CreateWorkOptions;
use crate::errors::SubmitError;

use super::vbox::VboxOption;

/// Command to run in the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobCommand {
    /// Already split into arguments
    Args(Vec<String>),
    /// A single command line, split on whitespace
    Line(String),
}

impl JobCommand {
    /// The individual arguments, before any escaping
    pub fn tokens(&self) -> Vec<String> {
        match self {
            JobCommand::Args(args) => args.clone(),
            JobCommand::Line(line) => line.split_whitespace().map(str::to_string).collect(),
        }
    }
}

impl Default for JobCommand {
    fn default() -> Self {
        JobCommand::Args(Vec::new())
    }
}

/// Per-file deployment hints understood by the BOINC client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFlag {
    Sticky,
    NoDelete,
    /// Server keeps a .gz copy and the client unzips it on download
    Gzip,
}

impl FileFlag {
    /// Tag name used in the input template
    pub fn tag(&self) -> &'static str {
        match self {
            FileFlag::Sticky => "sticky",
            FileFlag::NoDelete => "no_delete",
            FileFlag::Gzip => "gzip",
        }
    }
}

/// Where an input file's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// A file already in the download hierarchy, by physical name
    Staged(String),
    /// Contents generated by this run
    Inline(Vec<u8>),
    /// A file on the submitting host
    Local(PathBuf),
}

/// One input file of the work unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// Name the file is opened as inside the job's slot directory
    pub open_name: String,
    pub source: FileSource,
    pub flags: Vec<FileFlag>,
}

impl InputFile {
    pub fn inline(open_name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            open_name: open_name.into(),
            source: FileSource::Inline(contents.into()),
            flags: Vec::new(),
        }
    }

    pub fn staged(open_name: impl Into<String>, physical_name: impl Into<String>, flags: Vec<FileFlag>) -> Self {
        Self {
            open_name: open_name.into(),
            source: FileSource::Staged(physical_name.into()),
            flags,
        }
    }

    /// Parse `OPEN_NAME=PATH` as given on the command line
    pub fn parse_local(arg: &str) -> Result<Self, SubmitError> {
        match arg.split_once('=') {
            Some((open_name, path)) if !open_name.is_empty() && !path.is_empty() => Ok(Self {
                open_name: open_name.to_string(),
                source: FileSource::Local(PathBuf::from(path)),
                flags: Vec::new(),
            }),
            _ => Err(SubmitError::InvalidInputFile(arg.to_string())),
        }
    }
}

/// Everything needed to turn an image into a work unit
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub image: String,
    pub command: JobCommand,
    pub entrypoint: Option<String>,
    pub prerun: String,
    pub postrun: String,
    /// Memory in MB; estimated from the image size when unset
    pub memory: Option<u64>,
    /// Extra files, placed ahead of everything we generate
    pub input_files: Vec<InputFile>,
    /// Extra vbox_job.xml options
    pub vbox_options: Vec<VboxOption>,
    pub appname: String,
    pub native_unzip: bool,
    pub force_reimport: bool,
    pub sshgrid_mode: bool,
    pub disable_automatic_checkpoints: bool,
    pub create_work: CreateWorkOptions,
}

impl JobRequest {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            command: JobCommand::default(),
            entrypoint: None,
            prerun: String::new(),
            postrun: String::new(),
            memory: None,
            input_files: Vec::new(),
            vbox_options: Vec::new(),
            appname: "boinc2docker".to_string(),
            native_unzip: false,
            force_reimport: false,
            sshgrid_mode: false,
            disable_automatic_checkpoints: true,
            create_work: CreateWorkOptions::default(),
        }
    }
}
