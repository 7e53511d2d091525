//! CLI interface module

use clap::{Args, Parser};
use std::path::PathBuf;

use crate::boinc::CreateWorkOptions;
use crate::errors::SubmitError;
use crate::job::{InputFile, JobCommand, JobRequest, VboxOption};
use crate::storage::DEFAULT_KEY_DB;

#[derive(Parser, Debug)]
#[command(name = "boinc2docker_create_work")]
#[command(about = "Submit a Docker image and command as a BOINC work unit")]
#[command(version)]
pub struct Cli {
    /// Docker image to run
    #[arg(value_name = "IMAGE")]
    pub image: String,

    /// Command to run
    #[arg(value_name = "COMMAND", trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Overwrite the default ENTRYPOINT of the image
    #[arg(long)]
    pub entrypoint: Option<String>,

    /// Shell commands to run in the VM before the container
    #[arg(long)]
    pub prerun: Option<String>,

    /// Shell commands to run in the VM after the container
    #[arg(long)]
    pub postrun: Option<String>,

    /// Extra input file for the job, as OPEN_NAME=PATH (repeatable)
    #[arg(long = "input-file", value_name = "OPEN_NAME=PATH")]
    pub input_files: Vec<String>,

    /// Extra vbox_job.xml option, as NAME or NAME=VALUE (repeatable)
    #[arg(long = "vbox-option", value_name = "NAME[=VALUE]")]
    pub vbox_options: Vec<String>,

    /// appname for which to submit job
    #[arg(long, default_value = "boinc2docker")]
    pub appname: String,

    /// Memory in MB needed by this job (default: minimum needed to load the image)
    #[arg(long)]
    pub memory: Option<u64>,

    /// Let the BOINC client unzip image files (may cause the job to fail, pending a client bug fix)
    #[arg(long, alias = "native_unzip")]
    pub native_unzip: bool,

    /// Leave VirtualBox's automatic checkpoints on
    #[arg(long)]
    pub enable_automatic_checkpoints: bool,

    /// Don't print a lot of messages
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Force reimporting the image from Docker (might fix a corrupt previous import)
    #[arg(long, alias = "force_reimport")]
    pub force_reimport: bool,

    /// Run with sshgrid mode enabled
    #[arg(long, alias = "sshgrid_mode")]
    pub sshgrid_mode: bool,

    /// BOINC project directory
    #[arg(long, env = "BOINC_PROJECT_DIR", default_value = ".")]
    pub project_dir: PathBuf,

    /// sshgrid key database
    #[arg(long, default_value = DEFAULT_KEY_DB)]
    pub sshgrid_db: PathBuf,

    #[command(flatten)]
    pub create_work: CreateWorkArgs,
}

/// Options passed through to BOINC's create_work
#[derive(Args, Debug, Default)]
#[command(next_help_heading = "create_work options")]
pub struct CreateWorkArgs {
    #[arg(long, alias = "wu_name")]
    pub wu_name: Option<String>,
    #[arg(long)]
    pub batch: Option<i64>,
    #[arg(long)]
    pub priority: Option<i64>,
    #[arg(long, alias = "command_line")]
    pub command_line: Option<String>,
    #[arg(long, alias = "result_template")]
    pub result_template: Option<String>,
    #[arg(long, alias = "target_nresults")]
    pub target_nresults: Option<u32>,
    #[arg(long, alias = "min_quorum")]
    pub min_quorum: Option<u32>,
    #[arg(long, alias = "max_error_results")]
    pub max_error_results: Option<u32>,
    #[arg(long, alias = "max_total_results")]
    pub max_total_results: Option<u32>,
    #[arg(long, alias = "max_success_results")]
    pub max_success_results: Option<u32>,
    /// Seconds
    #[arg(long, alias = "delay_bound")]
    pub delay_bound: Option<u64>,
    #[arg(long, alias = "rsc_fpops_est")]
    pub rsc_fpops_est: Option<f64>,
    #[arg(long, alias = "rsc_fpops_bound")]
    pub rsc_fpops_bound: Option<f64>,
    /// Bytes
    #[arg(long, alias = "rsc_disk_bound")]
    pub rsc_disk_bound: Option<f64>,
    #[arg(long, alias = "hr_class")]
    pub hr_class: Option<u32>,
    #[arg(long, alias = "size_class")]
    pub size_class: Option<u32>,
    #[arg(long, alias = "target_host")]
    pub target_host: Option<u64>,
    #[arg(long, alias = "target_user")]
    pub target_user: Option<u64>,
    #[arg(long, alias = "target_team")]
    pub target_team: Option<u64>,
}

impl CreateWorkArgs {
    /// The options that were actually given, under create_work's names
    pub fn to_options(&self) -> CreateWorkOptions {
        let mut opts = CreateWorkOptions::default();
        let mut set = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                opts.set(name, value);
            }
        };

        set("wu_name", self.wu_name.clone());
        set("batch", self.batch.map(|v| v.to_string()));
        set("priority", self.priority.map(|v| v.to_string()));
        set("command_line", self.command_line.clone());
        set("result_template", self.result_template.clone());
        set("target_nresults", self.target_nresults.map(|v| v.to_string()));
        set("min_quorum", self.min_quorum.map(|v| v.to_string()));
        set("max_error_results", self.max_error_results.map(|v| v.to_string()));
        set("max_total_results", self.max_total_results.map(|v| v.to_string()));
        set("max_success_results", self.max_success_results.map(|v| v.to_string()));
        set("delay_bound", self.delay_bound.map(|v| v.to_string()));
        set("rsc_fpops_est", self.rsc_fpops_est.map(|v| v.to_string()));
        set("rsc_fpops_bound", self.rsc_fpops_bound.map(|v| v.to_string()));
        set("rsc_disk_bound", self.rsc_disk_bound.map(|v| v.to_string()));
        set("hr_class", self.hr_class.map(|v| v.to_string()));
        set("size_class", self.size_class.map(|v| v.to_string()));
        set("target_host", self.target_host.map(|v| v.to_string()));
        set("target_user", self.target_user.map(|v| v.to_string()));
        set("target_team", self.target_team.map(|v| v.to_string()));
        opts
    }
}

impl Cli {
    /// Build the job request described by the command line
    pub fn job_request(&self) -> Result<JobRequest, SubmitError> {
        let mut request = JobRequest::new(&self.image);
        request.command = JobCommand::Args(self.command.clone());
        request.entrypoint = self.entrypoint.clone();
        request.prerun = self.prerun.clone().unwrap_or_default();
        request.postrun = self.postrun.clone().unwrap_or_default();
        request.memory = self.memory;
        request.appname = self.appname.clone();
        request.native_unzip = self.native_unzip;
        request.force_reimport = self.force_reimport;
        request.sshgrid_mode = self.sshgrid_mode;
        request.disable_automatic_checkpoints = !self.enable_automatic_checkpoints;
        request.input_files = self
            .input_files
            .iter()
            .map(|arg| InputFile::parse_local(arg))
            .collect::<Result<_, _>>()?;
        request.vbox_options = self
            .vbox_options
            .iter()
            .map(|arg| VboxOption::parse(arg))
            .collect::<Result<_, _>>()?;
        request.create_work = self.create_work.to_options();
        Ok(request)
    }
}
