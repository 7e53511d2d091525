//! boinc2docker - run Docker containers as BOINC work units
//!
//! This tool exports a Docker image into per-layer input files, generates the
//! VirtualBox job descriptor and in-guest launch script, and submits the job
//! through the BOINC project's create_work tool.

mod boinc;
mod cli;
mod docker;
mod errors;
mod job;
mod process;
mod scratch;
mod sshgrid;
mod storage;
mod submit;

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cli::Cli;
use errors::SubmitError;
use scratch::Outcome;
use storage::{KeyStore, ProjectPaths};
use submit::Environment;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .init();

    match run(&cli).await {
        Ok(Outcome::Finished(wu)) => {
            println!("{}", wu);
            ExitCode::SUCCESS
        }
        Ok(Outcome::Cancelled) => ExitCode::from(130),
        Err(e) => match e.downcast_ref::<SubmitError>().and_then(SubmitError::command_output) {
            // External tool failed: its own output says why
            Some(output) => {
                eprintln!("{}", output);
                ExitCode::FAILURE
            }
            None => {
                eprintln!("Error: {:?}", e);
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(cli: &Cli) -> Result<Outcome<String>> {
    let request = cli.job_request()?;
    let paths = ProjectPaths::new(&cli.project_dir)?;
    let key_store = if request.sshgrid_mode {
        Some(KeyStore::open(&cli.sshgrid_db)?)
    } else {
        None
    };

    scratch::with_scratch(
        |scratch| async move {
            let env = Environment {
                paths: &paths,
                key_store: key_store.as_ref(),
                scratch: &scratch,
            };
            submit::create_work(&request, &env).await
        },
        tokio::signal::ctrl_c(),
    )
    .await
}
