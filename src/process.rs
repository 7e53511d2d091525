//! Running external programs and capturing their output

use anyhow::{Context, Result};
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

use crate::errors::SubmitError;

/// Run a command to completion and return its trimmed stdout.
///
/// A non-zero exit becomes [`SubmitError::CommandFailed`] carrying stdout and
/// stderr together, which is what gets shown to the user.
pub async fn run(cmd: &mut Command) -> Result<String> {
    let program = describe(cmd);
    debug!("Running {}", program);

    let output = cmd
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("Failed to run {}", program))?;

    check(&program, output)
}

fn check(program: &str, output: Output) -> Result<String> {
    if !output.status.success() {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(SubmitError::CommandFailed {
            program: program.to_string(),
            output: combined.trim().to_string(),
        }
        .into());
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn describe(cmd: &Command) -> String {
    let std = cmd.as_std();
    std::iter::once(std.get_program())
        .chain(std.get_args())
        .map(|s| s.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
