//! The `boinc_app` script run inside the VM
//!
//! The guest finds the image files in `/root/shared/image`, some of them
//! possibly still gzipped (`*.tar.manual.gz`), reassembles them into a single
//! `docker save` layout, loads it, and runs the container. The script runs
//! under `set -e`, so any failing step ends the job.

/// Quote `s` so that a POSIX shell reads it back as exactly one word.
///
/// Words made only of characters with no special meaning are left as they
/// are; anything else is single-quoted, with embedded single quotes spliced
/// in as `'\''`.
pub fn shell_escape(s: &str) -> String {
    let is_plain = !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ',' | ':' | '@' | '%' | '+' | '=')
        });
    if is_plain {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Inputs to the guest script
#[derive(Debug, Clone, Default)]
pub struct GuestScript<'a> {
    pub image: &'a str,
    pub entrypoint: Option<&'a str>,
    /// Unescaped command arguments
    pub command: &'a [String],
    pub prerun: &'a str,
    pub postrun: &'a str,
    /// sshgrid setup, already rendered
    pub sshgrid: Option<&'a str>,
}

impl GuestScript<'_> {
    /// The `docker run` invocation, every argument escaped on its own
    pub fn run_line(&self) -> String {
        let mut words = vec![
            "docker".to_string(),
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            "/root/shared:/root/shared".to_string(),
        ];
        if let Some(entrypoint) = self.entrypoint {
            words.push("--entrypoint".to_string());
            words.push(shell_escape(entrypoint));
        }
        words.push(shell_escape(self.image));
        words.extend(self.command.iter().map(|arg| shell_escape(arg)));
        words.join(" ")
    }

    pub fn render(&self) -> String {
        let run_line = self.run_line();
        let sshgrid = self.sshgrid.unwrap_or("");
        let prerun = self.prerun;
        let postrun = self.postrun;

        format!(
            r#"#!/bin/sh
set -e

echo "Importing Docker image from BOINC..."
mkdir -p /tmp/image/combined
for f in /root/shared/image/*.tar.manual.gz; do
    if [ -e "$f" ]; then gunzip -c "$f" > /tmp/image/"$(basename "$f" .manual.gz)"; fi
done
set -- $(for f in /root/shared/image/*.tar /tmp/image/*.tar; do if [ -e "$f" ]; then echo "$f"; fi; done)
if [ $# -gt 0 ]; then
    cat "$@" | tar xi -C /tmp/image/combined
    rm -f /tmp/image/*.tar
    tar cf - -C /tmp/image/combined . | docker load
fi
rm -rf /tmp/image

echo "Prerun diagnostics..."
docker images
docker ps -a
du -sh /var/lib/docker
free -m

{sshgrid}

echo "Prerun commands..."
{prerun}

echo "Running... "
{run_line}

echo "Postrun commands..."
{postrun}
"#
        )
    }
}
