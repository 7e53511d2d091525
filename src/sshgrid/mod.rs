//! sshgrid mode
//!
//! The guest opens a reverse SSH tunnel back to the project server, which
//! can then log into the running VM. The client authenticates to the server
//! with a fresh keypair; the server logs in with a second keypair whose
//! public half is installed as the guest's `authorized_keys`. Both private
//! halves are kept in the key store.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

use crate::boinc::CreateWorkOptions;
use crate::job::InputFile;
use crate::process;
use crate::storage::{KeyRecord, KeyStore, ProjectPaths};

/// Port the server's tunnel endpoint listens on
pub const TUNNEL_PORT: u16 = 422;

/// An RSA keypair as produced by ssh-keygen
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public: String,
    pub private: String,
}

/// Everything sshgrid adds to a job
#[derive(Debug)]
pub struct SshgridSession {
    pub client_username: String,
    /// Guest script snippet, run before the prerun commands
    pub script: String,
    /// Key files for the guest's shared directory
    pub input_files: Vec<InputFile>,
}

/// Generate keys, record them in `store`, and build the guest-side pieces
pub async fn configure(
    paths: &ProjectPaths,
    store: &KeyStore,
    scratch: &Path,
) -> Result<SshgridSession> {
    info!("Configuring sshgrid job...");

    let server = paths.server_hostname()?;
    let client_username = format!("sshgrid-{}", Uuid::new_v4());

    let client = ssh_keygen(scratch, "client_id_rsa").await?;
    let server_keys = ssh_keygen(scratch, "server_id_rsa").await?;

    store.insert(&KeyRecord::new(
        client.private.clone(),
        client_username.clone(),
        server_keys.private.clone(),
    ))?;
    debug!("Stored keys for {}", client_username);

    Ok(SshgridSession {
        script: guest_script(&server, &client_username),
        input_files: vec![
            InputFile::inline("shared/id_rsa", client.private),
            InputFile::inline("shared/id_rsa.pub", client.public),
            InputFile::inline("shared/authorized_keys", server_keys.public),
        ],
        client_username,
    })
}

/// A tunnel session can't be shared between replicas, so exactly one
/// result is ever created.
pub fn force_single_result(options: &mut CreateWorkOptions) {
    for name in [
        "max_total_results",
        "max_success_results",
        "max_error_results",
        "target_nresults",
    ] {
        options.set(name, 1);
    }
}

/// Run ssh-keygen in `dir` and read back the pair
pub async fn ssh_keygen(dir: &Path, name: &str) -> Result<KeyPair> {
    let key_path = dir.join(name);
    process::run(
        Command::new("ssh-keygen")
            .args(["-q", "-C", "sshgrid", "-t", "rsa", "-b", "4096", "-N", ""])
            .arg("-f")
            .arg(&key_path),
    )
    .await?;

    let private = tokio::fs::read_to_string(&key_path)
        .await
        .with_context(|| format!("Failed to read {:?}", key_path))?;
    let public_path = key_path.with_extension("pub");
    let public = tokio::fs::read_to_string(&public_path)
        .await
        .with_context(|| format!("Failed to read {:?}", public_path))?;

    Ok(KeyPair {
        public: public.trim().to_string(),
        private: private.trim().to_string(),
    })
}

/// Shell snippet that brings up sshd and the reverse tunnel in the guest
pub fn guest_script(server: &str, client_username: &str) -> String {
    format!(
        r#"echo "Starting SSH server..."
/etc/rc.d/sshd

echo 10.0.2.2 {server} >> /etc/hosts # for debugging on local machine

echo "Reverse tunneling to server..."
mkdir -p /root/.ssh
cp /root/shared/id_rsa /root/shared/id_rsa.pub /root/shared/authorized_keys /root/.ssh
chmod 600 /root/.ssh/id_rsa
ssh -o StrictHostKeyChecking=no -p {port} -NTR 0:localhost:22 {client_username}@{server}"#,
        port = TUNNEL_PORT,
    )
}
