//! Ansible process wrappers
//!
//! Bakeflow never speaks the playbook language itself; it shells out to the
//! `ansible-galaxy`, `ansible-playbook` and `ansible` binaries and to
//! `openssl` for Windows password decryption. Exit codes propagate to the
//! caller where the contract requires it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bakeflow_cloud::wait::LoginCheck;
use bakeflow_config::ExtraVars;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Roles are looked up in the working directory first, then one level up
/// so a role repository checkout works unmodified.
const ROLES_PATH: &str = ".bakeflow/roles:..";

pub struct Ansible {
    verbosity: u8,
}

impl Ansible {
    pub fn new(verbosity: u8) -> Self {
        Self { verbosity }
    }

    fn verbosity_flag(&self) -> Option<String> {
        if self.verbosity == 0 {
            None
        } else {
            Some(format!("-{}", "v".repeat(self.verbosity.min(4) as usize)))
        }
    }

    /// `ansible-galaxy install -r <requirements>`; a failing install is
    /// logged but not fatal, the playbook run will surface real problems
    pub async fn galaxy_install(&self, requirements: &Path) -> Result<()> {
        if !requirements.exists() {
            tracing::debug!("no {} found, skipping galaxy install", requirements.display());
            return Ok(());
        }

        let mut cmd = Command::new("ansible-galaxy");
        cmd.arg("install").arg("-r").arg(requirements);
        if let Some(flag) = self.verbosity_flag() {
            cmd.arg(flag);
        }
        cmd.env("ANSIBLE_ROLES_PATH", ROLES_PATH);

        let status = cmd
            .status()
            .await
            .context("failed to run ansible-galaxy, is Ansible installed?")?;
        if !status.success() {
            tracing::warn!("ansible-galaxy install exited with {status}");
        }
        Ok(())
    }

    /// Run the generated playbook; the returned exit code is the build's
    /// overall result code
    pub async fn playbook_run(
        &self,
        inventory: &Path,
        playbook: &Path,
        extra_vars: &ExtraVars,
    ) -> Result<i32> {
        let mut cmd = Command::new("ansible-playbook");
        cmd.arg("-i").arg(inventory);
        if let Some(flag) = self.verbosity_flag() {
            cmd.arg(flag);
        }
        if !extra_vars.is_empty() {
            let blob = serde_json::to_string(extra_vars)?;
            cmd.arg("--extra-vars").arg(blob);
        }
        cmd.arg(playbook);
        cmd.env("ANSIBLE_ROLES_PATH", ROLES_PATH);
        cmd.env("ANSIBLE_HOST_KEY_CHECKING", "False");

        let status = cmd
            .status()
            .await
            .context("failed to run ansible-playbook, is Ansible installed?")?;
        Ok(status.code().unwrap_or(1))
    }

    /// The no-op remote command used as the login-readiness probe
    pub async fn raw_check(&self, group: &str, inventory: &Path) -> bool {
        let status = Command::new("ansible")
            .arg(group)
            .arg("-i")
            .arg(inventory)
            .args(["-m", "raw", "-a", "exit"])
            .env("ANSIBLE_HOST_KEY_CHECKING", "False")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        matches!(status, Ok(s) if s.success())
    }
}

/// [`LoginCheck`] over the Ansible raw module
pub struct AnsibleLogin<'a> {
    pub group: &'a str,
    pub inventory: &'a Path,
}

#[async_trait]
impl LoginCheck for AnsibleLogin<'_> {
    async fn attempt(&self) -> bool {
        Ansible::new(0).raw_check(self.group, self.inventory).await
    }
}

/// Decrypt the provider-generated Windows password with the instance's
/// private key
pub async fn decrypt_password(cipher_file: &Path, keyfile: &Path) -> Result<String> {
    let output = Command::new("openssl")
        .args(["rsautl", "-decrypt", "-in"])
        .arg(cipher_file)
        .arg("-inkey")
        .arg(keyfile)
        .stdout(Stdio::piped())
        .output()
        .await
        .context("failed to run openssl")?;

    if !output.status.success() {
        anyhow::bail!(
            "openssl password decryption failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
