//! Provisioning engine
//!
//! Drives the failure-prone creation sequence: keypair → instance → tags →
//! network readiness → state/inventory/playbook files on disk. Re-entry is
//! idempotent: when a state record already exists for the instance key the
//! whole sequence is skipped and the record returned unchanged.

use crate::ansible;
use crate::inventory::{self, BUILD_GROUP, InventoryEntry};
use anyhow::{Context, Result};
use bakeflow_cloud::provider::{
    BlockDeviceRequest, ComputeProvider, EbsRequest, LaunchRequest,
};
use bakeflow_cloud::state::{BuildResources, InstanceFiles, PersistedState};
use bakeflow_cloud::wait::{self, Spinner};
use bakeflow_cloud::{resolve, CloudError};
use bakeflow_config::{BuildSpec, Connection, UserData};
use base64::Engine;
use colored::Colorize;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use std::path::Path;

/// Bundled bootstrap script applied when a WinRM platform declares no
/// user data of its own
const WIN_USERDATA: &str = include_str!("../assets/win-userdata.txt");

const KEYNAME_PREFIX: &str = "bakeflow-";
const KEYNAME_RANDOM_LEN: usize = 10;

pub fn gen_keyname() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEYNAME_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{KEYNAME_PREFIX}{suffix}")
}

/// The role being baked is the current directory's base name
pub fn role_name() -> String {
    std::env::current_dir()
        .ok()
        .and_then(|dir| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "role".to_string())
}

/// Contents of the local version marker, or `"unset"`
pub fn role_version() -> String {
    match std::fs::read_to_string(".role-version") {
        Ok(version) => version.trim().to_string(),
        Err(_) => "unset".to_string(),
    }
}

fn user_data_for(spec: &BuildSpec) -> Result<Option<String>> {
    match &spec.user_data {
        UserData::File { file } => {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read user_data file {}", file.display()))?;
            Ok(Some(content))
        }
        UserData::Inline(s) if s.is_empty() => {
            if spec.connection == Connection::Winrm {
                Ok(Some(WIN_USERDATA.to_string()))
            } else {
                Ok(None)
            }
        }
        UserData::Inline(s) => Ok(Some(s.clone())),
    }
}

/// Translate the resolved spec into provider launch parameters, resolving
/// every name reference first so nothing is created on a dangling name
async fn launch_request(
    provider: &dyn ComputeProvider,
    spec: &BuildSpec,
    keyname: &str,
) -> Result<LaunchRequest> {
    let image_id = resolve::image_id_for(provider, &spec.source_ami).await?;

    let subnet_id = if spec.subnet.is_empty() {
        None
    } else {
        Some(resolve::subnet_id_for(provider, &spec.subnet).await?)
    };

    let mut security_group_ids = Vec::with_capacity(spec.security_groups.len());
    for name in &spec.security_groups {
        security_group_ids.push(resolve::security_group_id_for(provider, name).await?);
    }

    let block_device_mappings = spec
        .block_device_mappings
        .iter()
        .map(|m| BlockDeviceRequest {
            device_name: m.device_name.clone(),
            virtual_name: m.virtual_name.clone(),
            no_device: m.no_device.clone(),
            ebs: m.ebs.as_ref().map(|ebs| EbsRequest {
                volume_size: ebs.volume_size,
                volume_type: ebs.volume_type.map(|vt| vt.as_str().to_string()),
                delete_on_termination: ebs.delete_on_termination,
                encrypted: ebs.encrypted,
                iops: ebs.iops,
                snapshot_id: ebs.snapshot_id.clone(),
            }),
        })
        .collect();

    Ok(LaunchRequest {
        image_id,
        instance_type: spec.instance_type.clone(),
        key_name: keyname.to_string(),
        associate_public_ip_address: spec.associate_public_ip_address,
        subnet_id,
        security_group_ids,
        user_data: user_data_for(spec)?,
        block_device_mappings,
    })
}

fn write_keyfile(path: &Path, material: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, material)
        .with_context(|| format!("failed to write key file {}", path.display()))?;
    inventory::restrict_permissions(path)?;
    Ok(())
}

#[derive(Serialize)]
struct Play {
    hosts: String,
    r#become: bool,
    roles: Vec<String>,
}

/// Playbook stub applying the current role to the build group
fn write_playbook(path: &Path, spec: &BuildSpec) -> Result<()> {
    let playbook = vec![Play {
        hosts: BUILD_GROUP.to_string(),
        r#become: spec.r#become,
        roles: vec![role_name()],
    }];
    let content = serde_yaml::to_string(&playbook)?;
    std::fs::write(path, content)
        .with_context(|| format!("failed to write playbook {}", path.display()))?;
    Ok(())
}

/// Load the persisted state for this instance, creating the backing cloud
/// resources first if none exists yet
pub async fn ensure_instance(
    provider: &dyn ComputeProvider,
    spec: &BuildSpec,
    files: &InstanceFiles,
) -> Result<PersistedState> {
    if PersistedState::exists(files) {
        tracing::debug!(
            "state exists at {}, skipping creation",
            files.state.display()
        );
        return Ok(PersistedState::load(files)?);
    }

    let keyname = gen_keyname();
    let material = provider.create_key_pair(&keyname).await?;
    write_keyfile(&files.keyfile, &material)?;
    println!("Created keypair {}", keyname.cyan());

    // All name resolution happens before the create call so a bad name
    // cannot leave a half-created instance behind.
    let request = launch_request(provider, spec, &keyname).await?;

    let instance = provider.launch_instance(&request).await?;
    println!("Created instance {}", instance.id.cyan());

    if !spec.tags.is_empty() {
        let spinner = Spinner::start("instance", "to exist");
        provider.wait_until_exists(&instance.id).await?;
        spinner.finish();
        provider.create_tags(&instance.id, &spec.tags).await?;
        println!("Tagged instance with {:?}", spec.tags);
    }

    let spinner = Spinner::start("instance", "to be running");
    provider.wait_until_running(&instance.id).await?;
    spinner.finish();

    let instance = provider.describe_instance(&instance.id).await?;

    let password = if spec.connection == Connection::Winrm {
        Some(windows_password(provider, &instance.id, files).await?)
    } else {
        None
    };

    let ip = instance
        .address(spec.associate_public_ip_address)
        .ok_or_else(|| {
            CloudError::Api(format!("instance {} has no usable address", instance.id))
        })?
        .to_string();

    let state = PersistedState {
        keyname,
        build: BuildResources {
            id: instance.id.clone(),
            ip: ip.clone(),
        },
        ami_id: None,
    };
    state.save(files)?;

    inventory::write_inventory(
        &files.inventory,
        &InventoryEntry {
            group: BUILD_GROUP,
            ip: &ip,
            keyfile: &files.keyfile,
            username: &spec.username,
            password: password.as_deref(),
            port: spec.port,
            connection: spec.connection,
        },
    )?;
    write_playbook(&files.playbook, spec)?;

    Ok(state)
}

/// Poll for the encrypted password, decrypt it locally with the instance
/// keypair, and never leave the ciphertext on disk
async fn windows_password(
    provider: &dyn ComputeProvider,
    instance_id: &str,
    files: &InstanceFiles,
) -> Result<String> {
    let encrypted = wait::wait_for_password(provider, instance_id).await?;

    let ciphertext = base64::engine::general_purpose::STANDARD
        .decode(encrypted.split_whitespace().collect::<String>())
        .context("provider returned malformed password data")?;

    let workdir = files.state.parent().unwrap_or_else(|| Path::new("."));
    let cipher_file = tempfile::NamedTempFile::new_in(workdir)
        .context("failed to create transient password file")?;
    std::fs::write(cipher_file.path(), &ciphertext)?;

    let password = ansible::decrypt_password(cipher_file.path(), &files.keyfile).await?;
    // NamedTempFile unlinks on drop; make the intent explicit
    cipher_file.close()?;
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keynames_are_prefixed_and_random() {
        let a = gen_keyname();
        let b = gen_keyname();
        assert!(a.starts_with("bakeflow-"));
        assert_eq!(a.len(), "bakeflow-".len() + 10);
        assert_ne!(a, b);
    }

    #[test]
    fn role_version_defaults_to_unset_without_marker() {
        // runs from the crate directory, which has no .role-version
        assert_eq!(role_version(), "unset");
    }
}
