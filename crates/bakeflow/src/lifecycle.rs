//! Image capture and teardown
//!
//! These flows operate on an already-provisioned instance through its
//! persisted state record. Image capture is additive: the record gains an
//! `ami_id` but keeps the instance alive for further runs. Teardown is
//! best-effort: each resource is released independently and a failure on
//! one never blocks the others.

use crate::provision;
use anyhow::{bail, Result};
use bakeflow_cloud::provider::ComputeProvider;
use bakeflow_cloud::state::{InstanceFiles, PersistedState};
use bakeflow_cloud::wait;
use bakeflow_config::{BuildSpec, Config};
use colored::Colorize;
use std::path::Path;

/// Expand the `{placeholder}` fields of an image name template.
///
/// `arch`, `hv` and `vtype` come from the live instance, the rest from
/// local context. Unknown placeholders are left verbatim.
pub fn render_ami_name(
    template: &str,
    spec: &BuildSpec,
    arch: &str,
    hv: &str,
    vtype: &str,
) -> String {
    template
        .replace("{role}", &provision::role_name())
        .replace("{profile}", &spec.profile)
        .replace("{platform}", &spec.platform)
        .replace("{vtype}", vtype)
        .replace("{arch}", arch)
        .replace("{hv}", hv)
        .replace("{version}", &provision::role_version())
}

/// Snapshot the build instance into a named image and record its id
pub async fn make_image(
    provider: &dyn ComputeProvider,
    spec: &BuildSpec,
    files: &InstanceFiles,
) -> Result<String> {
    let mut state = PersistedState::load(files)?;

    let instance = provider.describe_instance(&state.build.id).await?;
    let arch = instance.architecture.as_deref().unwrap_or("unknown");
    let hv = instance.hypervisor.as_deref().unwrap_or("unknown");
    let vtype = instance.virtualization_type.as_deref().unwrap_or("unknown");

    let name = render_ami_name(&spec.ami_name, spec, arch, hv, vtype);
    let image_id = provider.create_image(&state.build.id, &name).await?;
    println!("Created image {} ({})", name.cyan(), image_id);

    wait::wait_for_image(provider, &image_id).await?;

    state.ami_id = Some(image_id.clone());
    state.save(files)?;
    Ok(image_id)
}

/// Deregister the captured image and drop it from the state record
pub async fn clean_image(
    provider: &dyn ComputeProvider,
    files: &InstanceFiles,
) -> Result<()> {
    let mut state = PersistedState::load(files)?;
    let Some(image_id) = state.ami_id.take() else {
        bail!("no image recorded for this instance, nothing to clean");
    };

    provider.deregister_image(&image_id).await?;
    println!("Deregistered image {}", image_id.cyan());

    state.save(files)?;
    Ok(())
}

/// Tear down the instance, its keypair and every local file.
///
/// Requires a readable state record; an instance that was never created is
/// an error, not a no-op. Cloud-side deletions come first; local file
/// removal proceeds even when they fail so a half-deleted environment can
/// still be cleaned up by rerunning.
pub async fn clean_build(
    provider: &dyn ComputeProvider,
    files: &InstanceFiles,
) -> Result<()> {
    let state = PersistedState::load(files)?;

    if let Err(err) = provider.terminate_instance(&state.build.id).await {
        tracing::warn!("failed to terminate {}: {err}", state.build.id);
    } else {
        println!("Terminated instance {}", state.build.id.cyan());
    }
    if let Err(err) = provider.delete_key_pair(&state.keyname).await {
        tracing::warn!("failed to delete keypair {}: {err}", state.keyname);
    } else {
        println!("Deleted keypair {}", state.keyname.cyan());
    }

    for path in files.all() {
        if let Err(err) = std::fs::remove_file(path)
            && err.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!("failed to remove {}: {err}", path.display());
        }
    }
    Ok(())
}

/// Every configured instance key with whether its state file exists
pub fn statuses(config: &Config, workdir: &Path) -> Vec<(String, bool)> {
    config
        .keys()
        .map(|key| {
            let files = InstanceFiles::new(workdir, key);
            (key.clone(), PersistedState::exists(&files))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spec() -> BuildSpec {
        BuildSpec {
            platform: "centos".to_string(),
            profile: "default".to_string(),
            source_ami: "ami-00000001".to_string(),
            instance_type: "t2.micro".to_string(),
            username: "ec2-user".to_string(),
            connection: bakeflow_config::Connection::Ssh,
            connection_timeout: 600,
            port: 22,
            associate_public_ip_address: true,
            subnet: String::new(),
            security_groups: Vec::new(),
            tags: Default::default(),
            user_data: Default::default(),
            block_device_mappings: Vec::new(),
            r#become: true,
            ami_name: "{platform}-{profile}-{arch}".to_string(),
            extra_vars: Default::default(),
        }
    }

    #[test]
    fn ami_name_placeholders_expand_from_spec_and_instance() {
        let name = render_ami_name(&spec().ami_name, &spec(), "x86_64", "xen", "hvm");
        assert_eq!(name, "centos-default-x86_64");
    }

    #[test]
    fn hypervisor_and_vtype_come_from_the_instance() {
        let name = render_ami_name("{platform}.{hv}.{vtype}", &spec(), "x86_64", "xen", "hvm");
        assert_eq!(name, "centos.xen.hvm");
    }

    #[test]
    fn unknown_placeholders_pass_through() {
        let name = render_ami_name("{platform}.{custom}", &spec(), "x86_64", "xen", "hvm");
        assert_eq!(name, "centos.{custom}");
    }

    #[test]
    fn statuses_reflect_state_file_presence() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::new();
        let instance = bakeflow_config::InstanceSpec {
            platform: "centos".to_string(),
            profile: "default".to_string(),
            build: spec(),
            test: spec(),
        };
        config.insert("centos-default".to_string(), instance);

        assert_eq!(
            statuses(&config, dir.path()),
            vec![("centos-default".to_string(), false)]
        );

        let files = InstanceFiles::new(dir.path(), "centos-default");
        PersistedState {
            keyname: "bakeflow-abcde12345".to_string(),
            build: bakeflow_cloud::state::BuildResources {
                id: "i-00000001".to_string(),
                ip: "20.30.40.50".to_string(),
            },
            ami_id: None,
        }
        .save(&files)
        .unwrap();

        assert_eq!(
            statuses(&config, dir.path()),
            vec![("centos-default".to_string(), true)]
        );
    }
}
