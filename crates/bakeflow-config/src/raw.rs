//! Raw document shapes, pre-merge
//!
//! Everything here is `Option`-typed so stages can be layered:
//! global defaults, then platform-level overrides, then the stage body,
//! each layer winning over the one below it. [`RawStage::finalize`] turns
//! a layered stage into a [`BuildSpec`], applying schema defaults and
//! running the custom validation predicates.

use crate::model::{
    BlockDeviceMapping, BuildSpec, Connection, EbsSpec, ExtraVars, UserData, VolumeType,
    DEFAULT_AMI_NAME, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_INSTANCE_TYPE, DEFAULT_PORT,
    DEFAULT_USERNAME,
};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static SUBNET_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^subnet-[0-9a-f]{8}$").unwrap());
static SNAPSHOT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^snap-[0-9a-f]{8}$").unwrap());
static VIRTUAL_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ephemeral\d+$").unwrap());

/// The parsed document before any merging
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDocument {
    #[serde(default)]
    pub defaults: Option<RawStage>,

    /// Deprecated alias for `defaults`
    #[serde(default)]
    pub driver: Option<RawStage>,

    pub platforms: Vec<RawPlatform>,

    #[serde(default = "default_profiles")]
    pub profiles: Vec<RawProfile>,
}

fn default_profiles() -> Vec<RawProfile> {
    vec![RawProfile {
        name: "default".to_string(),
        extra_vars: ExtraVars::new(),
    }]
}

/// A named platform: either a legacy flat stage body, or nested
/// `build`/`test` stages plus platform-wide overrides
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlatform {
    pub name: String,

    #[serde(default)]
    pub build: Option<RawStage>,

    #[serde(default)]
    pub test: Option<RawStage>,

    #[serde(flatten)]
    pub overrides: RawStage,
}

/// A named set of variable overrides applied across platforms
#[derive(Debug, Clone, Deserialize)]
pub struct RawProfile {
    pub name: String,

    #[serde(default)]
    pub extra_vars: ExtraVars,
}

/// One layer of stage configuration; all fields optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStage {
    pub source_ami: Option<String>,
    pub ami_name: Option<String>,
    pub instance_type: Option<String>,
    pub username: Option<String>,
    pub connection: Option<Connection>,
    pub connection_timeout: Option<u64>,
    pub port: Option<u16>,
    pub associate_public_ip_address: Option<bool>,
    pub subnet: Option<String>,
    pub security_groups: Option<Vec<String>>,
    pub tags: Option<BTreeMap<String, String>>,
    pub user_data: Option<UserData>,
    pub block_device_mappings: Option<Vec<RawBlockDeviceMapping>>,
    pub r#become: Option<bool>,
    pub extra_vars: Option<ExtraVars>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBlockDeviceMapping {
    pub device_name: String,
    pub ebs: Option<RawEbs>,
    pub no_device: Option<String>,
    pub virtual_name: Option<String>,
}

/// EBS sub-object with `volume_type` kept as a string so an invalid value
/// surfaces as an `Invalid volume_type: ...` message instead of a parse error
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEbs {
    pub volume_size: Option<i32>,
    pub volume_type: Option<String>,
    pub delete_on_termination: Option<bool>,
    pub encrypted: Option<bool>,
    pub iops: Option<i32>,
    pub snapshot_id: Option<String>,
}

impl RawStage {
    /// Layer `over` on top of `self`: fields set in `over` win
    pub fn overlaid(&self, over: &RawStage) -> RawStage {
        macro_rules! pick {
            ($field:ident) => {
                over.$field.clone().or_else(|| self.$field.clone())
            };
        }
        RawStage {
            source_ami: pick!(source_ami),
            ami_name: pick!(ami_name),
            instance_type: pick!(instance_type),
            username: pick!(username),
            connection: pick!(connection),
            connection_timeout: pick!(connection_timeout),
            port: pick!(port),
            associate_public_ip_address: pick!(associate_public_ip_address),
            subnet: pick!(subnet),
            security_groups: pick!(security_groups),
            tags: pick!(tags),
            user_data: pick!(user_data),
            block_device_mappings: pick!(block_device_mappings),
            r#become: pick!(r#become),
            extra_vars: pick!(extra_vars),
        }
    }

    /// Apply schema defaults, validate, and inject the identity fields.
    ///
    /// Errors are accumulated so a single pass reports every violation.
    pub fn finalize(
        self,
        platform: &str,
        profile: &str,
        profile_extra_vars: &ExtraVars,
    ) -> Result<BuildSpec, Vec<String>> {
        let mut errors = Vec::new();

        let source_ami = match self.source_ami {
            Some(ami) => ami,
            None => {
                errors.push(format!("{platform}-{profile}: source_ami is required"));
                String::new()
            }
        };

        let subnet = self.subnet.unwrap_or_default();
        if subnet.starts_with("subnet-") && !SUBNET_ID.is_match(&subnet) {
            errors.push(format!("Invalid subnet_id: {subnet}"));
        }

        let mut mappings = Vec::new();
        for raw in self.block_device_mappings.unwrap_or_default() {
            if let Some(virtual_name) = &raw.virtual_name
                && !VIRTUAL_NAME.is_match(virtual_name)
            {
                errors.push(format!("Invalid virtual_name: {virtual_name}"));
            }
            let ebs = raw.ebs.map(|ebs| {
                let volume_type = ebs.volume_type.and_then(|vt| match vt.as_str() {
                    "gp2" => Some(VolumeType::Gp2),
                    "io1" => Some(VolumeType::Io1),
                    "standard" => Some(VolumeType::Standard),
                    other => {
                        errors.push(format!("Invalid volume_type: {other}"));
                        None
                    }
                });
                if let Some(snapshot_id) = &ebs.snapshot_id
                    && !SNAPSHOT_ID.is_match(snapshot_id)
                {
                    errors.push(format!("Invalid snapshot_id: {snapshot_id}"));
                }
                EbsSpec {
                    volume_size: ebs.volume_size,
                    volume_type,
                    delete_on_termination: ebs.delete_on_termination,
                    encrypted: ebs.encrypted,
                    iops: ebs.iops,
                    snapshot_id: ebs.snapshot_id,
                }
            });
            mappings.push(BlockDeviceMapping {
                device_name: raw.device_name,
                ebs,
                no_device: raw.no_device,
                virtual_name: raw.virtual_name,
            });
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        // Profile variables win over stage-level variables, key by key.
        let mut extra_vars = self.extra_vars.unwrap_or_default();
        for (key, value) in profile_extra_vars {
            extra_vars.insert(key.clone(), value.clone());
        }

        Ok(BuildSpec {
            platform: platform.to_string(),
            profile: profile.to_string(),
            source_ami,
            instance_type: self
                .instance_type
                .unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.to_string()),
            username: self.username.unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            connection: self.connection.unwrap_or(Connection::Ssh),
            connection_timeout: self.connection_timeout.unwrap_or(DEFAULT_CONNECTION_TIMEOUT),
            port: self.port.unwrap_or(DEFAULT_PORT),
            associate_public_ip_address: self.associate_public_ip_address.unwrap_or(true),
            subnet,
            security_groups: self.security_groups.unwrap_or_default(),
            tags: self.tags.unwrap_or_default(),
            user_data: self.user_data.unwrap_or_default(),
            block_device_mappings: mappings,
            r#become: self.r#become.unwrap_or(true),
            ami_name: self.ami_name.unwrap_or_else(|| DEFAULT_AMI_NAME.to_string()),
            extra_vars,
        })
    }
}
