//! Resolved configuration model
//!
//! These are the fully merged, fully defaulted types the rest of the tool
//! consumes. Raw document shapes live in [`crate::raw`]; the conversion
//! between the two is the resolver's job and can fail with a validation
//! error listing every violated field.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Arbitrary variables handed to the configuration-management run,
/// serialized as a JSON blob on the `ansible-playbook` command line.
pub type ExtraVars = serde_json::Map<String, serde_json::Value>;

pub const DEFAULT_INSTANCE_TYPE: &str = "t2.micro";
pub const DEFAULT_USERNAME: &str = "ec2-user";
pub const DEFAULT_CONNECTION_TIMEOUT: u64 = 600;
pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_AMI_NAME: &str = "{role}.{profile}.{platform}.{vtype}.{arch}.{version}";

/// Remote connection kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connection {
    Ssh,
    Winrm,
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connection::Ssh => write!(f, "ssh"),
            Connection::Winrm => write!(f, "winrm"),
        }
    }
}

/// Instance user data: an inline script or a file reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserData {
    Inline(String),
    File { file: PathBuf },
}

impl Default for UserData {
    fn default() -> Self {
        UserData::Inline(String::new())
    }
}

impl UserData {
    pub fn is_empty(&self) -> bool {
        matches!(self, UserData::Inline(s) if s.is_empty())
    }
}

/// EBS volume types accepted for block device mappings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeType {
    Gp2,
    Io1,
    Standard,
}

impl VolumeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeType::Gp2 => "gp2",
            VolumeType::Io1 => "io1",
            VolumeType::Standard => "standard",
        }
    }
}

/// Resolved EBS sub-object of a block device mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EbsSpec {
    pub volume_size: Option<i32>,
    pub volume_type: Option<VolumeType>,
    pub delete_on_termination: Option<bool>,
    pub encrypted: Option<bool>,
    pub iops: Option<i32>,
    pub snapshot_id: Option<String>,
}

/// Resolved block device mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDeviceMapping {
    pub device_name: String,
    pub ebs: Option<EbsSpec>,
    pub no_device: Option<String>,
    pub virtual_name: Option<String>,
}

/// Fully resolved configuration for one instance's build (or test) stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Platform name, injected after merging
    pub platform: String,

    /// Profile name, injected after merging
    pub profile: String,

    /// Source image, either a raw `ami-` id or a name to resolve
    pub source_ami: String,

    pub instance_type: String,
    pub username: String,
    pub connection: Connection,

    /// Wall-clock budget in seconds for the remote-login readiness wait
    pub connection_timeout: u64,

    pub port: u16,
    pub associate_public_ip_address: bool,

    /// Subnet id or Name tag; empty means provider default
    pub subnet: String,

    /// Security group ids or names
    pub security_groups: Vec<String>,

    pub tags: BTreeMap<String, String>,
    pub user_data: UserData,
    pub block_device_mappings: Vec<BlockDeviceMapping>,

    /// Escalate privileges in the generated playbook
    pub r#become: bool,

    /// Image name template with `{role}`, `{profile}`, `{platform}`,
    /// `{vtype}`, `{arch}`, `{hv}` and `{version}` placeholders
    pub ami_name: String,

    pub extra_vars: ExtraVars,
}

impl BuildSpec {
    /// The addressing handle used for state files and CLI lookups
    pub fn instance_key(&self) -> String {
        format!("{}-{}", self.platform, self.profile)
    }
}

/// One (platform, profile) pair with its resolved build and test stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub platform: String,
    pub profile: String,
    pub build: BuildSpec,
    pub test: BuildSpec,
}
