//! Compute provider trait definition

use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// The slice of a cloud compute API the lifecycle engine needs.
///
/// Implementations are expected to be dumb translations to the provider
/// SDK; retries, polling cadence and ordering decisions all live in the
/// caller so they can be tested against a mock.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Create a keypair and return its private key material
    async fn create_key_pair(&self, name: &str) -> Result<String>;

    async fn delete_key_pair(&self, name: &str) -> Result<()>;

    /// Launch exactly one instance
    async fn launch_instance(&self, request: &LaunchRequest) -> Result<InstanceDescription>;

    async fn describe_instance(&self, id: &str) -> Result<InstanceDescription>;

    /// Block until the provider reports the instance as existing
    async fn wait_until_exists(&self, id: &str) -> Result<()>;

    /// Block until the instance state is `running`
    async fn wait_until_running(&self, id: &str) -> Result<()>;

    async fn create_tags(&self, id: &str, tags: &BTreeMap<String, String>) -> Result<()>;

    /// Fire-and-forget termination; completion is not awaited
    async fn terminate_instance(&self, id: &str) -> Result<()>;

    /// Snapshot a running instance into an image, returning the image id
    async fn create_image(&self, instance_id: &str, name: &str) -> Result<String>;

    async fn image_available(&self, image_id: &str) -> Result<bool>;

    async fn deregister_image(&self, image_id: &str) -> Result<()>;

    /// Encrypted Windows password material, `None` while not yet generated
    async fn password_data(&self, id: &str) -> Result<Option<String>>;

    /// Ids of images whose name matches exactly
    async fn lookup_image(&self, name: &str) -> Result<Vec<String>>;

    /// Ids of security groups whose group name matches exactly
    async fn lookup_security_group(&self, name: &str) -> Result<Vec<String>>;

    /// Ids of subnets whose `Name` tag matches exactly
    async fn lookup_subnet(&self, name: &str) -> Result<Vec<String>>;
}

/// Everything needed for the single create-instance call
#[derive(Debug, Clone, Default)]
pub struct LaunchRequest {
    /// Resolved `ami-` id
    pub image_id: String,
    pub instance_type: String,
    pub key_name: String,
    pub associate_public_ip_address: bool,
    pub subnet_id: Option<String>,
    pub security_group_ids: Vec<String>,
    /// Raw user data; providers encode it as they require
    pub user_data: Option<String>,
    pub block_device_mappings: Vec<BlockDeviceRequest>,
}

#[derive(Debug, Clone, Default)]
pub struct BlockDeviceRequest {
    pub device_name: String,
    pub virtual_name: Option<String>,
    pub no_device: Option<String>,
    pub ebs: Option<EbsRequest>,
}

#[derive(Debug, Clone, Default)]
pub struct EbsRequest {
    pub volume_size: Option<i32>,
    pub volume_type: Option<String>,
    pub delete_on_termination: Option<bool>,
    pub encrypted: Option<bool>,
    pub iops: Option<i32>,
    pub snapshot_id: Option<String>,
}

/// Instance attributes as reported by the provider
#[derive(Debug, Clone, Default)]
pub struct InstanceDescription {
    pub id: String,
    pub state: Option<String>,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub architecture: Option<String>,
    pub hypervisor: Option<String>,
    pub virtualization_type: Option<String>,
}

impl InstanceDescription {
    /// The address the configuration run should target
    pub fn address(&self, public: bool) -> Option<&str> {
        if public {
            self.public_ip.as_deref()
        } else {
            self.private_ip.as_deref()
        }
    }
}
