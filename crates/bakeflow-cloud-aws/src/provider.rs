//! `ComputeProvider` implementation over the AWS EC2 SDK
//!
//! Each trait method is a direct translation to one SDK call; the field
//! mapping from launch requests into the typed builders is the single place
//! where Bakeflow names meet EC2 parameter names.

use async_trait::async_trait;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::error::DisplayErrorContext;
use aws_sdk_ec2::types::{
    BlockDeviceMapping, EbsBlockDevice, Filter, ImageState, Instance,
    InstanceNetworkInterfaceSpecification, InstanceStateName, InstanceType, Tag, VolumeType,
};
use bakeflow_cloud::error::{CloudError, Result};
use bakeflow_cloud::provider::{
    ComputeProvider, InstanceDescription, LaunchRequest,
};
use base64::Engine;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::sleep;

/// Cadence for the describe-based exists/running waits
const DESCRIBE_INTERVAL: Duration = Duration::from_secs(5);

pub struct AwsProvider {
    client: Client,
}

impl AwsProvider {
    /// Build a client from the ambient AWS configuration
    /// (environment, profile, instance metadata)
    pub async fn from_env() -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self {
            client: Client::new(&config),
        }
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn find_instance(&self, id: &str) -> Result<Option<Instance>> {
        let response = self
            .client
            .describe_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(api)?;

        Ok(response
            .reservations()
            .first()
            .and_then(|r| r.instances().first())
            .cloned())
    }
}

#[async_trait]
impl ComputeProvider for AwsProvider {
    async fn create_key_pair(&self, name: &str) -> Result<String> {
        let response = self
            .client
            .create_key_pair()
            .key_name(name)
            .send()
            .await
            .map_err(api)?;

        response
            .key_material()
            .map(str::to_string)
            .ok_or_else(|| CloudError::Api("keypair created without key material".to_string()))
    }

    async fn delete_key_pair(&self, name: &str) -> Result<()> {
        self.client
            .delete_key_pair()
            .key_name(name)
            .send()
            .await
            .map_err(api)?;
        Ok(())
    }

    async fn launch_instance(&self, request: &LaunchRequest) -> Result<InstanceDescription> {
        let mut interface = InstanceNetworkInterfaceSpecification::builder()
            .device_index(0)
            .associate_public_ip_address(request.associate_public_ip_address);
        if let Some(subnet_id) = &request.subnet_id {
            interface = interface.subnet_id(subnet_id);
        }
        for group_id in &request.security_group_ids {
            interface = interface.groups(group_id);
        }

        let mut call = self
            .client
            .run_instances()
            .image_id(&request.image_id)
            .instance_type(InstanceType::from(request.instance_type.as_str()))
            .min_count(1)
            .max_count(1)
            .key_name(&request.key_name)
            .network_interfaces(interface.build());

        if let Some(user_data) = &request.user_data {
            let encoded = base64::engine::general_purpose::STANDARD.encode(user_data.as_bytes());
            call = call.user_data(encoded);
        }

        for mapping in &request.block_device_mappings {
            call = call.block_device_mappings(block_device(mapping));
        }

        tracing::debug!(image_id = %request.image_id, "Launching instance");
        let response = call.send().await.map_err(api)?;

        let instance = response
            .instances()
            .first()
            .ok_or_else(|| CloudError::Api("no instance returned by RunInstances".to_string()))?;
        Ok(describe(instance))
    }

    async fn describe_instance(&self, id: &str) -> Result<InstanceDescription> {
        let instance = self
            .find_instance(id)
            .await?
            .ok_or_else(|| CloudError::ItemNotFound(format!("instance \"{id}\"")))?;
        Ok(describe(&instance))
    }

    async fn wait_until_exists(&self, id: &str) -> Result<()> {
        // A freshly created id can be invisible to DescribeInstances for a
        // while, which surfaces as an InvalidInstanceID error; keep polling.
        loop {
            match self.find_instance(id).await {
                Ok(Some(_)) => return Ok(()),
                Ok(None) => {}
                Err(e) => tracing::debug!("instance {id} not describable yet: {e}"),
            }
            sleep(DESCRIBE_INTERVAL).await;
        }
    }

    async fn wait_until_running(&self, id: &str) -> Result<()> {
        loop {
            let instance = self.find_instance(id).await?;
            let state = instance
                .as_ref()
                .and_then(|i| i.state())
                .and_then(|s| s.name());
            match state {
                Some(InstanceStateName::Running) => return Ok(()),
                Some(InstanceStateName::Terminated | InstanceStateName::ShuttingDown) => {
                    return Err(CloudError::Api(format!(
                        "instance {id} entered state {state:?} while waiting for running"
                    )));
                }
                _ => sleep(DESCRIBE_INTERVAL).await,
            }
        }
    }

    async fn create_tags(&self, id: &str, tags: &BTreeMap<String, String>) -> Result<()> {
        let tags: Vec<Tag> = tags
            .iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build())
            .collect();

        self.client
            .create_tags()
            .resources(id)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(api)?;
        Ok(())
    }

    async fn terminate_instance(&self, id: &str) -> Result<()> {
        self.client
            .terminate_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(api)?;
        Ok(())
    }

    async fn create_image(&self, instance_id: &str, name: &str) -> Result<String> {
        let response = self
            .client
            .create_image()
            .instance_id(instance_id)
            .name(name)
            .send()
            .await
            .map_err(api)?;

        response
            .image_id()
            .map(str::to_string)
            .ok_or_else(|| CloudError::Api("no image id returned by CreateImage".to_string()))
    }

    async fn image_available(&self, image_id: &str) -> Result<bool> {
        let response = self
            .client
            .describe_images()
            .image_ids(image_id)
            .send()
            .await
            .map_err(api)?;

        let state = response.images().first().and_then(|i| i.state());
        Ok(matches!(state, Some(ImageState::Available)))
    }

    async fn deregister_image(&self, image_id: &str) -> Result<()> {
        self.client
            .deregister_image()
            .image_id(image_id)
            .send()
            .await
            .map_err(api)?;
        Ok(())
    }

    async fn password_data(&self, id: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get_password_data()
            .instance_id(id)
            .send()
            .await
            .map_err(api)?;

        Ok(response
            .password_data()
            .filter(|data| !data.is_empty())
            .map(str::to_string))
    }

    async fn lookup_image(&self, name: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .describe_images()
            .filters(Filter::builder().name("name").values(name).build())
            .send()
            .await
            .map_err(api)?;

        Ok(response
            .images()
            .iter()
            .filter_map(|i| i.image_id())
            .map(str::to_string)
            .collect())
    }

    async fn lookup_security_group(&self, name: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .describe_security_groups()
            .filters(Filter::builder().name("group-name").values(name).build())
            .send()
            .await
            .map_err(api)?;

        Ok(response
            .security_groups()
            .iter()
            .filter_map(|g| g.group_id())
            .map(str::to_string)
            .collect())
    }

    async fn lookup_subnet(&self, name: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .describe_subnets()
            .filters(Filter::builder().name("tag:Name").values(name).build())
            .send()
            .await
            .map_err(api)?;

        Ok(response
            .subnets()
            .iter()
            .filter_map(|s| s.subnet_id())
            .map(str::to_string)
            .collect())
    }
}

/// Explicit mapping from Bakeflow block device fields to EC2 parameter
/// names, checked by the SDK's typed builders
fn block_device(mapping: &bakeflow_cloud::provider::BlockDeviceRequest) -> BlockDeviceMapping {
    let ebs = mapping.ebs.as_ref().map(|ebs| {
        EbsBlockDevice::builder()
            .set_volume_size(ebs.volume_size)
            .set_volume_type(ebs.volume_type.as_deref().map(VolumeType::from))
            .set_delete_on_termination(ebs.delete_on_termination)
            .set_encrypted(ebs.encrypted)
            .set_iops(ebs.iops)
            .set_snapshot_id(ebs.snapshot_id.clone())
            .build()
    });

    BlockDeviceMapping::builder()
        .device_name(&mapping.device_name)
        .set_virtual_name(mapping.virtual_name.clone())
        .set_no_device(mapping.no_device.clone())
        .set_ebs(ebs)
        .build()
}

fn describe(instance: &Instance) -> InstanceDescription {
    InstanceDescription {
        id: instance.instance_id().unwrap_or_default().to_string(),
        state: instance
            .state()
            .and_then(|s| s.name())
            .map(|n| n.as_str().to_string()),
        public_ip: instance.public_ip_address().map(str::to_string),
        private_ip: instance.private_ip_address().map(str::to_string),
        architecture: instance.architecture().map(|a| a.as_str().to_string()),
        hypervisor: instance.hypervisor().map(|h| h.as_str().to_string()),
        virtualization_type: instance
            .virtualization_type()
            .map(|v| v.as_str().to_string()),
    }
}

fn api<E>(err: E) -> CloudError
where
    E: std::error::Error + Send + Sync + 'static,
{
    CloudError::Api(DisplayErrorContext(&err).to_string())
}
