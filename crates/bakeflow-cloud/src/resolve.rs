//! Name-to-id resolution for cloud resources
//!
//! Configuration fields may carry either a raw provider id or a
//! human-readable name. A value that already looks like an id is returned
//! unchanged with no lookup; otherwise the provider is queried by the
//! resource's name filter. When several resources share a name the first
//! match wins, deterministically, with a warning.

use crate::error::{CloudError, Result};
use crate::provider::ComputeProvider;

/// Resolve a source image name to an `ami-` id
pub async fn image_id_for(provider: &dyn ComputeProvider, name: &str) -> Result<String> {
    if name.starts_with("ami-") {
        return Ok(name.to_string());
    }
    pick("image", name, provider.lookup_image(name).await?)
}

/// Resolve a security group name to an `sg-` id
pub async fn security_group_id_for(provider: &dyn ComputeProvider, name: &str) -> Result<String> {
    if name.starts_with("sg-") {
        return Ok(name.to_string());
    }
    pick("security group", name, provider.lookup_security_group(name).await?)
}

/// Resolve a subnet Name tag to a `subnet-` id
pub async fn subnet_id_for(provider: &dyn ComputeProvider, name: &str) -> Result<String> {
    if name.starts_with("subnet-") {
        return Ok(name.to_string());
    }
    pick("subnet", name, provider.lookup_subnet(name).await?)
}

fn pick(kind: &str, name: &str, matches: Vec<String>) -> Result<String> {
    if matches.len() > 1 {
        tracing::warn!(
            "{kind} name \"{name}\" matches {} resources, using {}",
            matches.len(),
            matches[0]
        );
    }
    matches
        .into_iter()
        .next()
        .ok_or_else(|| CloudError::ItemNotFound(format!("{kind} \"{name}\"")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{InstanceDescription, LaunchRequest};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts lookups; every other operation is out of scope here.
    #[derive(Default)]
    struct LookupProvider {
        images: Vec<String>,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl crate::provider::ComputeProvider for LookupProvider {
        async fn create_key_pair(&self, _: &str) -> Result<String> {
            unimplemented!()
        }
        async fn delete_key_pair(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn launch_instance(&self, _: &LaunchRequest) -> Result<InstanceDescription> {
            unimplemented!()
        }
        async fn describe_instance(&self, _: &str) -> Result<InstanceDescription> {
            unimplemented!()
        }
        async fn wait_until_exists(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn wait_until_running(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn create_tags(&self, _: &str, _: &BTreeMap<String, String>) -> Result<()> {
            unimplemented!()
        }
        async fn terminate_instance(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn create_image(&self, _: &str, _: &str) -> Result<String> {
            unimplemented!()
        }
        async fn image_available(&self, _: &str) -> Result<bool> {
            unimplemented!()
        }
        async fn deregister_image(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn password_data(&self, _: &str) -> Result<Option<String>> {
            unimplemented!()
        }
        async fn lookup_image(&self, _: &str) -> Result<Vec<String>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.images.clone())
        }
        async fn lookup_security_group(&self, _: &str) -> Result<Vec<String>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
        async fn lookup_subnet(&self, _: &str) -> Result<Vec<String>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn raw_id_short_circuits_with_zero_lookups() {
        let provider = LookupProvider::default();
        let id = image_id_for(&provider, "ami-0123abcd").await.unwrap();
        assert_eq!(id, "ami-0123abcd");
        assert_eq!(provider.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn single_match_returns_its_id() {
        let provider = LookupProvider {
            images: vec!["ami-00000002".to_string()],
            ..Default::default()
        };
        let id = image_id_for(&provider, "amzn-ami-hvm").await.unwrap();
        assert_eq!(id, "ami-00000002");
        assert_eq!(provider.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ambiguous_match_takes_the_first() {
        let provider = LookupProvider {
            images: vec!["ami-00000001".to_string(), "ami-00000002".to_string()],
            ..Default::default()
        };
        let id = image_id_for(&provider, "amzn-ami-hvm").await.unwrap();
        assert_eq!(id, "ami-00000001");
    }

    #[tokio::test]
    async fn no_match_is_item_not_found() {
        let provider = LookupProvider::default();
        let err = image_id_for(&provider, "no-such-image").await.unwrap_err();
        match err {
            CloudError::ItemNotFound(desc) => {
                assert_eq!(desc, "image \"no-such-image\"");
            }
            other => panic!("expected ItemNotFound, got {other}"),
        }
    }

    #[tokio::test]
    async fn subnet_and_group_prefixes_short_circuit() {
        let provider = LookupProvider::default();
        assert_eq!(
            subnet_id_for(&provider, "subnet-0123abcd").await.unwrap(),
            "subnet-0123abcd"
        );
        assert_eq!(
            security_group_id_for(&provider, "sg-0123abcd").await.unwrap(),
            "sg-0123abcd"
        );
        assert_eq!(provider.lookups.load(Ordering::SeqCst), 0);
    }
}
