// Instance manager abstraction
// Tracks the server instances that report in and the containers they run

//! # Instance Store
//!
//! Server instances are observed state. They register when an execution
//! server connects and disappear when it goes away. The controller reads them
//! to answer "where is this container spec actually running?".
//!
//! Unlike templates, instances are never validated against desired state
//! here: an instance may still report containers whose spec was deleted.
//! Such containers are stale and are filtered out by whoever reads them.

use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::{Container, ServerInstance, ServerInstanceKey};
use crate::Result;

/// Enumerates live server instances and their containers
#[async_trait::async_trait]
pub trait InstanceManager: Send + Sync {
    /// Insert or replace an instance keyed by its instance id
    async fn register(&self, instance: ServerInstance) -> Result<()>;

    /// Remove an instance, returning it if it was present
    async fn remove(&self, server_instance_id: &str) -> Result<Option<ServerInstance>>;

    async fn instance(&self, server_instance_id: &str) -> Result<Option<ServerInstance>>;

    /// Snapshot of every known instance, in no particular order
    async fn instances(&self) -> Result<Vec<ServerInstance>>;

    /// Containers currently reported by one instance; empty if unknown
    async fn containers(&self, key: &ServerInstanceKey) -> Result<Vec<Container>> {
        Ok(self
            .instance(&key.server_instance_id)
            .await?
            .map(|instance| instance.containers)
            .unwrap_or_default())
    }
}

/// In-memory instance store
#[derive(Default)]
pub struct InMemoryInstanceManager {
    /// Key: server instance id
    instances: RwLock<HashMap<String, ServerInstance>>,
}

impl InMemoryInstanceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instances(instances: impl IntoIterator<Item = ServerInstance>) -> Self {
        let instances = instances
            .into_iter()
            .map(|instance| (instance.id().to_string(), instance))
            .collect();

        Self {
            instances: RwLock::new(instances),
        }
    }
}

#[async_trait::async_trait]
impl InstanceManager for InMemoryInstanceManager {
    async fn register(&self, instance: ServerInstance) -> Result<()> {
        let mut instances = self.instances.write().await;
        instances.insert(instance.id().to_string(), instance);
        Ok(())
    }

    async fn remove(&self, server_instance_id: &str) -> Result<Option<ServerInstance>> {
        let mut instances = self.instances.write().await;
        Ok(instances.remove(server_instance_id))
    }

    async fn instance(&self, server_instance_id: &str) -> Result<Option<ServerInstance>> {
        let instances = self.instances.read().await;
        Ok(instances.get(server_instance_id).cloned())
    }

    async fn instances(&self) -> Result<Vec<ServerInstance>> {
        let instances = self.instances.read().await;
        Ok(instances.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReleaseId;

    fn instance(host: &str) -> ServerInstance {
        let key = ServerInstanceKey::new("tpl", host, host, format!("http://{}:8080/", host));
        ServerInstance::new(key, "7.0").with_container(
            "orders",
            "orders",
            ReleaseId::new("org.example", "orders", "1.0.0"),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_register_replaces_by_instance_id() {
        let manager = InMemoryInstanceManager::new();
        manager.register(instance("10.0.0.1")).await.unwrap();

        let mut updated = instance("10.0.0.1");
        updated.version = "7.1".to_string();
        manager.register(updated).await.unwrap();

        let instances = manager.instances().await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].version, "7.1");
    }

    #[tokio::test]
    async fn test_containers_of_unknown_instance_are_empty() {
        let known = instance("10.0.0.1");
        let manager = InMemoryInstanceManager::with_instances(vec![known.clone()]);

        assert_eq!(manager.containers(&known.key).await.unwrap().len(), 1);

        let unknown = ServerInstanceKey::new("tpl", "ghost", "10.9.9.9", "http://10.9.9.9:8080/");
        assert!(manager.containers(&unknown).await.unwrap().is_empty());

        assert!(manager.remove(known.id()).await.unwrap().is_some());
        assert!(manager.containers(&known.key).await.unwrap().is_empty());
    }
}
