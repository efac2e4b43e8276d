// Management facade over the template and instance stores

//! # Controller Service
//!
//! [`ControllerService`] is the single entry point that remote clients (the
//! admin UI, the CLI, an RPC layer) talk to. It implements three service
//! traits:
//!
//! - [`SpecManagementService`]: create, copy, edit and delete templates and
//!   their container specs (desired state)
//! - [`RuntimeManagementService`]: read what server instances report
//!   (observed state)
//! - [`RuleCapabilitiesService`]: scanner and release operations for rule
//!   containers
//!
//! ## Write Path
//!
//! Every mutation of a template runs under that template's lock and follows
//! the same order:
//!
//! 1. injected fault for guarded operations (`Transient`); the call is
//!    counted whatever its arguments
//! 2. argument checks (`InvalidArgument`)
//! 3. existence checks (`NotFound`)
//! 4. a single write-back to storage
//! 5. notification, for template saves, copies and deletes
//!
//! Two operations differ. `update_container_config` and `save_server_template`
//! reject missing or mismatched arguments before the call is counted, and
//! `save_server_template` lets `AlreadyExists` win over the injected fault, so
//! a duplicate id is always reported as such.
//!
//! Anything that fails before step 4 leaves storage untouched.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::models::{
    Capability, Container, ContainerConfig, ContainerSpec, ContainerSpecData, ContainerSpecKey,
    ContainerStatus, ReleaseId, ServerConfig, ServerInstance, ServerInstanceKey, ServerTemplate,
    ServerTemplateKey, TemplateEvent,
};
use crate::{ControllerError, Result};

use super::events::{EventBus, TemplateNotifier};
use super::faults::{FaultInjector, GuardedOperation};
use super::instances::{InMemoryInstanceManager, InstanceManager};
use super::locks::KeyedLocks;
use super::storage::{InMemoryTemplateStorage, TemplateStorage};
use super::validation::is_valid_identifier;

/// Desired-state management: templates and container specs
#[async_trait::async_trait]
pub trait SpecManagementService: Send + Sync {
    /// True iff no template with this id exists
    async fn is_new_server_template_id_valid(&self, server_template_id: &str) -> Result<bool>;

    /// Store a container spec in a template, replacing a spec with the same id
    async fn save_container_spec(
        &self,
        server_template_id: &str,
        container_spec: ContainerSpec,
    ) -> Result<()>;

    /// Create a template; fails if the id is taken
    async fn save_server_template(&self, server_template: ServerTemplate) -> Result<()>;

    async fn get_server_template(&self, server_template_id: &str)
        -> Result<Option<ServerTemplate>>;

    async fn list_server_template_keys(&self) -> Result<Vec<ServerTemplateKey>>;

    async fn list_server_templates(&self) -> Result<Vec<ServerTemplate>>;

    async fn list_container_specs(&self, server_template_id: &str) -> Result<Vec<ContainerSpec>>;

    /// Remove a spec; a missing spec is not an error, a missing template is
    async fn delete_container_spec(
        &self,
        server_template_id: &str,
        container_spec_id: &str,
    ) -> Result<()>;

    /// Remove a template; a missing template is not an error
    async fn delete_server_template(&self, server_template_id: &str) -> Result<()>;

    /// Deep-copy a template and all its specs under a new id and name
    async fn copy_server_template(
        &self,
        server_template_id: &str,
        new_server_template_id: &str,
        new_server_template_name: &str,
    ) -> Result<()>;

    async fn update_container_config(
        &self,
        server_template_id: &str,
        container_spec_id: &str,
        capability: Capability,
        container_config: ContainerConfig,
    ) -> Result<()>;

    /// Validates the template exists; server-level configs are not persisted
    async fn update_server_template_config(
        &self,
        server_template_id: &str,
        capability: Capability,
        server_config: ServerConfig,
    ) -> Result<()>;

    async fn start_container(&self, container_spec_key: &ContainerSpecKey) -> Result<()>;

    async fn stop_container(&self, container_spec_key: &ContainerSpecKey) -> Result<()>;

    /// False for malformed ids; otherwise true iff the template has no spec with that id
    async fn is_container_id_valid(
        &self,
        server_template_id: &str,
        container_id: &str,
    ) -> Result<bool>;
}

/// Observed-state queries: instances and the containers they run
#[async_trait::async_trait]
pub trait RuntimeManagementService: Send + Sync {
    async fn get_server_instances(&self, server_template_id: &str)
        -> Result<Vec<ServerInstanceKey>>;

    async fn get_containers_for_instance(
        &self,
        server_instance_key: &ServerInstanceKey,
    ) -> Result<Vec<Container>>;

    /// Every container, across all instances, deployed from this spec
    async fn get_containers(&self, container_spec_key: &ContainerSpecKey)
        -> Result<ContainerSpecData>;
}

/// Scanner and release operations for rule containers
#[async_trait::async_trait]
pub trait RuleCapabilitiesService: Send + Sync {
    async fn scan_now(&self, container_spec_key: &ContainerSpecKey) -> Result<()>;

    async fn start_scanner(&self, container_spec_key: &ContainerSpecKey, interval: u64)
        -> Result<()>;

    async fn stop_scanner(&self, container_spec_key: &ContainerSpecKey) -> Result<()>;

    async fn upgrade_container(
        &self,
        container_spec_key: &ContainerSpecKey,
        release_id: ReleaseId,
    ) -> Result<()>;
}

/// The management facade
pub struct ControllerService {
    templates: Arc<dyn TemplateStorage>,
    instances: Arc<dyn InstanceManager>,
    notifier: Arc<dyn TemplateNotifier>,
    faults: FaultInjector,
    locks: KeyedLocks,
}

impl ControllerService {
    pub fn new(
        templates: Arc<dyn TemplateStorage>,
        instances: Arc<dyn InstanceManager>,
        notifier: Arc<dyn TemplateNotifier>,
        faults: FaultInjector,
    ) -> Self {
        Self {
            templates,
            instances,
            notifier,
            faults,
            locks: KeyedLocks::new(),
        }
    }

    /// Empty in-memory controller with a private event bus and no fault injection
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryTemplateStorage::new()),
            Arc::new(InMemoryInstanceManager::new()),
            Arc::new(EventBus::new()),
            FaultInjector::disabled(),
        )
    }

    /// In-memory controller wired according to `config`, publishing on `bus`
    pub fn from_config(config: &ControllerConfig, bus: EventBus) -> Result<Self> {
        let (templates, instances) = if config.seed_demo_data {
            (
                InMemoryTemplateStorage::with_templates(crate::fixtures::demo_templates()),
                InMemoryInstanceManager::with_instances(crate::fixtures::demo_instances()),
            )
        } else {
            (InMemoryTemplateStorage::new(), InMemoryInstanceManager::new())
        };

        Ok(Self::new(
            Arc::new(templates),
            Arc::new(instances),
            Arc::new(bus),
            config.fault_injection.build()?,
        ))
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    #[cfg(test)]
    pub(crate) fn held_locks(&self) -> usize {
        self.locks.len()
    }

    /// Record a server instance reporting in for its template
    pub async fn connect_server_instance(&self, instance: ServerInstance) -> Result<()> {
        let server_template_id = instance.key.server_template_id.clone();
        let _guard = self.locks.lock(&server_template_id).await;

        let mut template = self.load_required(&server_template_id).await?;
        template.add_server_instance(instance.key.clone());

        info!(
            server_template_id = %server_template_id,
            server_instance_id = instance.id(),
            containers = instance.containers.len(),
            "Server instance connected"
        );
        self.templates.save(template).await?;
        self.instances.register(instance).await?;
        Ok(())
    }

    /// Forget a server instance. Unknown instances are ignored.
    pub async fn disconnect_server_instance(&self, key: &ServerInstanceKey) -> Result<()> {
        let _guard = self.locks.lock(&key.server_template_id).await;

        if self.instances.remove(&key.server_instance_id).await?.is_none() {
            debug!(server_instance_id = %key.server_instance_id, "Unknown server instance");
            return Ok(());
        }

        if let Some(mut template) = self.templates.load(&key.server_template_id).await? {
            template.delete_server_instance(&key.server_instance_id);
            self.templates.save(template).await?;
        }

        info!(server_instance_id = %key.server_instance_id, "Server instance disconnected");
        Ok(())
    }

    /// Point a container spec at another version of the same artifact
    pub async fn version_upgrade(
        &self,
        container_spec_key: &ContainerSpecKey,
        version: &str,
    ) -> Result<()> {
        self.faults.tick(GuardedOperation::VersionUpgrade).check()?;
        require_non_empty("version", version)?;

        let server_template_id = container_spec_key.server_template_id();
        let _guard = self.locks.lock(server_template_id).await;

        let mut template = self.load_required(server_template_id).await?;
        let spec = template
            .container_spec_mut(&container_spec_key.id)
            .ok_or_else(|| ControllerError::spec_not_found(server_template_id, &container_spec_key.id))?;

        spec.release_id = spec.release_id.with_version(version);
        info!(
            container_spec = %container_spec_key,
            release_id = %spec.release_id,
            "Container spec release upgraded"
        );
        self.templates.save(template).await?;
        Ok(())
    }

    async fn load_required(&self, server_template_id: &str) -> Result<ServerTemplate> {
        self.templates
            .load(server_template_id)
            .await?
            .ok_or_else(|| ControllerError::template_not_found(server_template_id))
    }

    async fn set_container_status(
        &self,
        operation: GuardedOperation,
        container_spec_key: &ContainerSpecKey,
        status: ContainerStatus,
    ) -> Result<()> {
        self.faults.tick(operation).check()?;

        let server_template_id = container_spec_key.server_template_id();
        let _guard = self.locks.lock(server_template_id).await;

        let mut template = self.load_required(server_template_id).await?;
        let spec = template
            .container_spec_mut(&container_spec_key.id)
            .ok_or_else(|| ControllerError::spec_not_found(server_template_id, &container_spec_key.id))?;

        spec.status = status;
        info!(container_spec = %container_spec_key, %status, "Container spec status changed");
        self.templates.save(template).await?;
        Ok(())
    }

    /// Deliver an event for a write that already happened
    async fn notify(&self, event: TemplateEvent) {
        if let Err(e) = self.notifier.notify(event).await {
            warn!(error = %e, "Template notification failed after commit");
        }
    }
}

#[async_trait::async_trait]
impl SpecManagementService for ControllerService {
    async fn is_new_server_template_id_valid(&self, server_template_id: &str) -> Result<bool> {
        Ok(!self.templates.exists(server_template_id).await?)
    }

    async fn save_container_spec(
        &self,
        server_template_id: &str,
        container_spec: ContainerSpec,
    ) -> Result<()> {
        self.faults.tick(GuardedOperation::SaveContainerSpec).check()?;
        require_non_empty("container spec id", &container_spec.id)?;

        let _guard = self.locks.lock(server_template_id).await;

        let mut template = self.load_required(server_template_id).await?;
        if container_spec.server_template_key.id != template.id {
            return Err(ControllerError::InvalidArgument(format!(
                "container spec '{}' belongs to server template '{}', not '{}'",
                container_spec.id, container_spec.server_template_key.id, template.id
            )));
        }

        // Replace, never merge
        let replaced = template.delete_container_spec(&container_spec.id).is_some();
        info!(
            server_template_id,
            container_spec_id = %container_spec.id,
            replaced,
            "Container spec saved"
        );
        template.add_container_spec(container_spec);
        self.templates.save(template).await?;
        Ok(())
    }

    async fn save_server_template(&self, server_template: ServerTemplate) -> Result<()> {
        require_non_empty("server template id", &server_template.id)?;

        let ticket = self.faults.tick(GuardedOperation::SaveServerTemplate);
        let _guard = self.locks.lock(&server_template.id).await;

        if self.templates.exists(&server_template.id).await? {
            return Err(ControllerError::AlreadyExists(format!(
                "server template '{}'",
                server_template.id
            )));
        }
        ticket.check()?;

        let saved = self.templates.save(server_template).await?;
        info!(server_template_id = %saved.id, name = %saved.name, "Server template created");
        self.notify(TemplateEvent::updated(saved)).await;
        Ok(())
    }

    async fn get_server_template(
        &self,
        server_template_id: &str,
    ) -> Result<Option<ServerTemplate>> {
        debug!(server_template_id, "Loading server template");
        self.templates.load(server_template_id).await
    }

    async fn list_server_template_keys(&self) -> Result<Vec<ServerTemplateKey>> {
        self.templates.load_keys().await
    }

    async fn list_server_templates(&self) -> Result<Vec<ServerTemplate>> {
        self.templates.load_all().await
    }

    async fn list_container_specs(&self, server_template_id: &str) -> Result<Vec<ContainerSpec>> {
        Ok(self.load_required(server_template_id).await?.container_specs)
    }

    async fn delete_container_spec(
        &self,
        server_template_id: &str,
        container_spec_id: &str,
    ) -> Result<()> {
        let _guard = self.locks.lock(server_template_id).await;

        let mut template = self.load_required(server_template_id).await?;
        if template.delete_container_spec(container_spec_id).is_none() {
            debug!(server_template_id, container_spec_id, "Container spec already absent");
            return Ok(());
        }

        info!(server_template_id, container_spec_id, "Container spec deleted");
        self.templates.save(template).await?;
        Ok(())
    }

    async fn delete_server_template(&self, server_template_id: &str) -> Result<()> {
        let _guard = self.locks.lock(server_template_id).await;

        if self.templates.delete(server_template_id).await?.is_none() {
            debug!(server_template_id, "Server template already absent");
            return Ok(());
        }

        info!(server_template_id, "Server template deleted");
        self.notify(TemplateEvent::deleted(server_template_id)).await;
        Ok(())
    }

    async fn copy_server_template(
        &self,
        server_template_id: &str,
        new_server_template_id: &str,
        new_server_template_name: &str,
    ) -> Result<()> {
        require_non_empty("new server template id", new_server_template_id)?;

        let _guard = self.locks.lock(new_server_template_id).await;

        if self.templates.exists(new_server_template_id).await? {
            return Err(ControllerError::AlreadyExists(format!(
                "server template '{}'",
                new_server_template_id
            )));
        }
        let source = self.load_required(server_template_id).await?;

        let new_key = ServerTemplateKey::new(new_server_template_id, new_server_template_name);
        let copy = ServerTemplate {
            id: new_key.id.clone(),
            name: new_key.name.clone(),
            capabilities: source.capabilities.clone(),
            configs: source.configs.clone(),
            container_specs: source
                .container_specs
                .iter()
                .map(|spec| spec.copy_to(new_key.clone()))
                .collect(),
            server_instance_keys: Vec::new(),
        };

        let saved = self.templates.save(copy).await?;
        info!(
            source = server_template_id,
            server_template_id = %saved.id,
            container_specs = saved.container_specs.len(),
            "Server template copied"
        );
        self.notify(TemplateEvent::updated(saved)).await;
        Ok(())
    }

    async fn update_container_config(
        &self,
        server_template_id: &str,
        container_spec_id: &str,
        capability: Capability,
        container_config: ContainerConfig,
    ) -> Result<()> {
        require_non_empty("server template id", server_template_id)?;
        require_non_empty("container spec id", container_spec_id)?;
        if container_config.capability() != capability {
            return Err(ControllerError::InvalidArgument(format!(
                "{} configuration cannot be stored under capability {}",
                container_config.capability(),
                capability
            )));
        }

        self.faults.tick(GuardedOperation::UpdateContainerConfig).check()?;
        let _guard = self.locks.lock(server_template_id).await;

        let mut template = self.load_required(server_template_id).await?;
        let spec = template
            .container_spec_mut(container_spec_id)
            .ok_or_else(|| ControllerError::spec_not_found(server_template_id, container_spec_id))?;

        spec.set_config(container_config);
        info!(server_template_id, container_spec_id, %capability, "Container config updated");
        self.templates.save(template).await?;
        Ok(())
    }

    async fn update_server_template_config(
        &self,
        server_template_id: &str,
        capability: Capability,
        _server_config: ServerConfig,
    ) -> Result<()> {
        self.load_required(server_template_id).await?;
        debug!(
            server_template_id,
            %capability,
            "Server template config update accepted without changes"
        );
        Ok(())
    }

    async fn start_container(&self, container_spec_key: &ContainerSpecKey) -> Result<()> {
        self.set_container_status(
            GuardedOperation::StartContainer,
            container_spec_key,
            ContainerStatus::Started,
        )
        .await
    }

    async fn stop_container(&self, container_spec_key: &ContainerSpecKey) -> Result<()> {
        self.set_container_status(
            GuardedOperation::StopContainer,
            container_spec_key,
            ContainerStatus::Stopped,
        )
        .await
    }

    async fn is_container_id_valid(
        &self,
        server_template_id: &str,
        container_id: &str,
    ) -> Result<bool> {
        if !is_valid_identifier(container_id) {
            return Ok(false);
        }
        let template = self.load_required(server_template_id).await?;
        Ok(!template.has_container_spec(container_id))
    }
}

#[async_trait::async_trait]
impl RuntimeManagementService for ControllerService {
    async fn get_server_instances(
        &self,
        server_template_id: &str,
    ) -> Result<Vec<ServerInstanceKey>> {
        Ok(self
            .instances
            .instances()
            .await?
            .into_iter()
            .filter(|instance| instance.key.server_template_id == server_template_id)
            .map(|instance| instance.key)
            .collect())
    }

    async fn get_containers_for_instance(
        &self,
        server_instance_key: &ServerInstanceKey,
    ) -> Result<Vec<Container>> {
        self.instances.containers(server_instance_key).await
    }

    async fn get_containers(
        &self,
        container_spec_key: &ContainerSpecKey,
    ) -> Result<ContainerSpecData> {
        let server_template_id = container_spec_key.server_template_id();
        let template = self.load_required(server_template_id).await?;
        let container_spec = template
            .container_spec(&container_spec_key.id)
            .cloned()
            .ok_or_else(|| ControllerError::spec_not_found(server_template_id, &container_spec_key.id))?;

        let containers = self
            .instances
            .instances()
            .await?
            .into_iter()
            .flat_map(|instance| instance.containers)
            .filter(|container| {
                container.container_spec_id == container_spec_key.id
                    && container.server_template_id() == server_template_id
            })
            .collect();

        Ok(ContainerSpecData {
            container_spec,
            containers,
        })
    }
}

#[async_trait::async_trait]
impl RuleCapabilitiesService for ControllerService {
    async fn scan_now(&self, container_spec_key: &ContainerSpecKey) -> Result<()> {
        self.faults.tick(GuardedOperation::ScanNow).check()?;
        debug!(container_spec = %container_spec_key, "Scan requested");
        Ok(())
    }

    async fn start_scanner(
        &self,
        container_spec_key: &ContainerSpecKey,
        interval: u64,
    ) -> Result<()> {
        self.faults.tick(GuardedOperation::StartScanner).check()?;
        debug!(container_spec = %container_spec_key, interval, "Scanner start requested");
        Ok(())
    }

    async fn stop_scanner(&self, container_spec_key: &ContainerSpecKey) -> Result<()> {
        self.faults.tick(GuardedOperation::StopScanner).check()?;
        debug!(container_spec = %container_spec_key, "Scanner stop requested");
        Ok(())
    }

    async fn upgrade_container(
        &self,
        container_spec_key: &ContainerSpecKey,
        release_id: ReleaseId,
    ) -> Result<()> {
        debug!(
            container_spec = %container_spec_key,
            %release_id,
            "Container upgrade requested; releases change through version_upgrade"
        );
        Ok(())
    }
}

fn require_non_empty(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ControllerError::InvalidArgument(format!("{} is required", name)));
    }
    Ok(())
}
