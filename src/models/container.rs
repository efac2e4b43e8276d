// Container specs - desired state for one deployable unit

//! # Container Spec Models
//!
//! A `ContainerSpec` says which release of a knowledge artifact a template
//! should run, whether it should be started, and how each capability is
//! configured for it.
//!
//! ## Rust Learning Notes:
//!
//! ### Sum Types Instead of Runtime Type Checks
//! Container configuration comes in two shapes (rule and process). Rather than
//! a base type with runtime downcasts, `ContainerConfig` is an enum. Copying
//! or updating a config is an exhaustive `match`, so the compiler tells us
//! when a new kind of configuration is added and not handled.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::template::{Capability, ServerTemplateKey};

/// Maven-style release coordinate (group / artifact / version)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReleaseId {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl ReleaseId {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
        }
    }

    /// Same group and artifact, different version
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

/// Desired status of a container spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerStatus {
    Started,
    Stopped,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerStatus::Started => f.write_str("STARTED"),
            ContainerStatus::Stopped => f.write_str("STOPPED"),
        }
    }
}

/// State of the artifact scanner attached to a rule container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScannerStatus {
    Unknown,
    Created,
    Started,
    Scanning,
    Stopped,
    Disposed,
}

/// How process runtimes are allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuntimeStrategy {
    Singleton,
    PerRequest,
    PerProcessInstance,
}

/// How deployment descriptors are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeMode {
    KeepAll,
    OverrideAll,
    OverrideEmpty,
    MergeCollections,
}

/// Rule capability configuration for one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Scanner poll interval in milliseconds
    pub poll_interval: Option<u64>,
    pub scanner_status: ScannerStatus,
}

/// Process capability configuration for one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConfig {
    pub runtime_strategy: RuntimeStrategy,
    pub kbase: String,
    pub ksession: String,
    pub merge_mode: MergeMode,
}

/// Container-level configuration, tagged by kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContainerConfig {
    Rule(RuleConfig),
    Process(ProcessConfig),
}

impl ContainerConfig {
    /// The capability this configuration belongs to
    pub fn capability(&self) -> Capability {
        match self {
            ContainerConfig::Rule(_) => Capability::Rule,
            ContainerConfig::Process(_) => Capability::Process,
        }
    }
}

/// Identity of a container spec plus the template it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerSpecKey {
    pub id: String,
    pub container_name: String,
    pub server_template_key: ServerTemplateKey,
}

impl ContainerSpecKey {
    pub fn new(
        id: impl Into<String>,
        container_name: impl Into<String>,
        server_template_key: ServerTemplateKey,
    ) -> Self {
        Self {
            id: id.into(),
            container_name: container_name.into(),
            server_template_key,
        }
    }

    pub fn server_template_id(&self) -> &str {
        &self.server_template_key.id
    }
}

impl fmt::Display for ContainerSpecKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.server_template_key.id, self.id)
    }
}

/// Desired-state record for one deployable unit within a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub id: String,
    pub container_name: String,
    pub server_template_key: ServerTemplateKey,
    pub release_id: ReleaseId,
    pub status: ContainerStatus,

    /// At most one configuration per capability
    #[serde(default)]
    pub configs: HashMap<Capability, ContainerConfig>,
}

impl ContainerSpec {
    pub fn new(
        id: impl Into<String>,
        container_name: impl Into<String>,
        server_template_key: ServerTemplateKey,
        release_id: ReleaseId,
        status: ContainerStatus,
    ) -> Self {
        Self {
            id: id.into(),
            container_name: container_name.into(),
            server_template_key,
            release_id,
            status,
            configs: HashMap::new(),
        }
    }

    /// Builder-style helper; the config is stored under its own capability
    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.set_config(config);
        self
    }

    /// Store a config under the capability its variant implies,
    /// replacing whatever was there before.
    pub fn set_config(&mut self, config: ContainerConfig) -> Option<ContainerConfig> {
        self.configs.insert(config.capability(), config)
    }

    pub fn config(&self, capability: Capability) -> Option<&ContainerConfig> {
        self.configs.get(&capability)
    }

    pub fn key(&self) -> ContainerSpecKey {
        ContainerSpecKey::new(
            self.id.clone(),
            self.container_name.clone(),
            self.server_template_key.clone(),
        )
    }

    /// Deep copy re-keyed to another template
    pub fn copy_to(&self, server_template_key: ServerTemplateKey) -> ContainerSpec {
        let configs = self
            .configs
            .iter()
            .map(|(capability, config)| (*capability, copy_config(config)))
            .collect();

        ContainerSpec {
            id: self.id.clone(),
            container_name: self.container_name.clone(),
            server_template_key,
            release_id: self.release_id.clone(),
            status: self.status,
            configs,
        }
    }
}

fn copy_config(config: &ContainerConfig) -> ContainerConfig {
    match config {
        ContainerConfig::Rule(rule) => ContainerConfig::Rule(RuleConfig {
            poll_interval: rule.poll_interval,
            scanner_status: rule.scanner_status,
        }),
        ContainerConfig::Process(process) => ContainerConfig::Process(ProcessConfig {
            runtime_strategy: process.runtime_strategy,
            kbase: process.kbase.clone(),
            ksession: process.ksession.clone(),
            merge_mode: process.merge_mode,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule_config() -> ContainerConfig {
        ContainerConfig::Rule(RuleConfig {
            poll_interval: Some(1000),
            scanner_status: ScannerStatus::Disposed,
        })
    }

    fn process_config() -> ContainerConfig {
        ContainerConfig::Process(ProcessConfig {
            runtime_strategy: RuntimeStrategy::PerRequest,
            kbase: "kbase".to_string(),
            ksession: "default".to_string(),
            merge_mode: MergeMode::OverrideAll,
        })
    }

    #[test]
    fn test_config_is_stored_under_its_capability() {
        let mut spec = ContainerSpec::new(
            "orders",
            "Orders",
            ServerTemplateKey::new("tpl", "Template"),
            ReleaseId::new("org.example", "orders", "1.0.0"),
            ContainerStatus::Started,
        )
        .with_config(rule_config());

        assert!(spec.config(Capability::Rule).is_some());
        assert!(spec.config(Capability::Process).is_none());

        let replaced = spec.set_config(ContainerConfig::Rule(RuleConfig {
            poll_interval: None,
            scanner_status: ScannerStatus::Started,
        }));
        assert_eq!(replaced, Some(rule_config()));
        assert_eq!(spec.configs.len(), 1);
    }

    #[test]
    fn test_copy_to_rekeys_and_keeps_configs() {
        let spec = ContainerSpec::new(
            "orders",
            "Orders",
            ServerTemplateKey::new("tpl", "Template"),
            ReleaseId::new("org.example", "orders", "1.0.0"),
            ContainerStatus::Started,
        )
        .with_config(rule_config())
        .with_config(process_config());

        let copy = spec.copy_to(ServerTemplateKey::new("tpl-2", "Copy"));

        assert_eq!(copy.id, spec.id);
        assert_eq!(copy.server_template_key.id, "tpl-2");
        assert_eq!(copy.configs, spec.configs);
        assert_eq!(copy.release_id, spec.release_id);
    }

    #[test]
    fn test_container_config_serializes_with_kind_tag() {
        let value = serde_json::to_value(rule_config()).unwrap();
        assert_eq!(
            value,
            json!({"kind": "rule", "poll_interval": 1000, "scanner_status": "DISPOSED"})
        );
    }

    #[test]
    fn test_release_with_version() {
        let release = ReleaseId::new("org.example", "orders", "1.0.0");
        let upgraded = release.with_version("1.1.0");
        assert_eq!(upgraded.to_string(), "org.example:orders:1.1.0");
    }
}
