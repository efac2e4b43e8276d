// Server templates - desired state for a group of execution servers

//! # Server Template Models
//!
//! A **server template** describes what a group of rule/process execution
//! servers should look like: which capabilities they offer, which
//! server-level configuration each capability carries and which container
//! specs they are expected to run.
//!
//! Templates own their container specs. Server instances are only referenced
//! by key, because instances are observed state that comes and goes on its own.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::container::ContainerSpec;
use super::runtime::ServerInstanceKey;

/// Capabilities a server template can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    /// Rule evaluation (knowledge bases, scanners)
    Rule,
    /// Process execution (runtime strategies, sessions)
    Process,
    /// Constraint planning
    Planning,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Rule => "RULE",
            Capability::Process => "PROCESS",
            Capability::Planning => "PLANNING",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-level configuration attached to a capability.
///
/// The management surface never interprets these values; they are carried
/// along and copied verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// Identity of a server template
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerTemplateKey {
    pub id: String,
    pub name: String,
}

impl ServerTemplateKey {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ServerTemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.name)
    }
}

/// Desired-state record for a named group of server containers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerTemplate {
    pub id: String,
    pub name: String,

    /// Capability names offered by servers built from this template
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Server-level configuration, at most one per capability
    #[serde(default)]
    pub configs: HashMap<Capability, ServerConfig>,

    /// Container specs in insertion order
    #[serde(default)]
    pub container_specs: Vec<ContainerSpec>,

    /// Keys of the server instances known to run this template
    #[serde(default)]
    pub server_instance_keys: Vec<ServerInstanceKey>,
}

impl ServerTemplate {
    /// Create an empty template with no capabilities and no specs
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capabilities: Vec::new(),
            configs: HashMap::new(),
            container_specs: Vec::new(),
            server_instance_keys: Vec::new(),
        }
    }

    /// Builder-style helper for adding a capability
    pub fn with_capability(mut self, capability: Capability) -> Self {
        let name = capability.to_string();
        if !self.capabilities.contains(&name) {
            self.capabilities.push(name);
        }
        self
    }

    /// Builder-style helper for adding a container spec
    pub fn with_container_spec(mut self, spec: ContainerSpec) -> Self {
        self.add_container_spec(spec);
        self
    }

    pub fn key(&self) -> ServerTemplateKey {
        ServerTemplateKey::new(self.id.clone(), self.name.clone())
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.iter().any(|c| c == capability.as_str())
    }

    pub fn container_spec(&self, spec_id: &str) -> Option<&ContainerSpec> {
        self.container_specs.iter().find(|spec| spec.id == spec_id)
    }

    pub fn container_spec_mut(&mut self, spec_id: &str) -> Option<&mut ContainerSpec> {
        self.container_specs.iter_mut().find(|spec| spec.id == spec_id)
    }

    pub fn has_container_spec(&self, spec_id: &str) -> bool {
        self.container_spec(spec_id).is_some()
    }

    /// Append a container spec. Callers that want replace semantics
    /// delete the old spec first.
    pub fn add_container_spec(&mut self, spec: ContainerSpec) {
        self.container_specs.push(spec);
    }

    /// Remove a container spec, returning it if it was present
    pub fn delete_container_spec(&mut self, spec_id: &str) -> Option<ContainerSpec> {
        let position = self.container_specs.iter().position(|spec| spec.id == spec_id)?;
        Some(self.container_specs.remove(position))
    }

    /// Record a server instance as belonging to this template (idempotent)
    pub fn add_server_instance(&mut self, key: ServerInstanceKey) {
        if !self
            .server_instance_keys
            .iter()
            .any(|existing| existing.server_instance_id == key.server_instance_id)
        {
            self.server_instance_keys.push(key);
        }
    }

    pub fn delete_server_instance(&mut self, server_instance_id: &str) -> bool {
        let before = self.server_instance_keys.len();
        self.server_instance_keys
            .retain(|key| key.server_instance_id != server_instance_id);
        before != self.server_instance_keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContainerStatus, ReleaseId};

    fn spec(id: &str) -> ContainerSpec {
        ContainerSpec::new(
            id,
            id,
            ServerTemplateKey::new("tpl", "Template"),
            ReleaseId::new("org.example", "rules", "1.0.0"),
            ContainerStatus::Stopped,
        )
    }

    #[test]
    fn test_delete_then_add_keeps_single_spec() {
        let mut template = ServerTemplate::new("tpl", "Template")
            .with_container_spec(spec("a"))
            .with_container_spec(spec("b"));

        assert!(template.delete_container_spec("a").is_some());
        template.add_container_spec(spec("a"));

        assert_eq!(template.container_specs.len(), 2);
        assert_eq!(template.container_specs[1].id, "a");
        assert!(template.delete_container_spec("missing").is_none());
    }

    #[test]
    fn test_capabilities_are_not_duplicated() {
        let template = ServerTemplate::new("tpl", "Template")
            .with_capability(Capability::Rule)
            .with_capability(Capability::Rule)
            .with_capability(Capability::Process);

        assert_eq!(template.capabilities, vec!["RULE", "PROCESS"]);
        assert!(template.has_capability(Capability::Process));
        assert!(!template.has_capability(Capability::Planning));
    }

    #[test]
    fn test_server_instance_keys_are_idempotent() {
        let mut template = ServerTemplate::new("tpl", "Template");
        let key = ServerInstanceKey::new("tpl", "host-1", "10.0.0.1", "http://10.0.0.1:8080/");

        template.add_server_instance(key.clone());
        template.add_server_instance(key.clone());
        assert_eq!(template.server_instance_keys.len(), 1);

        assert!(template.delete_server_instance(&key.server_instance_id));
        assert!(!template.delete_server_instance(&key.server_instance_id));
    }
}
