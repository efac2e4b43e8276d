// Runtime models - observed state reported by running servers

//! # Runtime Models
//!
//! These types describe what execution servers actually report, as opposed to
//! what templates ask for. They are read-only observation records: the
//! controller never mutates a `Container`, it only stores and filters them.
//!
//! Containers point back to their spec and template by id only. A container
//! whose spec has since been deleted is simply stale.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::container::{ContainerSpec, ReleaseId};

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Diagnostic message attached to an instance or container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub severity: Severity,
    pub messages: Vec<String>,
}

impl Message {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            messages: vec![text.into()],
        }
    }
}

/// Identity of a running server instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerInstanceKey {
    pub server_template_id: String,
    pub server_name: String,
    pub server_instance_id: String,
    pub url: String,
}

impl ServerInstanceKey {
    /// The instance id is derived from the template id and the host
    pub fn new(
        server_template_id: impl Into<String>,
        server_name: impl Into<String>,
        host: impl AsRef<str>,
        url: impl Into<String>,
    ) -> Self {
        let server_template_id = server_template_id.into();
        let server_instance_id = format!("{}@{}", server_template_id, host.as_ref());
        Self {
            server_template_id,
            server_name: server_name.into(),
            server_instance_id,
            url: url.into(),
        }
    }
}

impl fmt::Display for ServerInstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.server_instance_id, self.url)
    }
}

/// Observed runtime deployment of one container spec on one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub container_spec_id: String,
    pub container_name: String,
    pub server_instance_key: ServerInstanceKey,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub resolved_release_id: ReleaseId,
    pub url: String,
}

impl Container {
    pub fn server_template_id(&self) -> &str {
        &self.server_instance_key.server_template_id
    }
}

/// Observed runtime host reporting which containers it runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInstance {
    pub key: ServerInstanceKey,
    pub version: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub containers: Vec<Container>,
}

impl ServerInstance {
    pub fn new(key: ServerInstanceKey, version: impl Into<String>) -> Self {
        Self {
            key,
            version: version.into(),
            messages: Vec::new(),
            containers: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Attach a container observed on this instance. The container's
    /// instance key is forced to this instance's key.
    pub fn with_container(
        mut self,
        container_spec_id: impl Into<String>,
        container_name: impl Into<String>,
        resolved_release_id: ReleaseId,
        messages: Vec<Message>,
    ) -> Self {
        let container_name = container_name.into();
        let url = format!("{}{}", self.key.url, container_name);
        self.containers.push(Container {
            container_spec_id: container_spec_id.into(),
            container_name,
            server_instance_key: self.key.clone(),
            messages,
            resolved_release_id,
            url,
        });
        self
    }

    pub fn id(&self) -> &str {
        &self.key.server_instance_id
    }
}

/// A container spec together with every container observed for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpecData {
    pub container_spec: ContainerSpec,
    pub containers: Vec<Container>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_id_is_derived_from_template_and_host() {
        let key = ServerInstanceKey::new("tpl", "kiedev-01", "10.0.0.7", "http://10.0.0.7:8080/");
        assert_eq!(key.server_instance_id, "tpl@10.0.0.7");
        assert_eq!(key.server_name, "kiedev-01");
    }

    #[test]
    fn test_with_container_binds_instance_key_and_url() {
        let key = ServerInstanceKey::new("tpl", "local", "127.0.0.1", "http://localhost:8080/");
        let instance = ServerInstance::new(key.clone(), "7.0").with_container(
            "orders",
            "orders-1",
            ReleaseId::new("org.example", "orders", "1.0.0"),
            vec![Message::new(Severity::Warn, "not responding!")],
        );

        let container = &instance.containers[0];
        assert_eq!(container.server_instance_key, key);
        assert_eq!(container.server_template_id(), "tpl");
        assert_eq!(container.url, "http://localhost:8080/orders-1");
        assert_eq!(container.messages[0].severity, Severity::Warn);
    }
}
