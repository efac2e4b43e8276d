// Template Controller
// Control-plane backend for a fleet of rule/process execution servers

//! # Template Controller Library
//!
//! This crate tracks **server templates** (the desired shape of a group of
//! execution servers), the **container specs** each template should run, and
//! the **server instances** that report what they actually run.
//!
//! ## Core Components
//!
//! ### Domain Models
//! - [`ServerTemplate`] / [`ContainerSpec`]: desired state, edited by operators
//! - [`ServerInstance`] / [`Container`]: observed state, reported by servers
//!
//! ### Engine
//! - [`InMemoryTemplateStorage`]: keyed template store behind [`TemplateStorage`]
//! - [`InMemoryInstanceManager`]: keyed instance store behind [`InstanceManager`]
//! - [`FaultInjector`]: deterministic per-operation failure injection
//! - [`EventBus`]: template-updated / template-deleted notifications
//! - [`ControllerService`]: the management facade implementing
//!   [`SpecManagementService`], [`RuntimeManagementService`] and
//!   [`RuleCapabilitiesService`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use template_controller::{ControllerService, ServerTemplate, SpecManagementService};
//!
//! # async fn run() -> template_controller::Result<()> {
//! let controller = ControllerService::in_memory();
//! controller
//!     .save_server_template(ServerTemplate::new("sales", "Sales"))
//!     .await?;
//! assert!(!controller.is_new_server_template_id_valid("sales").await?);
//! # Ok(())
//! # }
//! ```

// Domain models - desired and observed state
pub mod models;

// Stores, fault injection, notifications and the management facade
pub mod engine;

// Layered configuration (defaults, file, environment)
pub mod config;

// Demo fleet used by the admin CLI and tests
pub mod fixtures;

pub use models::{
    Capability, Container, ContainerConfig, ContainerSpec, ContainerSpecData, ContainerSpecKey,
    ContainerStatus, MergeMode, Message, ProcessConfig, ReleaseId, RuleConfig, RuntimeStrategy,
    ScannerStatus, ServerConfig, ServerInstance, ServerInstanceKey, ServerTemplate,
    ServerTemplateKey, Severity, TemplateEvent, TemplateEventKind,
};

pub use engine::{
    controller::{
        ControllerService, RuleCapabilitiesService, RuntimeManagementService,
        SpecManagementService,
    },
    events::{EventBus, TemplateNotifier},
    faults::{EveryNthCall, FaultInjector, FaultPolicy, GuardedOperation, NeverFail},
    instances::{InMemoryInstanceManager, InstanceManager},
    storage::{InMemoryTemplateStorage, TemplateStorage},
};

pub use config::{ControllerConfig, FaultInjectionConfig};

// Core error types
// Using the `thiserror` crate to make error handling easier
use thiserror::Error;

/// Errors returned by controller operations
///
/// Every failure is scoped to the single call that produced it. None of them
/// leaves a partially applied mutation behind.
#[derive(Error, Debug)]
pub enum ControllerError {
    /// A referenced template, container spec or instance does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create or copy with an id that is already taken
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A required argument is missing or malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Injected transient fault; callers are expected to retry
    #[error("Transient failure in {operation} (call #{call})")]
    Transient { operation: String, call: u64 },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ControllerError {
    /// Only injected faults are worth retrying as-is
    pub fn is_retryable(&self) -> bool {
        matches!(self, ControllerError::Transient { .. })
    }

    pub(crate) fn template_not_found(server_template_id: &str) -> Self {
        ControllerError::NotFound(format!("server template '{}'", server_template_id))
    }

    pub(crate) fn spec_not_found(server_template_id: &str, container_spec_id: &str) -> Self {
        ControllerError::NotFound(format!(
            "container spec '{}' in server template '{}'",
            container_spec_id, server_template_id
        ))
    }
}

/// Type alias for Results that use our custom error type
pub type Result<T> = std::result::Result<T, ControllerError>;
