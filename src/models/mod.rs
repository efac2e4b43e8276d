// Core domain models for the template controller
// Desired state (templates, container specs) and observed state (instances, containers)

//! # Domain Models Module
//!
//! Two families of records live here:
//!
//! - **Desired state**: [`ServerTemplate`] owns an ordered list of
//!   [`ContainerSpec`]s. This is what operators edit.
//! - **Observed state**: [`ServerInstance`] reports the [`Container`]s it is
//!   actually running. This is what servers tell us.
//!
//! The two families cross-reference each other by id only. A container points
//! at its spec via `container_spec_id` and at its template via the instance
//! key's `server_template_id`; nothing holds an ownership pointer across the
//! boundary.
//!
//! ## Rust Learning Notes:
//!
//! ### Re-exports for Clean APIs
//! The `pub use` statements at the bottom create a flat API. Users can import
//! `template_controller::models::ServerTemplate` instead of
//! `template_controller::models::template::ServerTemplate`.

// ServerTemplate, ServerTemplateKey, Capability, ServerConfig
pub mod template;

// ContainerSpec and its configuration sum type
pub mod container;

// ServerInstance, Container and diagnostics
pub mod runtime;

// Template lifecycle events
pub mod events;

pub use template::{Capability, ServerConfig, ServerTemplate, ServerTemplateKey};

pub use container::{
    ContainerConfig, ContainerSpec, ContainerSpecKey, ContainerStatus, MergeMode, ProcessConfig,
    ReleaseId, RuleConfig, RuntimeStrategy, ScannerStatus,
};

pub use runtime::{
    Container, ContainerSpecData, Message, ServerInstance, ServerInstanceKey, Severity,
};

pub use events::{TemplateEvent, TemplateEventKind};
