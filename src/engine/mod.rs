// Template Controller Engine
// Stores, fault injection, notifications and the management facade

//! # Engine Module
//!
//! The engine sits between the domain models and whatever transport exposes
//! the controller to clients.
//!
//! ## Engine Components
//!
//! ### Storage (`storage`, `instances`)
//! - `TemplateStorage`: desired state, keyed by template id
//! - `InstanceManager`: observed state, keyed by server instance id
//! - In-memory implementations of both for development and tests
//!
//! ### Fault Injection (`faults`)
//! - Deterministic per-operation failures for exercising client retries
//!
//! ### Event System (`events`)
//! - Template updated / deleted notifications over a broadcast channel
//!
//! ### Controller (`controller`)
//! - The management facade; serializes writes per template (`locks`)
//!
//! ### Workload (`workload`)
//! - Concurrent stress run with a consistency check afterwards

/// Storage abstraction for server templates
pub mod storage;

/// Storage abstraction for server instances
pub mod instances;

/// Fault injection policies and per-operation counters
pub mod faults;

/// Template lifecycle notifications
pub mod events;

/// Per-template write locks
pub mod locks;

/// Container id validation
pub mod validation;

/// Management facade and its service traits
pub mod controller;

/// Concurrent workload runner
pub mod workload;

pub use controller::{
    ControllerService, RuleCapabilitiesService, RuntimeManagementService, SpecManagementService,
};
pub use events::{EventBus, TemplateNotifier};
pub use faults::{EveryNthCall, FaultInjector, FaultPolicy, FnPolicy, GuardedOperation, NeverFail};
pub use instances::{InMemoryInstanceManager, InstanceManager};
pub use storage::{InMemoryTemplateStorage, TemplateStorage};
pub use workload::{run_concurrent_workload, WorkloadReport};


#[cfg(test)]
mod concurrency_tests;
