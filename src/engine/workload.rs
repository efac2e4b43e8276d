// Concurrent workload against a shared template
// Used by the stress tests and the `controller stress` command

//! # Concurrent Workload
//!
//! Hammers one template with a mix of writers and readers and then checks
//! that nothing failed and that the stores still agree with each other.
//!
//! Worker `i` does one of three things depending on `i % 3`:
//!
//! - `0`: **save** a container spec (replace semantics)
//! - `1`: **invalidate** a spec's rule config by rewriting it
//! - `2`: **assert** that every spec in a snapshot is well formed
//!
//! The acceptance bar is zero errors across all workers within the deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info};

use crate::models::{
    Capability, ContainerConfig, ContainerSpec, ContainerStatus, ReleaseId, RuleConfig,
    ScannerStatus, ServerTemplateKey,
};
use crate::{ControllerError, Result};

use super::controller::{ControllerService, RuntimeManagementService, SpecManagementService};

/// Number of distinct spec ids the workers rotate through
const SPEC_POOL: usize = 5;

/// What a finished workload run looked like
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkloadReport {
    pub workers: usize,
    pub saves: usize,
    pub invalidations: usize,
    pub assertions: usize,
    pub errors: Vec<String>,
    /// Containers reported by instances whose spec or template no longer exists
    pub stale_containers: usize,
    pub elapsed_ms: u128,
}

impl WorkloadReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

fn spec_id(worker: usize) -> String {
    format!("spec_{}", worker % SPEC_POOL)
}

/// Run `workers` concurrent operations against `server_template_id`.
///
/// The template must already exist. Fails with `Internal` if the run does
/// not finish before `deadline`.
pub async fn run_concurrent_workload(
    controller: Arc<ControllerService>,
    server_template_id: &str,
    workers: usize,
    deadline: Duration,
) -> Result<WorkloadReport> {
    let template = controller
        .get_server_template(server_template_id)
        .await?
        .ok_or_else(|| ControllerError::template_not_found(server_template_id))?;
    let template_key = template.key();

    // Seed the spec pool so invalidations always have a target
    for slot in 0..SPEC_POOL {
        controller
            .save_container_spec(server_template_id, workload_spec(&spec_id(slot), &template_key, 0))
            .await?;
    }

    let started = Instant::now();
    let tasks = (0..workers).map(|worker| {
        let controller = controller.clone();
        let template_key = template_key.clone();
        tokio::spawn(async move { run_worker(&controller, &template_key, worker).await })
    });

    let outcomes = tokio::time::timeout(deadline, join_all(tasks))
        .await
        .map_err(|_| {
            ControllerError::Internal(format!("workload did not finish within {:?}", deadline))
        })?;

    let mut report = WorkloadReport {
        workers,
        ..Default::default()
    };
    for (worker, outcome) in outcomes.into_iter().enumerate() {
        match worker % 3 {
            0 => report.saves += 1,
            1 => report.invalidations += 1,
            _ => report.assertions += 1,
        }
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => report.errors.push(format!("worker {}: {}", worker, e)),
            Err(join) => report.errors.push(format!("worker {} panicked: {}", worker, join)),
        }
    }

    report.stale_containers = count_stale_containers(&controller).await?;
    report.elapsed_ms = started.elapsed().as_millis();

    if report.is_clean() {
        info!(workers, elapsed_ms = report.elapsed_ms as u64, "Workload finished cleanly");
    } else {
        error!(workers, errors = report.errors.len(), "Workload finished with errors");
    }
    Ok(report)
}

async fn run_worker(
    controller: &ControllerService,
    template_key: &ServerTemplateKey,
    worker: usize,
) -> Result<()> {
    let spec_id = spec_id(worker);
    match worker % 3 {
        0 => {
            controller
                .save_container_spec(&template_key.id, workload_spec(&spec_id, template_key, worker))
                .await
        }
        1 => {
            controller
                .update_container_config(
                    &template_key.id,
                    &spec_id,
                    Capability::Rule,
                    ContainerConfig::Rule(RuleConfig {
                        poll_interval: Some(worker as u64),
                        scanner_status: ScannerStatus::Stopped,
                    }),
                )
                .await
        }
        _ => {
            let specs = controller.list_container_specs(&template_key.id).await?;
            assert_specs_consistent(&specs, template_key)
        }
    }
}

fn workload_spec(id: &str, template_key: &ServerTemplateKey, worker: usize) -> ContainerSpec {
    ContainerSpec::new(
        id,
        id,
        template_key.clone(),
        ReleaseId::new("org.example", "workload", format!("1.0.{}", worker)),
        ContainerStatus::Started,
    )
    .with_config(ContainerConfig::Rule(RuleConfig {
        poll_interval: Some(1000),
        scanner_status: ScannerStatus::Started,
    }))
}

/// Spec ids unique, every spec owned by this template, configs keyed correctly
fn assert_specs_consistent(specs: &[ContainerSpec], template_key: &ServerTemplateKey) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for spec in specs {
        if !seen.insert(spec.id.as_str()) {
            return Err(ControllerError::Internal(format!("duplicate container spec '{}'", spec.id)));
        }
        if spec.server_template_key.id != template_key.id {
            return Err(ControllerError::Internal(format!(
                "container spec '{}' owned by '{}'",
                spec.id, spec.server_template_key.id
            )));
        }
        if let Some((capability, _)) = spec
            .configs
            .iter()
            .find(|(capability, config)| config.capability() != **capability)
        {
            return Err(ControllerError::Internal(format!(
                "container spec '{}' has a mismatched {} config",
                spec.id, capability
            )));
        }
    }
    Ok(())
}

/// Count containers whose spec no longer resolves to an existing template's spec
pub async fn count_stale_containers(controller: &ControllerService) -> Result<usize> {
    let mut stale = 0;
    for key in controller.list_server_template_keys().await? {
        // Deleted between listing and loading: its instances are stale as a whole
        let Some(template) = controller.get_server_template(&key.id).await? else {
            continue;
        };
        for instance_key in controller.get_server_instances(&key.id).await? {
            for container in controller.get_containers_for_instance(&instance_key).await? {
                if !template.has_container_spec(&container.container_spec_id) {
                    stale += 1;
                }
            }
        }
    }
    Ok(stale)
}
