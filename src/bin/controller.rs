//! Template Controller CLI
//!
//! Operator tool for inspecting and editing server templates against an
//! in-memory controller. Unless `--empty` is given the controller starts with
//! the demo fleet, so every command has something to work on.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dotenv::dotenv;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use template_controller::engine::run_concurrent_workload;
use template_controller::{
    ContainerSpecKey, ControllerConfig, ControllerService, EventBus, RuntimeManagementService,
    ServerTemplate, ServerTemplateKey, Severity, SpecManagementService, TemplateEvent,
    TemplateEventKind,
};

#[derive(Parser)]
#[command(name = "controller")]
#[command(about = "Template Controller CLI - Inspect and manage server templates")]
#[command(version = "1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./controller.toml when present)
    #[arg(long, env = "CONTROLLER_CONFIG")]
    config: Option<PathBuf>,

    /// Start without the demo fleet
    #[arg(long)]
    empty: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List server templates
    List,

    /// Show one server template as JSON
    Show {
        /// Server template ID
        server_template_id: String,
    },

    /// Copy a server template under a new id and name
    Copy {
        /// Source server template ID
        server_template_id: String,

        /// ID of the copy
        new_server_template_id: String,

        /// Name of the copy
        new_server_template_name: String,
    },

    /// Delete a server template
    Delete {
        /// Server template ID to delete
        server_template_id: String,

        /// Confirm the deletion
        #[arg(long)]
        confirm: bool,
    },

    /// List server instances connected to a template
    Instances {
        /// Server template ID
        server_template_id: String,
    },

    /// Show every running container deployed from a container spec
    Containers {
        /// Server template ID
        server_template_id: String,

        /// Container spec ID
        container_spec_id: String,
    },

    /// Run the concurrent workload against a fresh template
    Stress {
        /// Number of concurrent workers
        #[arg(long, default_value_t = 200)]
        workers: usize,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 300)]
        deadline_secs: u64,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; loaded before the config so CONTROLLER__* entries apply
    let env_file = dotenv();

    let cli = Cli::parse();
    let mut config = ControllerConfig::load(cli.config.as_deref())?;
    config.seed_demo_data = !cli.empty;

    // RUST_LOG wins over the configured level; --verbose wins over both
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = env_file {
        debug!("No .env file loaded: {}", e);
    }

    let bus = EventBus::with_capacity(config.event_buffer_size);
    let listener = spawn_event_listener(bus.subscribe());
    let controller = ControllerService::from_config(&config, bus)?;

    let outcome = run(cli.command, &controller, &config).await;

    // Dropping the last sender lets the listener drain and exit
    drop(controller);
    listener.await?;
    outcome
}

async fn run(
    command: Commands,
    controller: &ControllerService,
    config: &ControllerConfig,
) -> Result<()> {
    match command {
        Commands::List => list_templates(controller).await?,

        Commands::Show { server_template_id } => {
            match controller.get_server_template(&server_template_id).await? {
                Some(template) => println!("{}", serde_json::to_string_pretty(&template)?),
                None => bail!("server template '{}' not found", server_template_id),
            }
        }

        Commands::Copy {
            server_template_id,
            new_server_template_id,
            new_server_template_name,
        } => {
            controller
                .copy_server_template(
                    &server_template_id,
                    &new_server_template_id,
                    &new_server_template_name,
                )
                .await?;
            println!(
                "{} {} -> {}",
                "Copied".green().bold(),
                server_template_id,
                new_server_template_id
            );
            list_templates(controller).await?;
        }

        Commands::Delete {
            server_template_id,
            confirm,
        } => {
            if !confirm {
                bail!("Delete operation requires --confirm flag for safety");
            }
            controller.delete_server_template(&server_template_id).await?;
            println!("{} {}", "Deleted".red().bold(), server_template_id);
        }

        Commands::Instances { server_template_id } => {
            list_instances(controller, &server_template_id).await?
        }

        Commands::Containers {
            server_template_id,
            container_spec_id,
        } => show_containers(controller, &server_template_id, &container_spec_id).await?,

        Commands::Stress {
            workers,
            deadline_secs,
        } => run_stress(workers, Duration::from_secs(deadline_secs)).await?,

        Commands::Config => println!("{}", serde_json::to_string_pretty(config)?),
    }

    Ok(())
}

fn spawn_event_listener(mut events: broadcast::Receiver<TemplateEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match &event.kind {
                    TemplateEventKind::Updated { template } => info!(
                        event_id = %event.id,
                        server_template_id = %template.id,
                        "Template updated"
                    ),
                    TemplateEventKind::Deleted { server_template_id } => info!(
                        event_id = %event.id,
                        server_template_id = %server_template_id,
                        "Template deleted"
                    ),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn list_templates(controller: &ControllerService) -> Result<()> {
    let mut templates = controller.list_server_templates().await?;
    templates.sort_by(|left, right| left.id.cmp(&right.id));

    println!("{}", "Server Templates:".bold());
    if templates.is_empty() {
        println!("  (none)");
    }
    for template in &templates {
        println!(
            "  {} {} [{}] specs={} instances={}",
            template.id.cyan(),
            template.name,
            template.capabilities.join(", "),
            template.container_specs.len(),
            template.server_instance_keys.len()
        );
    }
    Ok(())
}

async fn list_instances(controller: &ControllerService, server_template_id: &str) -> Result<()> {
    let instances = controller.get_server_instances(server_template_id).await?;

    println!("{} {}", "Server Instances for".bold(), server_template_id.cyan());
    if instances.is_empty() {
        println!("  (none)");
    }
    for key in &instances {
        let containers = controller.get_containers_for_instance(key).await?;
        println!(
            "  {} {} containers={}",
            key.server_instance_id.cyan(),
            key.url,
            containers.len()
        );
    }
    Ok(())
}

async fn show_containers(
    controller: &ControllerService,
    server_template_id: &str,
    container_spec_id: &str,
) -> Result<()> {
    let template_key = match controller.get_server_template(server_template_id).await? {
        Some(template) => template.key(),
        None => ServerTemplateKey::new(server_template_id, server_template_id),
    };
    let spec_key = ContainerSpecKey::new(container_spec_id, container_spec_id, template_key);
    let data = controller.get_containers(&spec_key).await?;

    println!(
        "{} {} ({}, {})",
        "Container Spec".bold(),
        data.container_spec.id.cyan(),
        data.container_spec.release_id,
        data.container_spec.status
    );
    if data.containers.is_empty() {
        println!("  (no running containers)");
    }
    for container in &data.containers {
        println!(
            "  {} on {} resolved {}",
            container.container_name,
            container.server_instance_key.server_instance_id.cyan(),
            container.resolved_release_id
        );
        for message in &container.messages {
            let label = match message.severity {
                Severity::Info => "INFO".normal(),
                Severity::Warn => "WARN".yellow(),
                Severity::Error => "ERROR".red(),
            };
            for text in &message.messages {
                println!("    {} {}", label, text);
            }
        }
    }
    Ok(())
}

async fn run_stress(workers: usize, deadline: Duration) -> Result<()> {
    let controller = Arc::new(ControllerService::in_memory());
    controller
        .save_server_template(ServerTemplate::new("stress", "Stress"))
        .await?;

    info!(workers, "Starting concurrent workload");
    let report = run_concurrent_workload(controller, "stress", workers, deadline).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.is_clean() && report.stale_containers == 0 {
        println!("{}", "Workload clean".green().bold());
        Ok(())
    } else {
        bail!(
            "workload finished with {} errors and {} stale containers",
            report.errors.len(),
            report.stale_containers
        )
    }
}
