// Demo fleet
// One template with two container specs, observed on two server instances

//! Seed data for demos and tests.
//!
//! The fleet deliberately contains a bit of everything the UI has to render:
//! both config kinds, a spec deployed on two instances, diagnostics on an
//! instance and on a container, and a resolved release that differs from the
//! desired one.

use crate::models::{
    Capability, ContainerConfig, ContainerSpec, ContainerStatus, MergeMode, Message,
    ProcessConfig, ReleaseId, RuleConfig, RuntimeStrategy, ScannerStatus, ServerInstance,
    ServerInstanceKey, ServerTemplate, ServerTemplateKey, Severity,
};

pub const DEMO_TEMPLATE_ID: &str = "MyTemplate";
pub const DEMO_SPEC_1: &str = "MyContainer1";
pub const DEMO_SPEC_2: &str = "MyContainer2";

fn demo_template_key() -> ServerTemplateKey {
    ServerTemplateKey::new(DEMO_TEMPLATE_ID, DEMO_TEMPLATE_ID)
}

fn demo_spec(id: &str, kbase: &str, ksession: &str) -> ContainerSpec {
    ContainerSpec::new(
        id,
        id,
        demo_template_key(),
        ReleaseId::new("org.kie", "test", "LATEST"),
        ContainerStatus::Started,
    )
    .with_config(ContainerConfig::Rule(RuleConfig {
        poll_interval: Some(1000),
        scanner_status: ScannerStatus::Disposed,
    }))
    .with_config(ContainerConfig::Process(ProcessConfig {
        runtime_strategy: RuntimeStrategy::PerRequest,
        kbase: kbase.to_string(),
        ksession: ksession.to_string(),
        merge_mode: MergeMode::OverrideAll,
    }))
}

/// Server instances reporting for the demo template
pub fn demo_instances() -> Vec<ServerInstance> {
    let local = ServerInstance::new(
        ServerInstanceKey::new(DEMO_TEMPLATE_ID, "localhost", "127.0.0.1", "http://localhost:8080/"),
        "6.4.x",
    )
    .with_container(
        DEMO_SPEC_1,
        "container1",
        ReleaseId::new("org.kie", "test", "1.8.1"),
        Vec::new(),
    );

    let remote = ServerInstance::new(
        ServerInstanceKey::new(
            DEMO_TEMPLATE_ID,
            "kiedev-01",
            "10.37.119.252",
            "http://10.37.119.252:8080/",
        ),
        "6.4.x",
    )
    .with_message(Message::new(Severity::Error, "SUPER ERROR FAULT!"))
    .with_message(Message::new(Severity::Error, "SUPER ERROR FAULT2!"))
    .with_message(Message::new(Severity::Warn, "not responding!"))
    .with_container(
        DEMO_SPEC_1,
        "container2",
        ReleaseId::new("org.kie", "test", "1.8.1"),
        Vec::new(),
    )
    .with_container(
        DEMO_SPEC_2,
        "container2",
        ReleaseId::new("org.kie", "demo", "0.1.0"),
        vec![Message::new(Severity::Warn, "not responding!")],
    );

    vec![local, remote]
}

/// The demo template, already aware of its instances
pub fn demo_templates() -> Vec<ServerTemplate> {
    let mut template = ServerTemplate::new(DEMO_TEMPLATE_ID, DEMO_TEMPLATE_ID)
        .with_capability(Capability::Process)
        .with_capability(Capability::Rule)
        .with_container_spec(demo_spec(DEMO_SPEC_1, "my kbase", "default"))
        .with_container_spec(demo_spec(DEMO_SPEC_2, "xxxx", "yyyyy"));

    for instance in demo_instances() {
        template.add_server_instance(instance.key);
    }

    vec![template]
}
