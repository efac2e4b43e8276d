// Concurrency tests for the management facade
use crate::{
    engine::{
        run_concurrent_workload, workload::count_stale_containers, ControllerService,
        EventBus, FaultInjector, InMemoryInstanceManager, InMemoryTemplateStorage,
        SpecManagementService,
    },
    fixtures::{demo_instances, demo_templates, DEMO_SPEC_1, DEMO_TEMPLATE_ID},
    models::{ContainerSpec, ContainerStatus, ReleaseId, ServerTemplate, ServerTemplateKey},
    ControllerError,
};

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

const DEADLINE: Duration = Duration::from_secs(300);

fn demo_controller() -> Arc<ControllerService> {
    Arc::new(ControllerService::new(
        Arc::new(InMemoryTemplateStorage::with_templates(demo_templates())),
        Arc::new(InMemoryInstanceManager::with_instances(demo_instances())),
        Arc::new(EventBus::new()),
        FaultInjector::disabled(),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_two_hundred_workers_on_fresh_template() {
    let controller = Arc::new(ControllerService::in_memory());
    controller
        .save_server_template(ServerTemplate::new("stress", "Stress"))
        .await
        .unwrap();

    let report = run_concurrent_workload(controller.clone(), "stress", 200, DEADLINE)
        .await
        .unwrap();

    assert!(report.is_clean(), "errors: {:?}", report.errors);
    assert_eq!(report.workers, 200);
    assert_eq!(report.saves + report.invalidations + report.assertions, 200);
    assert_eq!(report.stale_containers, 0);

    // The pool of five specs survives, each exactly once
    let specs = controller.list_container_specs("stress").await.unwrap();
    let mut ids: Vec<&str> = specs.iter().map(|spec| spec.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["spec_0", "spec_1", "spec_2", "spec_3", "spec_4"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_workload_against_demo_fleet_keeps_instances_consistent() {
    let controller = demo_controller();

    let report = run_concurrent_workload(controller.clone(), DEMO_TEMPLATE_ID, 200, DEADLINE)
        .await
        .unwrap();

    assert!(report.is_clean(), "errors: {:?}", report.errors);
    assert_eq!(report.stale_containers, 0);
    assert_eq!(controller.list_container_specs(DEMO_TEMPLATE_ID).await.unwrap().len(), 7);
}

#[tokio::test]
async fn test_workload_requires_existing_template() {
    let controller = Arc::new(ControllerService::in_memory());
    let err = run_concurrent_workload(controller, "missing", 10, DEADLINE)
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::NotFound(_)));
}

#[tokio::test]
async fn test_stale_containers_are_counted() {
    let controller = demo_controller();
    assert_eq!(count_stale_containers(&controller).await.unwrap(), 0);

    // Two instances still report containers for the deleted spec
    controller
        .delete_container_spec(DEMO_TEMPLATE_ID, DEMO_SPEC_1)
        .await
        .unwrap();
    assert_eq!(count_stale_containers(&controller).await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_spec_saves_are_not_lost() {
    let controller = demo_controller();
    let key = ServerTemplateKey::new(DEMO_TEMPLATE_ID, DEMO_TEMPLATE_ID);

    let tasks = (0..50).map(|n| {
        let controller = controller.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let id = format!("parallel_{}", n);
            let spec = ContainerSpec::new(
                &id,
                &id,
                key,
                ReleaseId::new("org.example", "parallel", "1.0.0"),
                ContainerStatus::Stopped,
            );
            controller.save_container_spec(DEMO_TEMPLATE_ID, spec).await
        })
    });

    for outcome in join_all(tasks).await {
        outcome.unwrap().unwrap();
    }

    let specs = controller.list_container_specs(DEMO_TEMPLATE_ID).await.unwrap();
    assert_eq!(specs.len(), 52);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_copies_to_same_id_create_one_template() {
    let controller = demo_controller();

    let tasks = (0..20).map(|_| {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .copy_server_template(DEMO_TEMPLATE_ID, "copy", "Copy")
                .await
        })
    });

    let outcomes: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .filter_map(|outcome| outcome.as_ref().err())
        .all(|err| matches!(err, ControllerError::AlreadyExists(_))));
    assert_eq!(controller.list_server_templates().await.unwrap().len(), 2);
}
