//! End-to-end startup over plaintext.

use notebook_server::lifecycle::{LifecycleState, Orchestrator, StartupError};
use notebook_server::registry::Capability;

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn plaintext_defaults_reach_running() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::scratch_config(dir.path());
    common::write_note(&dir.path().join("notebook"), "note1", &["%md hello"]);

    let orchestrator = Orchestrator::builder(config).handle_signals(false).build();
    let task = common::spawn(&orchestrator);
    assert!(common::wait_for_state(&orchestrator, LifecycleState::Running).await);
    assert!(orchestrator.collector().is_empty());

    let registry = orchestrator.registry().unwrap();
    assert_eq!(registry.authentication().unwrap().name(), "none");
    assert_eq!(registry.scheduler().unwrap().name(), "disabled");
    assert_eq!(registry.search().unwrap().name(), "disabled");
    assert!(registry.is_constructed(Capability::Notebook));
    assert!(!orchestrator.cluster_active());

    let addr = orchestrator.local_addr().unwrap();
    let client = common::client();
    let ping = client.get(format!("http://{addr}/ping")).send().await.unwrap();
    assert_eq!(ping.text().await.unwrap(), "pong");

    let ready = client
        .get(format!("http://{addr}/health/readiness"))
        .send()
        .await
        .unwrap();
    assert_eq!(ready.status(), 200);

    let notes: serde_json::Value = client
        .get(format!("http://{addr}/api/notebook"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(notes["body"], serde_json::json!(["note1"]));

    let metrics = client.get(format!("http://{addr}/metrics")).send().await.unwrap();
    assert_eq!(metrics.status(), 200);

    assert!(orchestrator.shutdown(0));
    assert_eq!(task.await.unwrap().unwrap(), 0);
    assert_eq!(orchestrator.state(), LifecycleState::Stopped);
    assert!(registry.constructed().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn occupied_port_fails_without_running() {
    let dir = tempfile::tempdir().unwrap();
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = common::scratch_config(dir.path());
    config.server.port = occupied.local_addr().unwrap().port();

    let orchestrator = Orchestrator::builder(config).handle_signals(false).build();
    let result = orchestrator.start().await;

    assert!(matches!(result, Err(StartupError::Listener(_))));
    assert_eq!(orchestrator.state(), LifecycleState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn management_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::scratch_config(dir.path());
    config.management.enabled = false;

    let orchestrator = Orchestrator::builder(config).handle_signals(false).build();
    let task = common::spawn(&orchestrator);
    assert!(common::wait_for_state(&orchestrator, LifecycleState::Running).await);

    let addr = orchestrator.local_addr().unwrap();
    let ping = common::client()
        .get(format!("http://{addr}/ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(ping.status(), 404);

    orchestrator.shutdown(0);
    assert_eq!(task.await.unwrap().unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn explicit_exit_code_is_returned() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::builder(common::scratch_config(dir.path()))
        .handle_signals(false)
        .build();
    let task = common::spawn(&orchestrator);
    assert!(common::wait_for_state(&orchestrator, LifecycleState::Running).await);

    orchestrator.shutdown(3);
    assert_eq!(task.await.unwrap().unwrap(), 3);
}
