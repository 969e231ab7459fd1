//! Startup with TLS material from the PEM pair or the keystore.

use std::fs;

use notebook_server::lifecycle::{LifecycleState, Orchestrator, StartupError};

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unreadable_pem_cert_falls_back_to_keystore() {
    let dir = tempfile::tempdir().unwrap();
    let (cert, key) = common::self_signed();
    let key_path = dir.path().join("server.key");
    fs::write(&key_path, &key).unwrap();
    let keystore = dir.path().join("keystore.pem");
    fs::write(&keystore, format!("{cert}{key}")).unwrap();

    let mut config = common::scratch_config(dir.path());
    config.tls.enabled = true;
    config.tls.pem_cert_path = dir.path().join("missing.crt").display().to_string();
    config.tls.pem_key_path = key_path.display().to_string();
    config.tls.keystore.path = keystore.display().to_string();

    let orchestrator = Orchestrator::builder(config).handle_signals(false).build();
    let task = common::spawn(&orchestrator);
    assert!(common::wait_for_state(&orchestrator, LifecycleState::Running).await);

    let addr = orchestrator.local_addr().unwrap();
    let pong = common::client()
        .get(format!("https://{addr}/ping"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(pong, "pong");

    orchestrator.shutdown(0);
    assert_eq!(task.await.unwrap().unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pem_pair_serves_https() {
    let dir = tempfile::tempdir().unwrap();
    let (cert, key) = common::self_signed();
    let cert_path = dir.path().join("server.crt");
    let key_path = dir.path().join("server.key");
    fs::write(&cert_path, cert).unwrap();
    fs::write(&key_path, key).unwrap();

    let mut config = common::scratch_config(dir.path());
    config.tls.enabled = true;
    config.tls.pem_cert_path = cert_path.display().to_string();
    config.tls.pem_key_path = key_path.display().to_string();
    config.tls.keystore.path = dir.path().join("ignored.pem").display().to_string();

    let orchestrator = Orchestrator::builder(config).handle_signals(false).build();
    let task = common::spawn(&orchestrator);
    assert!(common::wait_for_state(&orchestrator, LifecycleState::Running).await);

    let addr = orchestrator.local_addr().unwrap();
    let status = common::client()
        .get(format!("https://{addr}/health/liveness"))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 200);

    orchestrator.shutdown(0);
    assert_eq!(task.await.unwrap().unwrap(), 0);
}

#[tokio::test]
async fn tls_without_any_source_fails_before_binding() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::scratch_config(dir.path());
    config.tls.enabled = true;

    let orchestrator = Orchestrator::builder(config).handle_signals(false).build();
    assert!(matches!(
        orchestrator.start().await,
        Err(StartupError::Tls(_))
    ));
    assert!(orchestrator.local_addr().is_none());
    assert_eq!(orchestrator.state(), LifecycleState::Stopped);
}
