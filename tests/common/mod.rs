//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notebook_server::config::ServerConfig;
use notebook_server::lifecycle::{LifecycleState, Orchestrator, StartupError};
use tokio::task::JoinHandle;

/// Defaults with ephemeral ports, a short error window and scratch dirs.
pub fn scratch_config(dir: &Path) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.server.port = 0;
    config.server.ssl_port = 0;
    config.server.graceful_shutdown_secs = 1;
    config.notebook.dir = dir.join("notebook").display().to_string();
    config.recovery.dir = dir.join("recovery").display().to_string();
    config.startup.construction_error_timeout_ms = 200;
    config
}

/// Run `start` on its own task.
pub fn spawn(orchestrator: &Arc<Orchestrator>) -> JoinHandle<Result<i32, StartupError>> {
    let orchestrator = Arc::clone(orchestrator);
    tokio::spawn(async move { orchestrator.start().await })
}

/// Poll until the orchestrator reaches `state`.
pub async fn wait_for_state(orchestrator: &Orchestrator, state: LifecycleState) -> bool {
    tokio::time::timeout(Duration::from_secs(10), async {
        while orchestrator.state() != state {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}

/// Write a note whose paragraphs hold `texts`.
pub fn write_note(notebook_dir: &Path, id: &str, texts: &[&str]) {
    fs::create_dir_all(notebook_dir).unwrap();
    let paragraphs: Vec<serde_json::Value> = texts
        .iter()
        .enumerate()
        .map(|(i, text)| serde_json::json!({ "id": format!("p{i}"), "text": text }))
        .collect();
    let note = serde_json::json!({ "id": id, "name": id, "paragraphs": paragraphs });
    fs::write(notebook_dir.join(format!("{id}.json")), note.to_string()).unwrap();
}

/// Self-signed certificate and key for `localhost`, as (cert PEM, key PEM).
pub fn self_signed() -> (String, String) {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    (certified.cert.pem(), certified.key_pair.serialize_pem())
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
