//! Startup orchestration.
//!
//! # Responsibilities
//! - Run the startup steps in a fixed order on one control task
//! - Wait a bounded time for construction failures before declaring success
//! - Own the shutdown guard and the teardown sequence
//!
//! # Startup Steps
//! ```text
//! 1. metrics recorder          6. management endpoints
//! 2. web surface routes        7. notebook recovery (search/scheduler warmed
//! 3. bindings, TLS, bind          in the background, notebook forced)
//! 4. notebook repository init  8. run-on-start note
//! 5. cluster wiring            9. listener starts accepting
//! ```
//!
//! # Design Decisions
//! - Fail fast: configuration, TLS and bind errors abort before accepting
//! - Construction errors are collected, not propagated; silence for the
//!   configured window means success
//! - A shutdown requested while starting skips the remaining steps and the
//!   listener never accepts

use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use axum::Router;
use axum_server::Handle;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::cluster::{self, ClusterManager};
use crate::config::ServerConfig;
use crate::lifecycle::collector::{ErrorCollector, WaitOutcome};
use crate::lifecycle::run_once::{self, RunOnceOutcome};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::lifecycle::state::{Lifecycle, LifecycleError, LifecycleState};
use crate::management::{setup_management_router, ManagementState};
use crate::net::listener::{ListenerError, PreparedListener};
use crate::net::tls::{self, TlsError};
use crate::observability::metrics;
use crate::registry::{Capability, Factories, RegistryError, ServiceRegistry};
use crate::services::recovery::RecoveryStorageRegistry;
use crate::web::{NotebookWebSurface, RegistryCell, WebSurface};

/// Extra time allowed for the listener task to finish after its drain window.
const LISTENER_STOP_SLACK: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("listener failed to start: {0}")]
    ListenerStart(String),

    #[error("{count} component(s) failed to construct")]
    Construction { count: usize },
}

/// Records the duration of each startup step.
struct PhaseClock {
    last: Instant,
}

impl PhaseClock {
    fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    fn lap(&mut self, phase: &'static str) {
        let elapsed = self.last.elapsed();
        debug!(phase, elapsed_ms = elapsed.as_millis() as u64, "Startup step finished");
        metrics::record_phase(phase, elapsed);
        self.last = Instant::now();
    }
}

pub struct OrchestratorBuilder {
    config: ServerConfig,
    factories: Factories,
    recovery_storages: RecoveryStorageRegistry,
    web_surface: Arc<dyn WebSurface>,
    handle_signals: bool,
}

impl OrchestratorBuilder {
    /// Replace the constructors used by the service registry.
    pub fn factories(mut self, factories: Factories) -> Self {
        self.factories = factories;
        self
    }

    pub fn recovery_storages(mut self, recovery_storages: RecoveryStorageRegistry) -> Self {
        self.recovery_storages = recovery_storages;
        self
    }

    pub fn web_surface(mut self, web_surface: Arc<dyn WebSurface>) -> Self {
        self.web_surface = web_surface;
        self
    }

    /// Listen for SIGINT/SIGTERM during `start`. On by default.
    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    pub fn build(self) -> Arc<Orchestrator> {
        Arc::new(Orchestrator {
            config: Arc::new(self.config),
            factories: self.factories,
            recovery_storages: self.recovery_storages,
            web_surface: self.web_surface,
            handle_signals: self.handle_signals,
            lifecycle: Arc::new(Lifecycle::new()),
            stopping: Shutdown::new(),
            collector: Arc::new(ErrorCollector::new()),
            registry: Arc::new(OnceLock::new()),
            server_handle: Handle::new(),
            local_addr: OnceLock::new(),
            cluster: Mutex::new(None),
        })
    }
}

/// Drives the server from `Created` to `Stopped`.
pub struct Orchestrator {
    config: Arc<ServerConfig>,
    factories: Factories,
    recovery_storages: RecoveryStorageRegistry,
    web_surface: Arc<dyn WebSurface>,
    handle_signals: bool,
    lifecycle: Arc<Lifecycle>,
    stopping: Shutdown,
    collector: Arc<ErrorCollector>,
    registry: RegistryCell,
    server_handle: Handle,
    local_addr: OnceLock<SocketAddr>,
    cluster: Mutex<Option<ClusterManager>>,
}

impl Orchestrator {
    pub fn builder(config: ServerConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            factories: Factories::default(),
            recovery_storages: RecoveryStorageRegistry::with_builtins(),
            web_surface: Arc::new(NotebookWebSurface),
            handle_signals: true,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.current()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Address the listener is bound to, once step 3 has run.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub fn registry(&self) -> Option<Arc<ServiceRegistry>> {
        self.registry.get().cloned()
    }

    pub fn collector(&self) -> &Arc<ErrorCollector> {
        &self.collector
    }

    pub fn cluster_active(&self) -> bool {
        self.cluster.lock().is_some()
    }

    /// Start the server and run until it has shut down.
    ///
    /// Returns the exit code of the shutdown request that won, or an error
    /// when startup failed (in which case teardown has already run).
    pub async fn start(self: &Arc<Self>) -> Result<i32, StartupError> {
        self.lifecycle
            .transition(LifecycleState::Created, LifecycleState::Starting)?;
        info!(version = env!("CARGO_PKG_VERSION"), "Starting notebook server");

        if self.handle_signals {
            signals::spawn_signal_listener(Arc::downgrade(self), self.stopping.requested_token());
        }

        let server_task = match self.run_startup().await {
            Ok(Some(task)) => task,
            Ok(None) => return Ok(self.stopping.wait().await),
            Err(e) => {
                error!(error = %e, "Startup failed");
                self.shutdown(1);
                return Err(e);
            }
        };

        match self
            .lifecycle
            .transition(LifecycleState::Starting, LifecycleState::Running)
        {
            Ok(()) => info!(address = ?self.local_addr(), "Notebook server running"),
            Err(e) => debug!(error = %e, "Shutdown began before startup completed"),
        }
        Ok(self.run_until_stopped(server_task).await)
    }

    /// Runs steps 1-9 and the construction error wait. `None` means a
    /// shutdown was requested while starting.
    #[instrument(skip_all, name = "startup")]
    async fn run_startup(self: &Arc<Self>) -> Result<Option<JoinHandle<std::io::Result<()>>>, StartupError> {
        let config = Arc::clone(&self.config);
        let mut clock = PhaseClock::new();

        // 1. metrics
        let prometheus = config.observability.metrics_enabled.then(metrics::install);
        metrics::record_lifecycle_state(LifecycleState::Starting);
        clock.lap("metrics");

        // 2. web surface
        let mut router: Router = self.web_surface.register(Arc::clone(&self.registry));
        clock.lap("web_surface");

        // 3. bindings, TLS material, bind
        let registry = Arc::new(ServiceRegistry::new(
            Arc::clone(&config),
            self.factories.clone(),
            self.recovery_storages.clone(),
            Arc::clone(&self.collector),
        )?);
        let _ = self.registry.set(Arc::clone(&registry));
        let tls = tls::build(&config.tls)?;
        let listener = PreparedListener::bind(&config.server, &tls)?;
        let _ = self.local_addr.set(listener.local_addr());
        clock.lap("bind");

        // 4. notebook repository
        if self.lifecycle.is_shutting_down() {
            return Ok(None);
        }
        if let (Ok(repo), Ok(parser)) = (registry.notebook_repo(), registry.note_parser()) {
            if let Err(e) = repo.init(&config, parser) {
                warn!(error = %e, "Notebook repository initialization failed");
            }
        }
        clock.lap("notebook_repo");

        // 5. cluster
        if self.lifecycle.is_shutting_down() {
            return Ok(None);
        }
        let manager = cluster::setup(&registry);
        {
            // shutdown() takes this lock after winning its guard.
            let mut slot = self.cluster.lock();
            if self.lifecycle.is_shutting_down() {
                if let Some(manager) = manager {
                    manager.stop();
                }
                return Ok(None);
            }
            *slot = manager;
        }
        clock.lap("cluster");

        // 6. management
        if self.lifecycle.is_shutting_down() {
            return Ok(None);
        }
        if config.management.enabled {
            router = router.merge(setup_management_router(ManagementState {
                lifecycle: Arc::clone(&self.lifecycle),
                metrics: prometheus,
            }));
        }
        clock.lap("management");

        // 7. notebook recovery
        if self.lifecycle.is_shutting_down() {
            return Ok(None);
        }
        registry.warm_in_background(Capability::Search);
        registry.warm_in_background(Capability::Scheduler);
        if let Ok(notebook) = registry.notebook() {
            if let Err(e) = notebook.init_notebook() {
                warn!(error = %e, "Notebook initialization failed");
            }
            notebook.recover_if_necessary();
        }
        clock.lap("recovery");

        // 8. run on start
        if self.lifecycle.is_shutting_down() {
            return Ok(None);
        }
        let run_on_start = &config.notebook.run_on_start;
        let outcome = run_once::run_note_on_start(run_on_start, &registry);
        clock.lap("run_on_start");
        if outcome != RunOnceOutcome::Disabled && run_on_start.auto_shutdown {
            info!(exit_code = outcome.exit_code(), "Shutting down after note on start");
            self.shutdown(outcome.exit_code());
            return Ok(None);
        }
        // 9. listener
        if self.lifecycle.is_shutting_down() {
            return Ok(None);
        }
        let mut task = listener.serve(router, self.server_handle.clone());
        tokio::select! {
            addr = self.server_handle.listening() => {
                if addr.is_none() {
                    return Err(StartupError::ListenerStart("listener closed before accepting".to_string()));
                }
            }
            joined = &mut task => {
                let reason = match joined {
                    Ok(Ok(())) => "listener exited before accepting".to_string(),
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => e.to_string(),
                };
                return Err(StartupError::ListenerStart(reason));
            }
        }
        clock.lap("listener");

        let window = config.startup.construction_error_timeout();
        match self
            .collector
            .wait_for_at_least_one_error(window, &self.stopping.requested_token())
            .await
        {
            WaitOutcome::Elapsed => Ok(Some(task)),
            WaitOutcome::Cancelled => Ok(Some(task)),
            WaitOutcome::Errors(errors) => {
                for e in &errors {
                    error!(capability = %e.capability, detail = %e.detail, "Construction error");
                }
                Err(StartupError::Construction {
                    count: errors.len(),
                })
            }
        }
    }

    async fn run_until_stopped(&self, mut task: JoinHandle<std::io::Result<()>>) -> i32 {
        tokio::select! {
            code = self.stopping.wait() => {
                let drain = self.config.server.graceful_shutdown() + LISTENER_STOP_SLACK;
                if tokio::time::timeout(drain, task).await.is_err() {
                    warn!("Listener did not stop within the drain window");
                }
                code
            }
            joined = &mut task => {
                if !self.lifecycle.is_shutting_down() {
                    match joined {
                        Ok(Ok(())) => error!("Listener stopped unexpectedly"),
                        Ok(Err(e)) => error!(error = %e, "Listener failed"),
                        Err(e) => error!(error = %e, "Listener task aborted"),
                    }
                    self.shutdown(1);
                }
                self.stopping.wait().await
            }
        }
    }

    /// Tear the server down with `exit_code`.
    ///
    /// Safe to call any number of times from any thread; only the first call
    /// runs the teardown and returns `true`. Each teardown step is isolated:
    /// a step that panics is logged and the remaining steps still run.
    pub fn shutdown(&self, exit_code: i32) -> bool {
        let previous = match self.lifecycle.begin_shutdown() {
            Ok(previous) => previous,
            Err(current) => {
                debug!(exit_code, state = %current, "Shutdown already in progress");
                return false;
            }
        };
        info!(exit_code, from = %previous, "Shutting down");
        self.stopping.request(exit_code);
        let _stopped = StoppedGuard {
            orchestrator: self,
            exit_code,
        };

        teardown_step("listener", || {
            self.server_handle
                .graceful_shutdown(Some(self.config.server.graceful_shutdown()));
        });

        teardown_step("cluster", || {
            if let Some(cluster) = self.cluster.lock().take() {
                cluster.stop();
            }
        });

        if let Some(registry) = self.registry.get() {
            teardown_step("interpreter_settings", || {
                if self.config.recovery.enabled {
                    info!("Recovery enabled, leaving interpreter processes running");
                } else if let Some(settings) = registry.peek_interpreter_settings() {
                    settings.close();
                }
            });
            teardown_step("notebook", || {
                if let Some(notebook) = registry.peek_notebook() {
                    notebook.close();
                }
            });
            teardown_step("registry", || {
                registry.dispose();
            });
        }
        true
    }
}

/// Completes the teardown even when a step unwinds past `shutdown`.
struct StoppedGuard<'a> {
    orchestrator: &'a Orchestrator,
    exit_code: i32,
}

impl Drop for StoppedGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self
            .orchestrator
            .lifecycle
            .transition(LifecycleState::ShuttingDown, LifecycleState::Stopped)
        {
            warn!(error = %e, "Unexpected lifecycle state after teardown");
        }
        self.orchestrator.stopping.complete();
        info!(exit_code = self.exit_code, "Notebook server stopped");
    }
}

fn teardown_step(step: &'static str, f: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!(step, reason = %reason, "Teardown step failed, continuing");
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .finish()
    }
}
