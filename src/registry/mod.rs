//! Service registry.
//!
//! # Data Flow
//! ```text
//! ServerConfig
//!     → ServiceBindings::resolve (variant per capability, once)
//!     → ServiceRegistry (one Singleton slot per capability)
//!     → accessor: first call runs the variant's factory
//!         → success: instance cached, construction order recorded
//!         → failure: ErrorCollector::record, failure cached
//!     → dispose(): reverse construction order
//! ```
//!
//! # Design Decisions
//! - Variants are chosen from an explicit factory table, never by name lookup
//!   at runtime
//! - Accessors may run on any thread, including blocking workers started by
//!   `warm_in_background`
//! - `peek_*` accessors are for teardown and never construct

mod capability;
pub mod factories;
mod singleton;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::lifecycle::collector::{ConstructionError, ErrorCollector};
use crate::services::auth::{AuthenticationService, AuthorizationService};
use crate::services::events::NotebookEventHub;
use crate::services::interpreter::InterpreterSettingManager;
use crate::services::notebook::{NoteParser, Notebook, NotebookRepo, NotebookService};
use crate::services::plugin::PluginManager;
use crate::services::recovery::RecoveryStorageRegistry;
use crate::services::scheduler::SchedulerService;
use crate::services::search::SearchService;

pub use capability::{
    AuthVariant, Capability, Lifetime, RegistryError, SchedulerVariant, SearchVariant,
    ServiceBinding, ServiceBindings,
};
pub use factories::{factory, Factories, Factory};
pub use singleton::Singleton;

pub struct ServiceRegistry {
    config: Arc<ServerConfig>,
    bindings: ServiceBindings,
    factories: Factories,
    recovery_storages: RecoveryStorageRegistry,
    collector: Arc<ErrorCollector>,
    order: Mutex<Vec<Capability>>,
    disposed: AtomicBool,

    authentication: Singleton<dyn AuthenticationService>,
    authorization: Singleton<AuthorizationService>,
    scheduler: Singleton<dyn SchedulerService>,
    search: Singleton<dyn SearchService>,
    note_parser: Singleton<dyn NoteParser>,
    notebook_repo: Singleton<dyn NotebookRepo>,
    interpreter_settings: Singleton<InterpreterSettingManager>,
    notebook_events: Singleton<NotebookEventHub>,
    notebook: Singleton<Notebook>,
    notebook_service: Singleton<dyn NotebookService>,
    plugin_manager: Singleton<PluginManager>,
}

impl ServiceRegistry {
    /// Resolve bindings from `config` and create an empty registry.
    pub fn new(
        config: Arc<ServerConfig>,
        factories: Factories,
        recovery_storages: RecoveryStorageRegistry,
        collector: Arc<ErrorCollector>,
    ) -> Result<Self, RegistryError> {
        let bindings = ServiceBindings::resolve(&config)?;
        for binding in bindings.table() {
            debug!(capability = %binding.capability, variant = binding.variant, "Service bound");
        }
        info!(
            auth = bindings.variant_name(Capability::Authentication),
            scheduler = bindings.variant_name(Capability::Scheduler),
            search = bindings.variant_name(Capability::Search),
            "Service bindings resolved"
        );

        Ok(Self {
            config,
            bindings,
            factories,
            recovery_storages,
            collector,
            order: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
            authentication: Singleton::new(Capability::Authentication),
            authorization: Singleton::new(Capability::Authorization),
            scheduler: Singleton::new(Capability::Scheduler),
            search: Singleton::new(Capability::Search),
            note_parser: Singleton::new(Capability::NoteParser),
            notebook_repo: Singleton::new(Capability::NotebookRepo),
            interpreter_settings: Singleton::new(Capability::InterpreterSettings),
            notebook_events: Singleton::new(Capability::NotebookEvents),
            notebook: Singleton::new(Capability::Notebook),
            notebook_service: Singleton::new(Capability::NotebookService),
            plugin_manager: Singleton::new(Capability::PluginManager),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn bindings(&self) -> &ServiceBindings {
        &self.bindings
    }

    pub fn collector(&self) -> &Arc<ErrorCollector> {
        &self.collector
    }

    pub fn recovery_storages(&self) -> &RecoveryStorageRegistry {
        &self.recovery_storages
    }

    fn resolve<T: ?Sized>(
        &self,
        slot: &Singleton<T>,
        factory: &Factory<T>,
        capability: Capability,
    ) -> Result<Arc<T>, ConstructionError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(disposed(capability));
        }
        let (instance, constructed) = slot.get_or_init(|| factory(self), &self.collector)?;
        if constructed {
            let mut order = self.order.lock();
            // dispose() flips the flag under this lock, so an instance that
            // finished after it started is released here instead.
            if self.disposed.load(Ordering::Acquire) {
                drop(order);
                drop(instance);
                if self.release(capability) {
                    debug!(capability = %capability, "Singleton finished after dispose, released");
                }
                return Err(disposed(capability));
            }
            debug!(capability = %capability, "Singleton constructed");
            order.push(capability);
        }
        Ok(instance)
    }

    pub fn authentication(&self) -> Result<Arc<dyn AuthenticationService>, ConstructionError> {
        let factory = match self.bindings.auth {
            AuthVariant::Realm => &self.factories.realm_authentication,
            AuthVariant::None => &self.factories.no_authentication,
        };
        self.resolve(&self.authentication, factory, Capability::Authentication)
    }

    pub fn authorization(&self) -> Result<Arc<AuthorizationService>, ConstructionError> {
        self.resolve(
            &self.authorization,
            &self.factories.authorization,
            Capability::Authorization,
        )
    }

    pub fn scheduler(&self) -> Result<Arc<dyn SchedulerService>, ConstructionError> {
        let factory = match self.bindings.scheduler {
            SchedulerVariant::Cron => &self.factories.cron_scheduler,
            SchedulerVariant::Disabled => &self.factories.no_scheduler,
        };
        self.resolve(&self.scheduler, factory, Capability::Scheduler)
    }

    pub fn search(&self) -> Result<Arc<dyn SearchService>, ConstructionError> {
        let factory = match self.bindings.search {
            SearchVariant::Indexed => &self.factories.indexed_search,
            SearchVariant::Disabled => &self.factories.no_search,
        };
        self.resolve(&self.search, factory, Capability::Search)
    }

    pub fn note_parser(&self) -> Result<Arc<dyn NoteParser>, ConstructionError> {
        self.resolve(
            &self.note_parser,
            &self.factories.note_parser,
            Capability::NoteParser,
        )
    }

    pub fn notebook_repo(&self) -> Result<Arc<dyn NotebookRepo>, ConstructionError> {
        self.resolve(
            &self.notebook_repo,
            &self.factories.notebook_repo,
            Capability::NotebookRepo,
        )
    }

    pub fn interpreter_settings(&self) -> Result<Arc<InterpreterSettingManager>, ConstructionError> {
        self.resolve(
            &self.interpreter_settings,
            &self.factories.interpreter_settings,
            Capability::InterpreterSettings,
        )
    }

    pub fn notebook_events(&self) -> Result<Arc<NotebookEventHub>, ConstructionError> {
        self.resolve(
            &self.notebook_events,
            &self.factories.notebook_events,
            Capability::NotebookEvents,
        )
    }

    pub fn notebook(&self) -> Result<Arc<Notebook>, ConstructionError> {
        self.resolve(&self.notebook, &self.factories.notebook, Capability::Notebook)
    }

    pub fn notebook_service(&self) -> Result<Arc<dyn NotebookService>, ConstructionError> {
        self.resolve(
            &self.notebook_service,
            &self.factories.notebook_service,
            Capability::NotebookService,
        )
    }

    pub fn plugin_manager(&self) -> Result<Arc<PluginManager>, ConstructionError> {
        self.resolve(
            &self.plugin_manager,
            &self.factories.plugin_manager,
            Capability::PluginManager,
        )
    }

    /// Construct `capability` now if it has not been yet.
    pub fn force(&self, capability: Capability) -> Result<(), ConstructionError> {
        match capability {
            Capability::Authentication => self.authentication().map(drop),
            Capability::Authorization => self.authorization().map(drop),
            Capability::Scheduler => self.scheduler().map(drop),
            Capability::Search => self.search().map(drop),
            Capability::NoteParser => self.note_parser().map(drop),
            Capability::NotebookRepo => self.notebook_repo().map(drop),
            Capability::InterpreterSettings => self.interpreter_settings().map(drop),
            Capability::NotebookEvents => self.notebook_events().map(drop),
            Capability::Notebook => self.notebook().map(drop),
            Capability::NotebookService => self.notebook_service().map(drop),
            Capability::PluginManager => self.plugin_manager().map(drop),
        }
    }

    /// Force `capability` on a blocking worker thread.
    ///
    /// The result is reported only through the collector. A panicking
    /// constructor is recorded as a construction error too.
    pub fn warm_in_background(self: &Arc<Self>, capability: Capability) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let collector = Arc::clone(&self.collector);
        tokio::spawn(async move {
            let joined = tokio::task::spawn_blocking(move || {
                let _ = registry.force(capability);
            })
            .await;
            if let Err(e) = joined {
                collector.record(capability, format!("constructor did not complete: {e}"));
            }
        })
    }

    pub fn peek_interpreter_settings(&self) -> Option<Arc<InterpreterSettingManager>> {
        self.interpreter_settings.peek()
    }

    pub fn peek_notebook(&self) -> Option<Arc<Notebook>> {
        self.notebook.peek()
    }

    /// Capabilities constructed so far, in construction order.
    pub fn constructed(&self) -> Vec<Capability> {
        self.order.lock().clone()
    }

    pub fn is_constructed(&self, capability: Capability) -> bool {
        self.order.lock().contains(&capability)
    }

    pub fn is_failed(&self, capability: Capability) -> bool {
        match capability {
            Capability::Authentication => self.authentication.is_failed(),
            Capability::Authorization => self.authorization.is_failed(),
            Capability::Scheduler => self.scheduler.is_failed(),
            Capability::Search => self.search.is_failed(),
            Capability::NoteParser => self.note_parser.is_failed(),
            Capability::NotebookRepo => self.notebook_repo.is_failed(),
            Capability::InterpreterSettings => self.interpreter_settings.is_failed(),
            Capability::NotebookEvents => self.notebook_events.is_failed(),
            Capability::Notebook => self.notebook.is_failed(),
            Capability::NotebookService => self.notebook_service.is_failed(),
            Capability::PluginManager => self.plugin_manager.is_failed(),
        }
    }

    /// Drop every constructed singleton, most recently constructed first.
    ///
    /// Returns the capabilities released, in release order. Later accessor
    /// calls fail without constructing anything.
    pub fn dispose(&self) -> Vec<Capability> {
        let order = {
            let mut order = self.order.lock();
            self.disposed.store(true, Ordering::Release);
            std::mem::take(&mut *order)
        };

        let mut released = Vec::with_capacity(order.len());
        for capability in order.into_iter().rev() {
            if self.release(capability) {
                debug!(capability = %capability, "Singleton disposed");
                released.push(capability);
            }
        }
        info!(count = released.len(), "Service registry disposed");
        released
    }

    fn release(&self, capability: Capability) -> bool {
        match capability {
            Capability::Authentication => self.authentication.take().is_some(),
            Capability::Authorization => self.authorization.take().is_some(),
            Capability::Scheduler => match self.scheduler.take() {
                Some(scheduler) => {
                    scheduler.close();
                    true
                }
                None => false,
            },
            Capability::Search => self.search.take().is_some(),
            Capability::NoteParser => self.note_parser.take().is_some(),
            Capability::NotebookRepo => self.notebook_repo.take().is_some(),
            Capability::InterpreterSettings => self.interpreter_settings.take().is_some(),
            Capability::NotebookEvents => self.notebook_events.take().is_some(),
            Capability::Notebook => self.notebook.take().is_some(),
            Capability::NotebookService => self.notebook_service.take().is_some(),
            Capability::PluginManager => self.plugin_manager.take().is_some(),
        }
    }
}

fn disposed(capability: Capability) -> ConstructionError {
    ConstructionError {
        capability,
        detail: "registry disposed".to_string(),
        at: std::time::SystemTime::now(),
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("bindings", &self.bindings)
            .field("constructed", &self.constructed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::scheduler::CronScheduler;
    use crate::services::ServiceError;
    use std::sync::Barrier;
    use std::time::Duration;

    fn registry_with(config: ServerConfig, factories: Factories) -> Arc<ServiceRegistry> {
        Arc::new(
            ServiceRegistry::new(
                Arc::new(config),
                factories,
                RecoveryStorageRegistry::with_builtins(),
                Arc::new(ErrorCollector::new()),
            )
            .unwrap(),
        )
    }

    fn scratch_config(dir: &std::path::Path) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.notebook.dir = dir.join("notebook").display().to_string();
        config
    }

    #[test]
    fn accessors_return_the_same_instance() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(scratch_config(dir.path()), Factories::default());

        let first = registry.notebook().unwrap();
        let second = registry.notebook().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.authentication().unwrap().name(), "none");
    }

    #[test]
    fn dependencies_are_constructed_first() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(scratch_config(dir.path()), Factories::default());

        registry.notebook_service().unwrap();
        let order = registry.constructed();
        let position = |c| order.iter().position(|x| *x == c).unwrap();
        assert!(position(Capability::NotebookRepo) < position(Capability::Notebook));
        assert!(position(Capability::Notebook) < position(Capability::NotebookService));
    }

    #[test]
    fn dispose_runs_in_reverse_order() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(scratch_config(dir.path()), Factories::default());

        registry.notebook_service().unwrap();
        let mut constructed = registry.constructed();
        let released = registry.dispose();
        constructed.reverse();
        assert_eq!(released, constructed);

        assert!(registry.notebook().is_err());
        assert!(registry.collector().is_empty());
    }

    #[test]
    fn peek_never_constructs() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(scratch_config(dir.path()), Factories::default());

        assert!(registry.peek_notebook().is_none());
        assert!(registry.peek_interpreter_settings().is_none());
        assert!(registry.constructed().is_empty());
    }

    #[test]
    fn failed_dependency_is_recorded_for_both_slots() {
        let dir = tempfile::tempdir().unwrap();
        let mut factories = Factories::default();
        factories.notebook_repo = factory(|_| Err(ServiceError::Failed("disk gone".to_string())));
        let registry = registry_with(scratch_config(dir.path()), factories);

        assert!(registry.notebook().is_err());
        assert!(registry.notebook().is_err());
        assert!(registry.is_failed(Capability::NotebookRepo));
        assert!(registry.is_failed(Capability::Notebook));

        let failed: Vec<Capability> = registry
            .collector()
            .errors()
            .iter()
            .map(|e| e.capability)
            .collect();
        assert_eq!(failed, vec![Capability::NotebookRepo, Capability::Notebook]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn background_panic_is_collected() {
        let dir = tempfile::tempdir().unwrap();
        let mut factories = Factories::default();
        factories.no_search = factory(|_| -> Result<Arc<dyn SearchService>, ServiceError> {
            panic!("index exploded")
        });
        let registry = registry_with(scratch_config(dir.path()), factories);

        registry.warm_in_background(Capability::Search).await.unwrap();

        let errors = registry.collector().errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].capability, Capability::Search);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn scheduler_finished_after_dispose_is_closed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = scratch_config(dir.path());
        config.notebook.cron_enabled = true;

        let gate = Arc::new(Barrier::new(2));
        let built: Arc<Mutex<Option<Arc<dyn SchedulerService>>>> = Arc::new(Mutex::new(None));
        let mut factories = Factories::default();
        factories.cron_scheduler = {
            let gate = Arc::clone(&gate);
            let built = Arc::clone(&built);
            factory(move |_| {
                gate.wait();
                gate.wait();
                let scheduler: Arc<dyn SchedulerService> = Arc::new(CronScheduler::new(2)?);
                *built.lock() = Some(Arc::clone(&scheduler));
                Ok(scheduler)
            })
        };
        let registry = registry_with(config, factories);

        let warming = registry.warm_in_background(Capability::Scheduler);
        let pass = |gate: Arc<Barrier>| tokio::task::spawn_blocking(move || drop(gate.wait()));
        pass(Arc::clone(&gate)).await.unwrap();
        assert!(registry.dispose().is_empty());
        pass(Arc::clone(&gate)).await.unwrap();
        warming.await.unwrap();

        let scheduler = built.lock().clone().unwrap();
        assert!(matches!(
            scheduler.schedule("nightly", "0 0 2 * * ?"),
            Err(ServiceError::Closed(_))
        ));
        assert!(!registry.is_constructed(Capability::Scheduler));
        assert!(registry.scheduler().is_err());
        assert!(registry.collector().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn background_warm_constructs_on_worker() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = scratch_config(dir.path());
        config.notebook.search_enabled = true;
        let registry = registry_with(config, Factories::default());

        tokio::time::timeout(
            Duration::from_secs(5),
            registry.warm_in_background(Capability::Search),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(registry.is_constructed(Capability::Search));
        assert_eq!(registry.search().unwrap().name(), "indexed");
    }
}
