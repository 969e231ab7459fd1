//! One constructor per variant.
//!
//! Every field is a plain function by default. Callers swap individual
//! entries to provide their own implementation of a capability.

use std::path::Path;
use std::sync::Arc;

use crate::registry::ServiceRegistry;
use crate::services::auth::{AuthenticationService, AuthorizationService, NoAuthentication, RealmAuthentication};
use crate::services::events::NotebookEventHub;
use crate::services::interpreter::InterpreterSettingManager;
use crate::services::notebook::{
    DefaultNotebookService, FileNotebookRepo, JsonNoteParser, NoteParser, Notebook, NotebookRepo,
    NotebookService,
};
use crate::services::plugin::PluginManager;
use crate::services::scheduler::{CronScheduler, NoScheduler, SchedulerService};
use crate::services::search::{IndexedSearch, NoSearch, SearchService};
use crate::services::ServiceError;

/// Builds the instance for one capability. May resolve other capabilities
/// through the registry; the dependency graph must stay acyclic.
pub type Factory<T> = Arc<dyn Fn(&ServiceRegistry) -> Result<Arc<T>, ServiceError> + Send + Sync>;

/// Wrap a closure as a [`Factory`].
pub fn factory<T, F>(f: F) -> Factory<T>
where
    T: ?Sized,
    F: Fn(&ServiceRegistry) -> Result<Arc<T>, ServiceError> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
pub struct Factories {
    pub realm_authentication: Factory<dyn AuthenticationService>,
    pub no_authentication: Factory<dyn AuthenticationService>,
    pub authorization: Factory<AuthorizationService>,
    pub cron_scheduler: Factory<dyn SchedulerService>,
    pub no_scheduler: Factory<dyn SchedulerService>,
    pub indexed_search: Factory<dyn SearchService>,
    pub no_search: Factory<dyn SearchService>,
    pub note_parser: Factory<dyn NoteParser>,
    pub notebook_repo: Factory<dyn NotebookRepo>,
    pub interpreter_settings: Factory<InterpreterSettingManager>,
    pub notebook_events: Factory<NotebookEventHub>,
    pub notebook: Factory<Notebook>,
    pub notebook_service: Factory<dyn NotebookService>,
    pub plugin_manager: Factory<PluginManager>,
}

impl Default for Factories {
    fn default() -> Self {
        Self {
            realm_authentication: Arc::new(realm_authentication),
            no_authentication: Arc::new(no_authentication),
            authorization: Arc::new(authorization),
            cron_scheduler: Arc::new(cron_scheduler),
            no_scheduler: Arc::new(no_scheduler),
            indexed_search: Arc::new(indexed_search),
            no_search: Arc::new(no_search),
            note_parser: Arc::new(note_parser),
            notebook_repo: Arc::new(notebook_repo),
            interpreter_settings: Arc::new(interpreter_settings),
            notebook_events: Arc::new(notebook_events),
            notebook: Arc::new(notebook),
            notebook_service: Arc::new(notebook_service),
            plugin_manager: Arc::new(plugin_manager),
        }
    }
}

impl std::fmt::Debug for Factories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factories").finish_non_exhaustive()
    }
}

fn realm_authentication(
    registry: &ServiceRegistry,
) -> Result<Arc<dyn AuthenticationService>, ServiceError> {
    let path = registry.config().auth.realm_config_path.trim();
    Ok(Arc::new(RealmAuthentication::load(Path::new(path))?))
}

fn no_authentication(_: &ServiceRegistry) -> Result<Arc<dyn AuthenticationService>, ServiceError> {
    Ok(Arc::new(NoAuthentication))
}

fn authorization(_: &ServiceRegistry) -> Result<Arc<AuthorizationService>, ServiceError> {
    Ok(Arc::new(AuthorizationService::new()))
}

fn cron_scheduler(registry: &ServiceRegistry) -> Result<Arc<dyn SchedulerService>, ServiceError> {
    Ok(Arc::new(CronScheduler::new(
        registry.config().notebook.cron_pool_size,
    )?))
}

fn no_scheduler(_: &ServiceRegistry) -> Result<Arc<dyn SchedulerService>, ServiceError> {
    Ok(Arc::new(NoScheduler))
}

fn indexed_search(registry: &ServiceRegistry) -> Result<Arc<dyn SearchService>, ServiceError> {
    Ok(Arc::new(IndexedSearch::new(
        registry.config().notebook.search_max_results,
    )?))
}

fn no_search(_: &ServiceRegistry) -> Result<Arc<dyn SearchService>, ServiceError> {
    Ok(Arc::new(NoSearch))
}

fn note_parser(_: &ServiceRegistry) -> Result<Arc<dyn NoteParser>, ServiceError> {
    Ok(Arc::new(JsonNoteParser))
}

fn notebook_repo(_: &ServiceRegistry) -> Result<Arc<dyn NotebookRepo>, ServiceError> {
    Ok(Arc::new(FileNotebookRepo::new()))
}

fn interpreter_settings(
    registry: &ServiceRegistry,
) -> Result<Arc<InterpreterSettingManager>, ServiceError> {
    Ok(Arc::new(InterpreterSettingManager::new(
        registry.config().interpreter.settings.iter().cloned(),
    )))
}

fn notebook_events(_: &ServiceRegistry) -> Result<Arc<NotebookEventHub>, ServiceError> {
    Ok(Arc::new(NotebookEventHub::new()))
}

fn notebook(registry: &ServiceRegistry) -> Result<Arc<Notebook>, ServiceError> {
    Ok(Arc::new(Notebook::new(
        registry.notebook_repo()?,
        registry.notebook_events()?,
        registry.config().recovery.enabled,
    )))
}

fn notebook_service(registry: &ServiceRegistry) -> Result<Arc<dyn NotebookService>, ServiceError> {
    Ok(Arc::new(DefaultNotebookService::new(
        registry.notebook()?,
        registry.authorization()?,
        registry.interpreter_settings()?,
    )))
}

fn plugin_manager(_: &ServiceRegistry) -> Result<Arc<PluginManager>, ServiceError> {
    Ok(Arc::new(PluginManager::new()))
}
