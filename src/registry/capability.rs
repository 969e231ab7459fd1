//! Capabilities and the variant chosen for each.
//!
//! Variant selection is a pure function of the configuration, evaluated once
//! at startup by [`ServiceBindings::resolve`].

use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::config::ServerConfig;

/// A pluggable subsystem the registry holds exactly one instance of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    Authentication,
    Authorization,
    Scheduler,
    Search,
    NoteParser,
    NotebookRepo,
    InterpreterSettings,
    NotebookEvents,
    Notebook,
    NotebookService,
    PluginManager,
}

impl Capability {
    pub const ALL: [Capability; 11] = [
        Capability::Authentication,
        Capability::Authorization,
        Capability::Scheduler,
        Capability::Search,
        Capability::NoteParser,
        Capability::NotebookRepo,
        Capability::InterpreterSettings,
        Capability::NotebookEvents,
        Capability::Notebook,
        Capability::NotebookService,
        Capability::PluginManager,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Capability::Authentication => "authentication",
            Capability::Authorization => "authorization",
            Capability::Scheduler => "scheduler",
            Capability::Search => "search",
            Capability::NoteParser => "note_parser",
            Capability::NotebookRepo => "notebook_repo",
            Capability::InterpreterSettings => "interpreter_settings",
            Capability::NotebookEvents => "notebook_events",
            Capability::Notebook => "notebook",
            Capability::NotebookService => "notebook_service",
            Capability::PluginManager => "plugin_manager",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthVariant {
    /// Users and roles come from an external realm file.
    Realm,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerVariant {
    Cron,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchVariant {
    Indexed,
    Disabled,
}

/// Instance lifetime. Every binding is currently a process-wide singleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifetime {
    #[default]
    Singleton,
}

/// One capability bound to the name of its chosen variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBinding {
    pub capability: Capability,
    pub variant: &'static str,
    pub lifetime: Lifetime,
}

/// The variant chosen for every capability with more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceBindings {
    pub auth: AuthVariant,
    pub scheduler: SchedulerVariant,
    pub search: SearchVariant,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid configuration for {capability}: {message}")]
    InvalidConfiguration {
        capability: Capability,
        message: String,
    },
}

impl RegistryError {
    fn invalid(capability: Capability, message: impl Into<String>) -> Self {
        RegistryError::InvalidConfiguration {
            capability,
            message: message.into(),
        }
    }
}

impl ServiceBindings {
    /// Decide every variant from `config`.
    ///
    /// Fails before anything is constructed when a chosen variant cannot work
    /// with the supplied settings.
    pub fn resolve(config: &ServerConfig) -> Result<Self, RegistryError> {
        let realm_path = config.auth.realm_config_path.trim();
        let auth = if realm_path.is_empty() {
            AuthVariant::None
        } else if Path::new(realm_path).is_file() {
            AuthVariant::Realm
        } else {
            return Err(RegistryError::invalid(
                Capability::Authentication,
                format!("realm file {realm_path} does not exist"),
            ));
        };

        let scheduler = if config.notebook.cron_enabled {
            if config.notebook.cron_pool_size == 0 {
                return Err(RegistryError::invalid(
                    Capability::Scheduler,
                    "notebook.cron_pool_size must be at least 1",
                ));
            }
            SchedulerVariant::Cron
        } else {
            SchedulerVariant::Disabled
        };

        let search = if config.notebook.search_enabled {
            if config.notebook.search_max_results == 0 {
                return Err(RegistryError::invalid(
                    Capability::Search,
                    "notebook.search_max_results must be at least 1",
                ));
            }
            SearchVariant::Indexed
        } else {
            SearchVariant::Disabled
        };

        Ok(Self {
            auth,
            scheduler,
            search,
        })
    }

    /// The full binding table, one entry per capability.
    pub fn table(&self) -> Vec<ServiceBinding> {
        Capability::ALL
            .iter()
            .map(|&capability| ServiceBinding {
                capability,
                variant: self.variant_name(capability),
                lifetime: Lifetime::Singleton,
            })
            .collect()
    }

    pub fn variant_name(&self, capability: Capability) -> &'static str {
        match capability {
            Capability::Authentication => match self.auth {
                AuthVariant::Realm => "realm",
                AuthVariant::None => "none",
            },
            Capability::Scheduler => match self.scheduler {
                SchedulerVariant::Cron => "cron",
                SchedulerVariant::Disabled => "disabled",
            },
            Capability::Search => match self.search {
                SearchVariant::Indexed => "indexed",
                SearchVariant::Disabled => "disabled",
            },
            _ => "default",
        }
    }
}
