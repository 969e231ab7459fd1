//! Authentication variants and note authorization.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::services::context::{AuthenticationInfo, ServiceContext};
use crate::services::{ClusterEventListener, ServiceError};

/// Authenticates callers.
pub trait AuthenticationService: Send + Sync {
    /// Variant name, for logs and diagnostics.
    fn name(&self) -> &'static str;

    fn authenticate(&self, user: &str, password: &str) -> Result<ServiceContext, ServiceError>;
}

/// Every caller is anonymous.
#[derive(Debug, Default)]
pub struct NoAuthentication;

impl AuthenticationService for NoAuthentication {
    fn name(&self) -> &'static str {
        "none"
    }

    fn authenticate(&self, _user: &str, _password: &str) -> Result<ServiceContext, ServiceError> {
        Ok(ServiceContext::anonymous())
    }
}

#[derive(Debug, Deserialize)]
struct RealmFile {
    #[serde(default)]
    users: HashMap<String, RealmUser>,
}

#[derive(Debug, Deserialize)]
struct RealmUser {
    password: String,
    #[serde(default)]
    roles: BTreeSet<String>,
}

/// Users and roles delegated to an external realm file.
///
/// ```toml
/// [users.alice]
/// password = "secret"
/// roles = ["admin"]
/// ```
#[derive(Debug)]
pub struct RealmAuthentication {
    path: PathBuf,
    users: HashMap<String, RealmUser>,
}

impl RealmAuthentication {
    pub fn load(path: &Path) -> Result<Self, ServiceError> {
        let content = std::fs::read_to_string(path)?;
        let realm: RealmFile = toml::from_str(&content).map_err(|e| {
            ServiceError::Config(format!("realm file {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), users = realm.users.len(), "Realm loaded");
        Ok(Self {
            path: path.to_path_buf(),
            users: realm.users,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

impl AuthenticationService for RealmAuthentication {
    fn name(&self) -> &'static str {
        "realm"
    }

    fn authenticate(&self, user: &str, password: &str) -> Result<ServiceContext, ServiceError> {
        match self.users.get(user) {
            Some(entry) if entry.password == password => Ok(ServiceContext::new(
                AuthenticationInfo::new(user),
                entry.roles.clone(),
            )),
            _ => Err(ServiceError::Unauthorized(user.to_string())),
        }
    }
}

/// Ownership change broadcast to peers.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthEvent {
    note_id: String,
    owners: BTreeSet<String>,
}

/// Per-note owner lists.
///
/// Notes without an entry are readable by everybody.
#[derive(Debug, Default)]
pub struct AuthorizationService {
    owners: DashMap<String, BTreeSet<String>>,
}

impl AuthorizationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_owners(&self, note_id: &str, owners: BTreeSet<String>) {
        self.owners.insert(note_id.to_string(), owners);
    }

    pub fn owners(&self, note_id: &str) -> Option<BTreeSet<String>> {
        self.owners.get(note_id).map(|entry| entry.value().clone())
    }

    pub fn is_owner(&self, note_id: &str, context: &ServiceContext) -> bool {
        match self.owners.get(note_id) {
            None => true,
            Some(owners) if owners.is_empty() => true,
            Some(owners) => context.principals().any(|p| owners.contains(p)),
        }
    }

    /// Snapshot ordered by note id.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.owners
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl ClusterEventListener for AuthorizationService {
    fn on_cluster_event(&self, message: &str) {
        match serde_json::from_str::<AuthEvent>(message) {
            Ok(event) => self.set_owners(&event.note_id, event.owners),
            Err(e) => warn!(error = %e, "Ignoring malformed authorization event"),
        }
    }
}
