//! Notes, their storage, and the notebook aggregate.
//!
//! # Data Flow
//! ```text
//! FileNotebookRepo (one JSON file per note, parsed by a NoteParser)
//!     → Notebook (in-memory catalogue, recovery of interrupted paragraphs)
//!     → DefaultNotebookService (authorization + run-all)
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::services::auth::AuthorizationService;
use crate::services::context::ServiceContext;
use crate::services::events::{NotebookEvent, NotebookEventHub};
use crate::services::interpreter::InterpreterSettingManager;
use crate::services::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParagraphStatus {
    #[default]
    Ready,
    Pending,
    Running,
    Finished,
    Error,
    Abort,
}

impl ParagraphStatus {
    /// Pending or running: the paragraph was interrupted if the process died.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub status: ParagraphStatus,
}

impl Paragraph {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            status: ParagraphStatus::Ready,
        }
    }

    /// Interpreter named by a leading `%name` directive.
    pub fn interpreter(&self) -> Option<&str> {
        let directive = self.text.trim_start().strip_prefix('%')?;
        directive.split_whitespace().next()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
}

/// Converts between stored documents and [`Note`]s.
pub trait NoteParser: Send + Sync {
    fn parse(&self, raw: &str) -> Result<Note, ServiceError>;

    fn serialize(&self, note: &Note) -> Result<String, ServiceError>;
}

#[derive(Debug, Default)]
pub struct JsonNoteParser;

impl NoteParser for JsonNoteParser {
    fn parse(&self, raw: &str) -> Result<Note, ServiceError> {
        Ok(serde_json::from_str(raw)?)
    }

    fn serialize(&self, note: &Note) -> Result<String, ServiceError> {
        Ok(serde_json::to_string_pretty(note)?)
    }
}

/// Persistent note storage.
pub trait NotebookRepo: Send + Sync {
    /// Prepare the storage. Must run before any other call.
    fn init(&self, config: &ServerConfig, parser: Arc<dyn NoteParser>) -> Result<(), ServiceError>;

    /// Ids of every stored note.
    fn list(&self) -> Result<Vec<String>, ServiceError>;

    fn get(&self, note_id: &str) -> Result<Note, ServiceError>;

    fn save(&self, note: &Note) -> Result<(), ServiceError>;

    fn close(&self);
}

struct RepoState {
    dir: PathBuf,
    parser: Arc<dyn NoteParser>,
}

/// Notes stored as `<id>.json` under `notebook.dir`.
#[derive(Default)]
pub struct FileNotebookRepo {
    state: RwLock<Option<RepoState>>,
}

impl FileNotebookRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dir(&self) -> Option<PathBuf> {
        self.state.read().as_ref().map(|state| state.dir.clone())
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&Path, &dyn NoteParser) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(ServiceError::Closed("notebook repository"))?;
        f(&state.dir, state.parser.as_ref())
    }
}

fn note_file(dir: &Path, note_id: &str) -> Result<PathBuf, ServiceError> {
    let valid = !note_id.is_empty()
        && note_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ServiceError::NotFound(format!("note {note_id:?}")));
    }
    Ok(dir.join(format!("{note_id}.json")))
}

impl NotebookRepo for FileNotebookRepo {
    fn init(&self, config: &ServerConfig, parser: Arc<dyn NoteParser>) -> Result<(), ServiceError> {
        let dir = PathBuf::from(&config.notebook.dir);
        fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), "Notebook repository initialized");
        *self.state.write() = Some(RepoState { dir, parser });
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, ServiceError> {
        self.with_state(|dir, _| {
            let mut ids = Vec::new();
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
            ids.sort();
            Ok(ids)
        })
    }

    fn get(&self, note_id: &str) -> Result<Note, ServiceError> {
        self.with_state(|dir, parser| {
            let path = note_file(dir, note_id)?;
            if !path.is_file() {
                return Err(ServiceError::NotFound(format!("note {note_id}")));
            }
            parser.parse(&fs::read_to_string(path)?)
        })
    }

    fn save(&self, note: &Note) -> Result<(), ServiceError> {
        self.with_state(|dir, parser| {
            let path = note_file(dir, &note.id)?;
            fs::write(path, parser.serialize(note)?)?;
            Ok(())
        })
    }

    fn close(&self) {
        if self.state.write().take().is_some() {
            debug!("Notebook repository closed");
        }
    }
}

/// The in-memory catalogue of notes.
pub struct Notebook {
    repo: Arc<dyn NotebookRepo>,
    events: Arc<NotebookEventHub>,
    recovery_enabled: bool,
    notes: RwLock<BTreeMap<String, Note>>,
    closed: AtomicBool,
}

impl Notebook {
    pub fn new(repo: Arc<dyn NotebookRepo>, events: Arc<NotebookEventHub>, recovery_enabled: bool) -> Self {
        Self {
            repo,
            events,
            recovery_enabled,
            notes: RwLock::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Load every stored note. Notes that fail to load are skipped.
    pub fn init_notebook(&self) -> Result<usize, ServiceError> {
        self.ensure_open()?;
        let ids = self.repo.list()?;
        let mut loaded = 0;
        for id in ids {
            match self.repo.get(&id) {
                Ok(note) => {
                    self.notes.write().insert(note.id.clone(), note);
                    self.events.publish(NotebookEvent::NoteLoaded { note_id: id });
                    loaded += 1;
                }
                Err(e) => warn!(note_id = %id, error = %e, "Skipping unreadable note"),
            }
        }
        info!(notes = loaded, "Notebook initialized");
        Ok(loaded)
    }

    /// Handle paragraphs left pending or running by a previous process.
    ///
    /// With recovery enabled they are left for the recovered interpreter
    /// processes to finish; otherwise they are marked aborted. Returns the
    /// number of paragraphs found.
    pub fn recover_if_necessary(&self) -> usize {
        let interrupted: Vec<(String, String)> = self
            .notes
            .read()
            .values()
            .flat_map(|note| {
                note.paragraphs
                    .iter()
                    .filter(|p| p.status.is_active())
                    .map(move |p| (note.id.clone(), p.id.clone()))
            })
            .collect();

        if interrupted.is_empty() {
            return 0;
        }
        if self.recovery_enabled {
            info!(paragraphs = interrupted.len(), "Reattaching interrupted paragraphs");
            return interrupted.len();
        }
        for (note_id, paragraph_id) in &interrupted {
            if let Err(e) = self.set_paragraph_status(note_id, paragraph_id, ParagraphStatus::Abort) {
                warn!(note_id = %note_id, paragraph_id = %paragraph_id, error = %e, "Failed to abort paragraph");
            }
        }
        info!(paragraphs = interrupted.len(), "Aborted interrupted paragraphs");
        interrupted.len()
    }

    pub fn list_notes(&self) -> Vec<String> {
        self.notes.read().keys().cloned().collect()
    }

    pub fn get_note(&self, note_id: &str) -> Result<Note, ServiceError> {
        self.ensure_open()?;
        self.notes
            .read()
            .get(note_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("note {note_id}")))
    }

    /// Update one paragraph, persist the note and notify subscribers.
    pub fn set_paragraph_status(
        &self,
        note_id: &str,
        paragraph_id: &str,
        status: ParagraphStatus,
    ) -> Result<(), ServiceError> {
        self.ensure_open()?;
        let note = {
            let mut notes = self.notes.write();
            let note = notes
                .get_mut(note_id)
                .ok_or_else(|| ServiceError::NotFound(format!("note {note_id}")))?;
            let paragraph = note
                .paragraphs
                .iter_mut()
                .find(|p| p.id == paragraph_id)
                .ok_or_else(|| ServiceError::NotFound(format!("paragraph {paragraph_id}")))?;
            paragraph.status = status;
            note.clone()
        };
        self.repo.save(&note)?;
        self.events.publish(NotebookEvent::ParagraphStatus {
            note_id: note_id.to_string(),
            paragraph_id: paragraph_id.to_string(),
            status,
        });
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Drop the catalogue and close the repository. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.notes.write().clear();
        self.repo.close();
        info!("Notebook closed");
    }

    fn ensure_open(&self) -> Result<(), ServiceError> {
        if self.is_closed() {
            Err(ServiceError::Closed("notebook"))
        } else {
            Ok(())
        }
    }
}

/// Note-level operations exposed to the web layer and the run-once path.
pub trait NotebookService: Send + Sync {
    /// Run every paragraph of `note_id` in order, stopping at the first
    /// failure. Returns whether all paragraphs finished.
    fn run_all_paragraphs(&self, note_id: &str, context: &ServiceContext) -> Result<bool, ServiceError>;
}

pub struct DefaultNotebookService {
    notebook: Arc<Notebook>,
    authorization: Arc<AuthorizationService>,
    interpreters: Arc<InterpreterSettingManager>,
}

impl DefaultNotebookService {
    pub fn new(
        notebook: Arc<Notebook>,
        authorization: Arc<AuthorizationService>,
        interpreters: Arc<InterpreterSettingManager>,
    ) -> Self {
        Self {
            notebook,
            authorization,
            interpreters,
        }
    }

    fn run_paragraph(&self, note_id: &str, paragraph: &Paragraph) -> Result<bool, ServiceError> {
        if paragraph.text.trim().is_empty() {
            self.notebook
                .set_paragraph_status(note_id, &paragraph.id, ParagraphStatus::Finished)?;
            return Ok(true);
        }
        self.notebook
            .set_paragraph_status(note_id, &paragraph.id, ParagraphStatus::Running)?;

        let interpreter = paragraph
            .interpreter()
            .map(str::to_string)
            .or_else(|| self.interpreters.settings().into_iter().next());
        let outcome = match interpreter {
            Some(name) => self.interpreters.get_or_start(&name),
            None => Err(ServiceError::NotFound("default interpreter".to_string())),
        };

        let status = match outcome {
            Ok(_) => ParagraphStatus::Finished,
            Err(e) => {
                warn!(note_id, paragraph_id = %paragraph.id, error = %e, "Paragraph failed");
                ParagraphStatus::Error
            }
        };
        self.notebook.set_paragraph_status(note_id, &paragraph.id, status)?;
        Ok(status == ParagraphStatus::Finished)
    }
}

impl NotebookService for DefaultNotebookService {
    fn run_all_paragraphs(&self, note_id: &str, context: &ServiceContext) -> Result<bool, ServiceError> {
        let note = self.notebook.get_note(note_id)?;
        if !self.authorization.is_owner(note_id, context) {
            return Err(ServiceError::Unauthorized(format!(
                "{} cannot run note {note_id}",
                context.user()
            )));
        }
        for paragraph in &note.paragraphs {
            if !self.run_paragraph(note_id, paragraph)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
