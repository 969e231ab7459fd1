//! Note search variants.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::services::notebook::Note;
use crate::services::ServiceError;

/// Full-text search over notes.
pub trait SearchService: Send + Sync {
    fn name(&self) -> &'static str;

    fn index(&self, note: &Note);

    fn remove(&self, note_id: &str);

    /// Ids of notes whose name or paragraph text contains every query term.
    fn query(&self, query: &str) -> Vec<String>;
}

/// Search turned off.
#[derive(Debug, Default)]
pub struct NoSearch;

impl SearchService for NoSearch {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn index(&self, _note: &Note) {}

    fn remove(&self, _note_id: &str) {}

    fn query(&self, _query: &str) -> Vec<String> {
        Vec::new()
    }
}

/// In-memory index keyed by note id.
#[derive(Debug)]
pub struct IndexedSearch {
    max_results: usize,
    documents: RwLock<BTreeMap<String, String>>,
}

impl IndexedSearch {
    pub fn new(max_results: usize) -> Result<Self, ServiceError> {
        if max_results == 0 {
            return Err(ServiceError::Config(
                "search must return at least one result".to_string(),
            ));
        }
        Ok(Self {
            max_results,
            documents: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SearchService for IndexedSearch {
    fn name(&self) -> &'static str {
        "indexed"
    }

    fn index(&self, note: &Note) {
        let mut text = note.name.to_lowercase();
        for paragraph in &note.paragraphs {
            text.push('\n');
            text.push_str(&paragraph.text.to_lowercase());
        }
        self.documents.write().insert(note.id.clone(), text);
    }

    fn remove(&self, note_id: &str) {
        self.documents.write().remove(note_id);
    }

    fn query(&self, query: &str) -> Vec<String> {
        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if terms.is_empty() {
            return Vec::new();
        }
        self.documents
            .read()
            .iter()
            .filter(|(_, text)| terms.iter().all(|term| text.contains(term.as_str())))
            .map(|(id, _)| id.clone())
            .take(self.max_results)
            .collect()
    }
}
