//! Sessions and the store that holds them
//!
//! A session ties an opaque id to one opened workbook file plus the naming
//! choices made while exploring it. Nothing here is persisted.

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

/// One opened workbook
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Session {
    pub id: String,
    /// File name as given by the user
    pub file_name: String,
    pub path: PathBuf,
    /// Sheet names in workbook order
    pub sheets: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
    /// Sheet name -> column letters holding row labels
    pub naming_columns: BTreeMap<String, String>,
    /// Sheet name -> (cell address -> user-supplied name)
    pub manual_names: BTreeMap<String, BTreeMap<String, String>>,
}

impl Session {
    /// Create a session with a fresh v4 UUID
    pub fn new(file_name: impl Into<String>, path: impl Into<PathBuf>, sheets: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_name: file_name.into(),
            path: path.into(),
            sheets,
            uploaded_at: Utc::now(),
            naming_columns: BTreeMap::new(),
            manual_names: BTreeMap::new(),
        }
    }

    /// The stored sheet name matching `name` (case-insensitive, trimmed)
    pub fn find_sheet(&self, name: &str) -> Option<&str> {
        let wanted = name.trim().to_lowercase();
        self.sheets
            .iter()
            .find(|s| s.trim().to_lowercase() == wanted)
            .map(String::as_str)
    }

    /// Naming column configured for a sheet
    pub fn naming_column(&self, sheet: &str) -> Option<&str> {
        self.naming_columns.get(sheet).map(String::as_str)
    }

    /// Manual name recorded for a cell
    pub fn manual_name(&self, sheet: &str, address: &str) -> Option<&str> {
        self.manual_names
            .get(sheet)
            .and_then(|cells| cells.get(address))
            .map(String::as_str)
    }
}

/// Storage for sessions, keyed by id
pub trait SessionStore: Send + Sync {
    /// A copy of the session, if present
    fn get(&self, id: &str) -> Option<Session>;

    /// Insert or replace a session
    fn put(&self, session: Session);

    /// Remove a session, returning it
    fn delete(&self, id: &str) -> Option<Session>;

    /// Ids of all stored sessions
    fn ids(&self) -> Vec<String>;

    /// Apply a change to a stored session; `None` when the id is unknown
    fn update<T, F>(&self, id: &str, change: F) -> Option<T>
    where
        Self: Sized,
        F: FnOnce(&mut Session) -> T,
    {
        let mut session = self.get(id)?;
        let result = change(&mut session);
        self.put(session);
        Some(result)
    }
}

/// Thread-safe in-memory session store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<AHashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, id: &str) -> Option<Session> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn put(&self, session: Session) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id.clone(), session);
    }

    fn delete(&self, id: &str) -> Option<Session> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    // Holds the write lock for the whole change
    fn update<T, F>(&self, id: &str, change: F) -> Option<T>
    where
        Self: Sized,
        F: FnOnce(&mut Session) -> T,
    {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(id)
            .map(change)
    }
}
