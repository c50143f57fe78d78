//! Local persistence for connection profiles and sent-message history.
//!
//! State lives in a directory as three files: `connections.json`,
//! `history.json` and `selected_connection`. Every mutating call writes
//! through immediately.

use bus_lens_core::{
    Credentials, Destination, EntityKind, MessageProperty, OutboundMessage, ValidationError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

/// Most recent sends kept in history
pub const MAX_HISTORY_ENTRIES: usize = 1000;

const CONNECTIONS_FILE: &str = "connections.json";
const HISTORY_FILE: &str = "history.json";
const SELECTED_FILE: &str = "selected_connection";

/// Errors raised by the local store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt store file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialise store data: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Invalid import data: {0}")]
    InvalidImport(#[source] serde_json::Error),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Message not found in history: {0}")]
    MessageNotFound(String),

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(#[from] ValidationError),
}

/// A saved connection string and its parsed parts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    pub id: String,
    pub name: String,
    pub connection_string: String,
    pub endpoint: String,
    pub key_name: String,
    pub key_value: String,
}

impl ConnectionProfile {
    /// Parse `connection_string` into a new profile with a fresh id
    pub fn new(name: impl Into<String>, connection_string: &str) -> Result<Self, StoreError> {
        let credentials: Credentials = connection_string.parse()?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            connection_string: connection_string.trim().to_string(),
            endpoint: credentials.endpoint().to_string(),
            key_name: credentials.key_name().to_string(),
            key_value: credentials.key_value().to_string(),
        })
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.endpoint, &self.key_name, &self.key_value)
    }
}

/// One successfully sent message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub body: String,
    #[serde(default)]
    pub properties: Vec<MessageProperty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(deserialize_with = "deserialize_sent_at")]
    pub sent_at: DateTime<Utc>,
    pub destination: String,
    #[serde(rename = "destinationType")]
    pub destination_kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_name: Option<String>,
}

impl HistoryEntry {
    pub fn record(
        destination: &Destination,
        message: &OutboundMessage,
        subscription_name: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            body: message.body.clone(),
            properties: message.properties.clone(),
            subject: message.subject.clone(),
            content_type: message.content_type.clone(),
            correlation_id: message.correlation_id.clone(),
            message_id: message.message_id.clone(),
            sent_at: Utc::now(),
            destination: destination.name.clone(),
            destination_kind: destination.kind,
            subscription_name,
        }
    }

    pub fn destination(&self) -> Destination {
        Destination {
            kind: self.destination_kind,
            name: self.destination.clone(),
        }
    }

    pub fn to_outbound(&self) -> OutboundMessage {
        OutboundMessage {
            body: self.body.clone(),
            properties: self.properties.clone(),
            subject: self.subject.clone(),
            content_type: self.content_type.clone(),
            correlation_id: self.correlation_id.clone(),
            message_id: self.message_id.clone(),
        }
    }
}

/// Export file layout; import replaces only the sections present
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connections: Option<Vec<ConnectionProfile>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_history: Option<Vec<HistoryEntry>>,
}

/// Counts of what an import replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub connections: Option<usize>,
    pub messages: Option<usize>,
}

/// File-backed store of profiles, the selected profile and message history
#[derive(Debug)]
pub struct LocalStore {
    directory: PathBuf,
    connections: Vec<ConnectionProfile>,
    history: Vec<HistoryEntry>,
    selected: Option<String>,
}

impl LocalStore {
    /// Load the store from `directory`; missing files start empty
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let directory = directory.into();
        let connections = read_json(&directory.join(CONNECTIONS_FILE))?.unwrap_or_default();
        let history = read_json(&directory.join(HISTORY_FILE))?.unwrap_or_default();

        let selected_path = directory.join(SELECTED_FILE);
        let selected = match fs::read_to_string(&selected_path) {
            Ok(text) => Some(text.trim().to_string()).filter(|id| !id.is_empty()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(StoreError::Io {
                    path: selected_path,
                    source,
                })
            }
        };

        debug!(directory = %directory.display(), "Opened local store");
        Ok(Self {
            directory,
            connections,
            history,
            selected,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    // ========================================================================
    // Connections
    // ========================================================================

    pub fn connections(&self) -> &[ConnectionProfile] {
        &self.connections
    }

    /// Insert a profile, or replace the one with the same id
    pub fn save_connection(&mut self, profile: ConnectionProfile) -> Result<(), StoreError> {
        match self.connections.iter_mut().find(|c| c.id == profile.id) {
            Some(existing) => *existing = profile,
            None => self.connections.push(profile),
        }
        self.write_connections()
    }

    /// Remove a profile by id or name; returns the removed profile
    pub fn delete_connection(&mut self, key: &str) -> Result<ConnectionProfile, StoreError> {
        let id = self.find_connection(key)?.id.clone();
        let index = self
            .connections
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| StoreError::ConnectionNotFound(key.to_string()))?;
        let removed = self.connections.remove(index);
        self.write_connections()?;

        if self.selected.as_deref() == Some(id.as_str()) {
            self.selected = None;
            self.write_selected()?;
        }
        Ok(removed)
    }

    /// Look up a profile by id or, failing that, by name
    pub fn find_connection(&self, key: &str) -> Result<&ConnectionProfile, StoreError> {
        self.connections
            .iter()
            .find(|c| c.id == key)
            .or_else(|| self.connections.iter().find(|c| c.name == key))
            .ok_or_else(|| StoreError::ConnectionNotFound(key.to_string()))
    }

    pub fn select_connection(&mut self, key: &str) -> Result<&ConnectionProfile, StoreError> {
        let id = self.find_connection(key)?.id.clone();
        self.selected = Some(id.clone());
        self.write_selected()?;
        self.find_connection(&id)
    }

    pub fn selected_connection(&self) -> Option<&ConnectionProfile> {
        let id = self.selected.as_deref()?;
        self.connections.iter().find(|c| c.id == id)
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Sent messages, newest first
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Prepend `entry`, keeping at most [`MAX_HISTORY_ENTRIES`]
    pub fn record_message(&mut self, entry: HistoryEntry) -> Result<(), StoreError> {
        self.history.insert(0, entry);
        self.history.truncate(MAX_HISTORY_ENTRIES);
        self.write_history()
    }

    pub fn clear_history(&mut self) -> Result<(), StoreError> {
        self.history.clear();
        self.write_history()
    }

    pub fn find_message(&self, id: &str) -> Result<&HistoryEntry, StoreError> {
        self.history
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::MessageNotFound(id.to_string()))
    }

    // ========================================================================
    // Export / import
    // ========================================================================

    /// Pretty JSON holding all connections and history
    pub fn export_json(&self) -> Result<String, StoreError> {
        let bundle = ExportBundle {
            connections: Some(self.connections.clone()),
            message_history: Some(self.history.clone()),
        };
        serde_json::to_string_pretty(&bundle).map_err(StoreError::Serialization)
    }

    /// Replace the sections present in `json`; nothing changes on malformed input
    pub fn import_json(&mut self, json: &str) -> Result<ImportSummary, StoreError> {
        let bundle: ExportBundle = serde_json::from_str(json).map_err(StoreError::InvalidImport)?;
        let mut summary = ImportSummary {
            connections: None,
            messages: None,
        };

        if let Some(connections) = bundle.connections {
            summary.connections = Some(connections.len());
            self.connections = connections;
            self.write_connections()?;
        }
        if let Some(mut history) = bundle.message_history {
            history.truncate(MAX_HISTORY_ENTRIES);
            summary.messages = Some(history.len());
            self.history = history;
            self.write_history()?;
        }

        info!(
            connections = ?summary.connections,
            messages = ?summary.messages,
            "Imported store data"
        );
        Ok(summary)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    fn write_connections(&self) -> Result<(), StoreError> {
        write_json(&self.directory, CONNECTIONS_FILE, &self.connections)
    }

    fn write_history(&self) -> Result<(), StoreError> {
        write_json(&self.directory, HISTORY_FILE, &self.history)
    }

    fn write_selected(&self) -> Result<(), StoreError> {
        let path = self.directory.join(SELECTED_FILE);
        let result = match &self.selected {
            Some(id) => ensure_directory(&self.directory).and_then(|_| fs::write(&path, id)),
            None => match fs::remove_file(&path) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        result.map_err(|source| StoreError::Io { path, source })
    }
}

/// Read `sentAt` as RFC 3339 text or as epoch milliseconds
fn deserialize_sent_at<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SentAt {
        Millis(i64),
        Text(DateTime<Utc>),
    }

    match SentAt::deserialize(deserializer)? {
        SentAt::Millis(millis) => DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            serde::de::Error::custom(format!("sentAt {} is out of range", millis))
        }),
        SentAt::Text(sent_at) => Ok(sent_at),
    }
}

fn ensure_directory(directory: &Path) -> io::Result<()> {
    fs::create_dir_all(directory)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

fn write_json<T: Serialize>(directory: &Path, file: &str, value: &T) -> Result<(), StoreError> {
    let path = directory.join(file);
    let json = serde_json::to_string_pretty(value).map_err(StoreError::Serialization)?;
    ensure_directory(directory)
        .and_then(|_| fs::write(&path, json))
        .map_err(|source| StoreError::Io { path, source })
}
