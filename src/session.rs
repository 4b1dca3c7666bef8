use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::db::executor::ResultSet;

/// How far a turn goes after SQL has been generated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnMode {
    SqlOnly,
    Execute,
    #[default]
    ExecuteAndExplain,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryEntry {
    pub question: String,
    pub sql: String,
    pub timestamp: DateTime<Utc>,
}

/// Generated queries for one session, in submission order.
#[derive(Debug, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn push(&mut self, question: &str, sql: &str) {
        self.entries.push(HistoryEntry {
            question: question.to_string(),
            sql: sql.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries paired with their 1-based submission number, most recent first.
    pub fn newest_first(&self) -> impl Iterator<Item = (usize, &HistoryEntry)> {
        self.entries.iter().enumerate().rev().map(|(i, entry)| (i + 1, entry))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    pub schema: String,
    /// `None` falls back to the configured default provider.
    pub provider: Option<String>,
    /// `None` falls back to the provider's first model.
    pub model: Option<String>,
    /// User-entered key; takes precedence over the environment.
    pub api_key: Option<String>,
    pub mode: TurnMode,
}

/// The most recent executed query and its rows, kept for export.
#[derive(Debug, Clone, Serialize)]
pub struct LastResult {
    pub question: String,
    pub sql: String,
    pub result: ResultSet,
}

#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub settings: SessionSettings,
    pub history: History,
    pub last_result: Option<LastResult>,
}

impl Session {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            settings,
            history: History::default(),
            last_result: None,
        }
    }
}

pub type SharedSession = Arc<Mutex<Session>>;

/// Live sessions keyed by id. Each session has its own lock, so turns in one
/// session run one at a time while separate sessions proceed independently.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SharedSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, settings: SessionSettings) -> (Uuid, SharedSession) {
        let session = Session::new(settings);
        let id = session.id;
        let shared = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, Arc::clone(&shared));
        info!("Created session {}", id);
        (id, shared)
    }

    pub async fn get(&self, id: &Uuid) -> Option<SharedSession> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &Uuid) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!("Removed session {}", id);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_listed_newest_first_until_cleared() {
        let mut history = History::default();
        for n in 1..=3 {
            history.push(&format!("question {n}"), &format!("SELECT {n}"));
        }

        let listed: Vec<(usize, &str)> = history
            .newest_first()
            .map(|(number, entry)| (number, entry.question.as_str()))
            .collect();
        assert_eq!(listed, vec![(3, "question 3"), (2, "question 2"), (1, "question 1")]);

        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.newest_first().count(), 0);
    }

    #[tokio::test]
    async fn store_create_get_remove() {
        let store = SessionStore::new();
        let (id, session) = store.create(SessionSettings::default()).await;

        assert_eq!(session.lock().await.id, id);
        assert!(store.get(&id).await.is_some());
        assert_eq!(store.len().await, 1);

        assert!(store.remove(&id).await);
        assert!(!store.remove(&id).await);
        assert!(store.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn sessions_do_not_share_history() {
        let store = SessionStore::new();
        let (_, first) = store.create(SessionSettings::default()).await;
        let (_, second) = store.create(SessionSettings::default()).await;

        first.lock().await.history.push("q", "SELECT 1");

        assert_eq!(first.lock().await.history.len(), 1);
        assert!(second.lock().await.history.is_empty());
    }
}
