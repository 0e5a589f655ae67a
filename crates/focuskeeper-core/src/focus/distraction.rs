use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistractionKind {
    /// The foreground target matched a blacklist rule.
    Blacklisted,
    /// Focus simply left the app for something not on the whitelist.
    Unfocused,
}

impl DistractionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DistractionKind::Blacklisted => "blacklisted",
            DistractionKind::Unfocused => "unfocused",
        }
    }
}

/// One auto-pause, written when a grace countdown expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistractionLogEntry {
    pub id: String,
    /// When focus was lost (countdown start).
    pub timestamp: DateTime<Utc>,
    /// When the auto-pause fired.
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub kind: DistractionKind,
    pub app_name: String,
    #[serde(default)]
    pub window_title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub annotation: Option<String>,
}

/// Append-only distraction history. Only `annotation` may change afterwards.
pub trait DistractionLog: Send + Sync {
    fn append(&self, entry: &DistractionLogEntry) -> Result<()>;

    fn annotate(&self, id: &str, annotation: Option<String>) -> Result<()>;

    fn delete(&self, id: &str) -> Result<()>;

    /// Oldest first.
    fn list(&self) -> Result<Vec<DistractionLogEntry>>;
}

#[derive(Debug, Default)]
pub struct InMemoryDistractionLog {
    entries: Mutex<Vec<DistractionLogEntry>>,
}

impl InMemoryDistractionLog {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(id: &str) -> crate::error::CoreError {
    DatabaseError::NotFound {
        table: "distractions",
        id: id.to_string(),
    }
    .into()
}

impl DistractionLog for InMemoryDistractionLog {
    fn append(&self, entry: &DistractionLogEntry) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());
        Ok(())
    }

    fn annotate(&self, id: &str, annotation: Option<String>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| not_found(id))?;
        entry.annotation = annotation;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<DistractionLogEntry>> {
        Ok(self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> DistractionLogEntry {
        let now = Utc::now();
        DistractionLogEntry {
            id: id.into(),
            timestamp: now,
            end_time: now,
            duration_ms: 0,
            kind: DistractionKind::Unfocused,
            app_name: "Mail".into(),
            window_title: None,
            url: None,
            annotation: None,
        }
    }

    #[test]
    fn annotate_then_clear() {
        let log = InMemoryDistractionLog::new();
        log.append(&entry("a")).unwrap();
        log.annotate("a", Some("urgent email".into())).unwrap();
        assert_eq!(log.list().unwrap()[0].annotation.as_deref(), Some("urgent email"));
        log.annotate("a", None).unwrap();
        assert!(log.list().unwrap()[0].annotation.is_none());
    }

    #[test]
    fn delete_unknown_id_fails() {
        let log = InMemoryDistractionLog::new();
        log.append(&entry("a")).unwrap();
        assert!(log.delete("b").is_err());
        log.delete("a").unwrap();
        assert!(log.list().unwrap().is_empty());
    }
}
