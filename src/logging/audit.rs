//! Audit logging for edits made through the admin and review APIs
//!
//! Every mutating operation is emitted on the `audit` tracing target and,
//! when a path is configured, appended to a JSONL file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::auth::{Identity, Role};

/// What was changed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RadarUpdated,
    BannerAdded,
    BannerToggled,
    BannerDeleted,
    ArrayDataUpdated,
    TechnologyNormalised,
}

/// One audited change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    /// Email of the caller
    pub actor: String,
    /// Role the change was made under
    pub role: Role,
    /// Number of records touched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
    /// Size of the written document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, actor: &Identity, role: Role) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            actor: actor.email.clone(),
            role,
            records: None,
            bytes: None,
            metadata: None,
        }
    }

    pub fn with_records(mut self, records: usize) -> Self {
        self.records = Some(records);
        self
    }

    pub fn with_bytes(mut self, bytes: usize) -> Self {
        self.bytes = Some(bytes);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Clone, Default)]
pub struct AuditLogger {
    inner: Arc<Mutex<Option<BufWriter<File>>>>,
}

impl AuditLogger {
    /// Logger that only emits tracing events
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append events to `path`
    pub async fn init_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        *self.inner.lock().await = Some(BufWriter::new(file));
        info!("Audit logging initialized to {}", path.display());
        Ok(())
    }

    pub async fn log(&self, event: AuditEvent) {
        let line = match event.to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        info!(
            target: "audit",
            action = ?event.action,
            actor = %event.actor,
            role = %event.role,
            records = event.records,
            bytes = event.bytes,
            "{}",
            line
        );

        let mut inner = self.inner.lock().await;
        if let Some(ref mut writer) = *inner {
            if let Err(e) = writeln!(writer, "{}", line) {
                error!("Failed to write audit event: {}", e);
            }
            if let Err(e) = writer.flush() {
                error!("Failed to flush audit log: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serialization() {
        let actor = Identity::new("a@ons.gov.uk", vec!["admin".into()]);
        let event = AuditEvent::new(AuditAction::BannerDeleted, &actor, Role::Admin).with_records(1);
        let line = event.to_jsonl().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["action"], "banner_deleted");
        assert_eq!(parsed["role"], "admin");
        assert_eq!(parsed["records"], 1);
        assert!(parsed.get("bytes").is_none());
    }

    #[tokio::test]
    async fn test_file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let logger = AuditLogger::new();
        logger.init_file(path.clone()).await.unwrap();

        let actor = Identity::development();
        logger
            .log(AuditEvent::new(AuditAction::RadarUpdated, &actor, Role::Reviewer).with_bytes(10))
            .await;
        logger
            .log(
                AuditEvent::new(AuditAction::TechnologyNormalised, &actor, Role::Admin)
                    .with_metadata(json!({"from": "JS", "to": "JavaScript"})),
            )
            .await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("JavaScript"));
    }
}
