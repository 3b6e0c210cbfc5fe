//! Append-only synthesis history.
//!
//! Events are stored as newline-delimited JSON next to the templates, one
//! line per event, in the order they happened.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::domain::{EventType, SynthEvent};

pub const HISTORY_FILE: &str = "history.jsonl";

/// File-based synthesis log using JSONL format
pub struct History {
    path: PathBuf,
}

impl History {
    /// History log inside an output directory
    pub fn open(out_dir: &Path) -> Self {
        Self {
            path: out_dir.join(HISTORY_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event to the log
    pub async fn append(&self, event: &SynthEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open history file: {}", self.path.display()))?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<SynthEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open history file: {}", self.path.display()))?;

        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: SynthEvent = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Most recent events first
    pub async fn recent(&self, limit: usize) -> Result<Vec<SynthEvent>> {
        let mut events = self.replay().await?;
        events.reverse();
        events.truncate(limit);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_append_and_replay_in_order() {
        let temp = TempDir::new().unwrap();
        let history = History::open(temp.path());
        let synth_id = Uuid::new_v4();

        history
            .append(&SynthEvent::new(synth_id, "SiteStack", EventType::SynthStarted))
            .await
            .unwrap();
        history
            .append(
                &SynthEvent::new(synth_id, "SiteStack", EventType::SynthCompleted)
                    .with_template("hash-1".to_string(), 12),
            )
            .await
            .unwrap();

        let events = history.replay().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::SynthStarted);
        assert_eq!(events[1].event_type, EventType::SynthCompleted);
        assert!(events.iter().all(|e| e.synth_id == synth_id));
    }

    #[tokio::test]
    async fn test_missing_history_is_empty() {
        let temp = TempDir::new().unwrap();
        let history = History::open(&temp.path().join("nowhere"));
        assert!(history.replay().await.unwrap().is_empty());
        assert!(history.recent(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let temp = TempDir::new().unwrap();
        let history = History::open(temp.path());

        for hash in ["first", "second"] {
            history
                .append(
                    &SynthEvent::new(Uuid::new_v4(), "SiteStack", EventType::SynthCompleted)
                        .with_template(hash.to_string(), 1),
                )
                .await
                .unwrap();
        }
        history
            .append(
                &SynthEvent::new(Uuid::new_v4(), "SiteStack", EventType::SynthFailed)
                    .with_error("boom".to_string()),
            )
            .await
            .unwrap();

        let recent = history.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event_type, EventType::SynthFailed);
        assert_eq!(recent[1].template_hash.as_deref(), Some("second"));
    }
}
