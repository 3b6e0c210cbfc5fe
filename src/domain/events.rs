//! Synthesis history events.
//!
//! Every synth run is recorded in an append-only log next to the
//! generated templates. Events carry ids and timestamps; templates do not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single entry in the synthesis history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// Synth run this event belongs to
    pub synth_id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// Stack being synthesized
    pub stack_name: String,

    pub event_type: EventType,

    /// SHA-256 of the rendered template (completed runs only)
    pub template_hash: Option<String>,

    /// Number of resources in the template (completed runs only)
    pub resource_count: Option<usize>,

    /// Error message if failed
    pub error: Option<String>,
}

impl SynthEvent {
    pub fn new(synth_id: Uuid, stack_name: impl Into<String>, event_type: EventType) -> Self {
        Self {
            id: Uuid::new_v4(),
            synth_id,
            timestamp: Utc::now(),
            stack_name: stack_name.into(),
            event_type,
            template_hash: None,
            resource_count: None,
            error: None,
        }
    }

    pub fn with_template(mut self, template_hash: String, resource_count: usize) -> Self {
        self.template_hash = Some(template_hash);
        self.resource_count = Some(resource_count);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SynthStarted,
    SynthCompleted,
    SynthFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = SynthEvent::new(Uuid::new_v4(), "SiteStack", EventType::SynthCompleted)
            .with_template("abc123".to_string(), 12);

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"synth_completed\""));

        let parsed: SynthEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type, EventType::SynthCompleted);
        assert_eq!(parsed.resource_count, Some(12));
        assert_eq!(parsed.template_hash.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_event_with_error() {
        let event = SynthEvent::new(Uuid::new_v4(), "SiteStack", EventType::SynthFailed)
            .with_error("stack verification failed".to_string());
        assert_eq!(event.error.as_deref(), Some("stack verification failed"));
        assert!(event.template_hash.is_none());
    }
}
