//! Structured step-event stream emitted by the Worker Session Runner.

use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct StepEvent {
    pub label: String,
    pub elapsed_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StepEvent {
    pub fn new(label: &str, elapsed: Duration) -> Self {
        Self {
            label: label.to_string(),
            elapsed_seconds: elapsed.as_secs_f64(),
            detail: None,
        }
    }

    pub fn with_detail(label: &str, elapsed: Duration, detail: impl Into<String>) -> Self {
        Self {
            label: label.to_string(),
            elapsed_seconds: elapsed.as_secs_f64(),
            detail: Some(detail.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub events: Vec<StepEvent>,
    pub final_reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_event_serializes_without_detail_field_when_absent() {
        let event = StepEvent::new("resolve_paths", Duration::from_millis(5));
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("detail"));
    }

    #[test]
    fn step_event_includes_detail_when_present() {
        let event = StepEvent::with_detail("claim_epic", Duration::from_millis(5), "epic-1");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"detail\":\"epic-1\""));
    }
}
