//! Extraction events for callers that want to watch field resolution.

use std::fmt;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::models::extraction::FieldValue;

/// What happened to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome {
    Extracted(FieldValue),
    Empty,
    Failed(String),
}

impl fmt::Display for FieldOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldOutcome::Extracted(value) => write!(f, "extracted '{}'", value),
            FieldOutcome::Empty => f.write_str("empty"),
            FieldOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// One field resolution attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEvent {
    pub document_type: String,
    pub field: String,
    /// Extraction method name, or `"normalize"` for coercion failures.
    pub method: &'static str,
    pub outcome: FieldOutcome,
}

/// Receives field events during extraction.
pub trait ExtractionObserver: Send + Sync {
    fn on_field(&self, event: &FieldEvent);
}

/// Default observer: forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ExtractionObserver for TracingObserver {
    fn on_field(&self, event: &FieldEvent) {
        match &event.outcome {
            FieldOutcome::Failed(reason) => warn!(
                document_type = %event.document_type,
                field = %event.field,
                method = event.method,
                "Field extraction failed: {}",
                reason
            ),
            outcome => debug!(
                document_type = %event.document_type,
                field = %event.field,
                method = event.method,
                "Field {}",
                outcome
            ),
        }
    }
}

/// Observer that keeps every event; useful in tests and batch reports.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<FieldEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far.
    pub fn events(&self) -> Vec<FieldEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events for one field.
    pub fn events_for(&self, field: &str) -> Vec<FieldEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.field == field)
            .collect()
    }
}

impl ExtractionObserver for RecordingObserver {
    fn on_field(&self, event: &FieldEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
