//! Reporters shipped with the validator
//!
//! The host normally supplies its own [`Reporter`]; these cover logging
//! and tests.

use chainval_core::collaborators::Reporter;
use chainval_core::severity::Severity;
use chainval_core::value::Handle;
use serde::Serialize;
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Logs every report through `tracing`
#[derive(Debug, Clone, Copy)]
pub struct TracingReporter {
    abort_at: Severity,
}

impl TracingReporter {
    pub fn new(abort_at: Severity) -> Self {
        Self { abort_at }
    }
}

impl Default for TracingReporter {
    fn default() -> Self {
        Self::new(Severity::Error)
    }
}

impl Reporter for TracingReporter {
    fn report(&self, objects: &[Handle], rule_id: &str, severity: Severity, message: &str) -> bool {
        let objects = objects.len();
        match severity {
            Severity::Info => info!(rule = rule_id, objects, "{}", message),
            Severity::Warning => warn!(rule = rule_id, objects, "{}", message),
            Severity::Error | Severity::Critical => error!(rule = rule_id, objects, "{}", message),
        }
        severity >= self.abort_at
    }
}

/// One call to [`CollectingReporter::report`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reported {
    pub objects: Vec<Handle>,
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
}

/// Keeps everything it is told; never asks for a skip
#[derive(Debug, Default)]
pub struct CollectingReporter {
    entries: Mutex<Vec<Reported>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Reported> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, objects: &[Handle], rule_id: &str, severity: Severity, message: &str) -> bool {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(Reported {
                objects: objects.to_vec(),
                rule_id: rule_id.to_string(),
                severity,
                message: message.to_string(),
            });
        }
        false
    }
}
