//! Diagnostics produced by structural and semantic validation
//!
//! A diagnostic carries everything needed to render it later: the message
//! template, the captured argument values and, for semantic rules, the
//! expression trace. Nothing in it borrows from the validated input.

use chainval_core::severity::Severity;
use chainval_core::value::{Handle, Scalar};
use serde::{Deserialize, Serialize};

/// Rule ids reported by the structural validator and the chain walker
pub mod structural {
    pub const MISSING_FIELD: &str = "missing-field";
    pub const TYPE_MISMATCH: &str = "type-mismatch";
    pub const NULL_ARRAY: &str = "null-array";
    pub const COUNT_EXCEEDS_LENGTH: &str = "count-exceeds-length";
    pub const ARRAY_TOO_SHORT: &str = "array-too-short";
    pub const CHAIN_TOO_LONG: &str = "chain-too-long";
    pub const EXTENSION_NOT_ALLOWED: &str = "extension-not-allowed";
    pub const DUPLICATE_EXTENSION: &str = "duplicate-extension";
    pub const EXTENSION_VERSION: &str = "extension-version";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Structural,
    Semantic,
}

/// A value copied out of the input when a rule fails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedValue {
    pub label: String,
    pub value: Scalar,
}

impl CapturedValue {
    pub fn new(label: impl Into<String>, value: Scalar) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// The failing expression and the values it read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprTrace {
    pub expression: String,
    /// Byte span of the sub-expression blamed for the failure
    pub blame: (usize, usize),
    pub values: Vec<CapturedValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub rule_id: String,
    pub kind: DiagnosticKind,
    pub severity: Severity,
    /// Path of the offending value, e.g. `pCreateInfo->pBindings[2]`
    pub location: String,
    /// printf-style message template
    pub template: String,
    /// Values substituted into the template, positionally
    #[serde(default)]
    pub args: Vec<CapturedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<ExprTrace>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<Handle>,
    /// `(i, j)` of a failing pairwise rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair: Option<(usize, usize)>,
    /// Element index of a per-element rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<usize>,
}

impl Diagnostic {
    pub fn structural(
        rule_id: impl Into<String>,
        location: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            kind: DiagnosticKind::Structural,
            severity: Severity::Error,
            location: location.into(),
            template: template.into(),
            args: Vec::new(),
            trace: None,
            objects: Vec::new(),
            pair: None,
            element: None,
        }
    }

    pub fn semantic(
        rule_id: impl Into<String>,
        severity: Severity,
        location: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            kind: DiagnosticKind::Semantic,
            severity,
            ..Self::structural(rule_id, location, template)
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_arg(mut self, label: impl Into<String>, value: Scalar) -> Self {
        self.args.push(CapturedValue::new(label, value));
        self
    }

    pub fn with_args(mut self, args: Vec<CapturedValue>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn with_trace(mut self, trace: ExprTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn with_objects(mut self, objects: Vec<Handle>) -> Self {
        self.objects = objects;
        self
    }

    pub fn with_pair(mut self, i: usize, j: usize) -> Self {
        self.pair = Some((i, j));
        self
    }

    pub fn with_element(mut self, index: usize) -> Self {
        self.element = Some(index);
        self
    }

    pub fn is_structural(&self) -> bool {
        self.kind == DiagnosticKind::Structural
    }
}

/// Stable digest of a diagnostic set, `blake3:<hex>`
///
/// Two runs over the same input produce the same diagnostics in the same
/// order, so equal fingerprints mean equal results.
pub fn fingerprint(diagnostics: &[Diagnostic]) -> String {
    let mut hasher = blake3::Hasher::new();
    for d in diagnostics {
        let kind = match d.kind {
            DiagnosticKind::Structural => "structural",
            DiagnosticKind::Semantic => "semantic",
        };
        hasher.update(d.rule_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(kind.as_bytes());
        hasher.update(&[0]);
        hasher.update(d.severity.to_string().as_bytes());
        hasher.update(&[0]);
        hasher.update(d.location.as_bytes());
        hasher.update(&[0]);
        if let Some((i, j)) = d.pair {
            hasher.update(format!("pair:{}:{}", i, j).as_bytes());
        }
        if let Some(i) = d.element {
            hasher.update(format!("elem:{}", i).as_bytes());
        }
        for arg in &d.args {
            hasher.update(format!("{}={:?};", arg.label, arg.value).as_bytes());
        }
        for h in &d.objects {
            hasher.update(format!("{}:{};", h.object_type, h.raw).as_bytes());
        }
        hasher.update(&[0xff]);
    }
    format!("blake3:{}", hasher.finalize())
}
