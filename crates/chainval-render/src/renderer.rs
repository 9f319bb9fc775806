//! Diagnostic rendering
//!
//! Uses Handlebars with one helper per printf conversion:
//! - uint / int / size: decimal integers
//! - hex: hexadecimal digits
//! - cstr: strings, booleans and handles
//! - hl: block helper for `[[...]]` highlights
//! - backslash: a literal `\\` from the template text

use crate::annotate::annotate;
use crate::templates::MessageTemplate;
use chainval_core::collaborators::HandleFormatter;
use chainval_core::config::RenderStyle;
use chainval_core::error::{ChainvalError, Result};
use chainval_core::severity::Severity;
use chainval_core::value::Scalar;
use chainval_rules::diagnostic::{CapturedValue, Diagnostic};
use chainval_rules::rule_set::RuleSet;
use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext, Renderable,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Placeholder text for an argument the diagnostic did not capture
const MISSING: &str = "<missing>";

/// A rendered diagnostic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub rule_id: String,
    pub severity: Severity,
    pub location: String,
    pub text: String,
    /// Failing expression with a caret line under the blamed part
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[ {} ] {}: {}", self.rule_id, self.location, self.text)?;
        if let Some(annotation) = &self.annotation {
            write!(f, "\n{}", annotation)?;
        }
        Ok(())
    }
}

/// Compiled renderer with registered helpers
pub struct DiagnosticRenderer {
    handlebars: Handlebars<'static>,
    /// Template text each registered id was compiled from
    sources: std::collections::HashMap<String, String>,
    annotate: bool,
}

impl DiagnosticRenderer {
    pub fn new(style: RenderStyle, formatter: Arc<dyn HandleFormatter>) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);

        for conversion in ["uint", "int", "size", "hex", "cstr"] {
            handlebars.register_helper(
                conversion,
                Box::new(ScalarHelper {
                    hex: conversion == "hex",
                    formatter: formatter.clone(),
                }),
            );
        }
        handlebars.register_helper(
            "hl",
            Box::new(HighlightHelper {
                ansi: style == RenderStyle::Ansi,
            }),
        );

        handlebars.register_helper("backslash", Box::new(BackslashHelper));

        Self {
            handlebars,
            sources: Default::default(),
            annotate: true,
        }
    }

    /// Renderer with every template of `rules` compiled up front
    pub fn for_rule_set(
        rules: &RuleSet,
        style: RenderStyle,
        formatter: Arc<dyn HandleFormatter>,
    ) -> Result<Self> {
        let mut renderer = Self::new(style, formatter);
        for rule in rules.iter() {
            for (id, template) in rule.templates() {
                renderer.register(id, template)?;
            }
        }
        tracing::debug!(templates = renderer.sources.len(), "compiled message templates");
        Ok(renderer)
    }

    pub fn with_annotations(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    /// Compile and register a template under `id`
    pub fn register(&mut self, id: &str, template: &str) -> Result<()> {
        let compiled = MessageTemplate::parse(template)?.to_handlebars();
        self.handlebars
            .register_template_string(id, compiled)
            .map_err(|e| ChainvalError::Template(format!("{}: {}", id, e)))?;
        self.sources.insert(id.to_string(), template.to_string());
        Ok(())
    }

    pub fn template_count(&self) -> usize {
        self.sources.len()
    }

    /// Render one diagnostic
    ///
    /// Never fails: a template that cannot be rendered falls back to its
    /// raw text so the diagnostic is still reported.
    pub fn render(&self, diagnostic: &Diagnostic) -> Message {
        let text = self
            .render_registered(diagnostic)
            .unwrap_or_else(|| self.render_template(&diagnostic.template, &diagnostic.args))
            .unwrap_or_else(|e| {
                tracing::debug!(rule = %diagnostic.rule_id, error = %e, "falling back to raw template");
                diagnostic.template.clone()
            });

        let annotation = if self.annotate {
            diagnostic.trace.as_ref().map(annotate)
        } else {
            None
        };

        Message {
            rule_id: diagnostic.rule_id.clone(),
            severity: diagnostic.severity,
            location: diagnostic.location.clone(),
            text,
            annotation,
        }
    }

    pub fn render_all(&self, diagnostics: &[Diagnostic]) -> Vec<Message> {
        diagnostics.iter().map(|d| self.render(d)).collect()
    }

    /// Render an ad hoc template against captured values
    pub fn render_template(&self, template: &str, args: &[CapturedValue]) -> Result<String> {
        let compiled = MessageTemplate::parse(template)?.to_handlebars();
        self.handlebars
            .render_template(&compiled, &data(args))
            .map_err(|e| ChainvalError::Template(e.to_string()))
    }

    fn render_registered(&self, diagnostic: &Diagnostic) -> Option<Result<String>> {
        let source = self.sources.get(&diagnostic.rule_id)?;
        if source != &diagnostic.template {
            return None;
        }
        Some(
            self.handlebars
                .render(&diagnostic.rule_id, &data(&diagnostic.args))
                .map_err(|e| ChainvalError::Template(e.to_string())),
        )
    }
}

/// `{ "a0": <scalar>, "a1": ... }`
///
/// Floats are passed as text: JSON has no NaN or infinity.
fn data(args: &[CapturedValue]) -> Value {
    let mut map = Map::new();
    for (i, arg) in args.iter().enumerate() {
        let scalar = match &arg.value {
            Scalar::Float(v) => Scalar::Text(v.to_string()),
            other => other.clone(),
        };
        if let Ok(value) = serde_json::to_value(&scalar) {
            map.insert(format!("a{}", i), value);
        }
    }
    Value::Object(map)
}

// ============================================================================
// Custom Helpers
// ============================================================================

/// Formats one captured scalar
struct ScalarHelper {
    hex: bool,
    formatter: Arc<dyn HandleFormatter>,
}

impl ScalarHelper {
    fn format(&self, value: &Value) -> String {
        let Ok(scalar) = serde_json::from_value::<Scalar>(value.clone()) else {
            return MISSING.to_string();
        };
        match scalar {
            Scalar::Handle(handle) => self.formatter.format_handle(&handle),
            Scalar::Bool(b) => b.to_string(),
            Scalar::UInt(v) | Scalar::Flags(v) if self.hex => format!("{:x}", v),
            Scalar::Int(v) if self.hex => format!("{:x}", v),
            Scalar::Flags(v) => v.to_string(),
            other => other.to_string(),
        }
    }
}

impl HelperDef for ScalarHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let text = match h.param(0).map(|p| p.value()) {
            Some(v) if !v.is_null() => self.format(v),
            _ => MISSING.to_string(),
        };
        out.write(&text)?;
        Ok(())
    }
}

/// Bold in ANSI style, transparent in plain style
struct HighlightHelper {
    ansi: bool,
}

impl HelperDef for HighlightHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        if self.ansi {
            out.write("\x1b[1m")?;
        }
        if let Some(template) = h.template() {
            template.render(r, ctx, rc, out)?;
        }
        if self.ansi {
            out.write("\x1b[0m")?;
        }
        Ok(())
    }
}

struct BackslashHelper;

impl HelperDef for BackslashHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        _h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        out.write("\\")?;
        Ok(())
    }
}
