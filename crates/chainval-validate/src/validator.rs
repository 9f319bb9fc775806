//! Validation facade
//!
//! Owns the registry, the rule set, the renderer and the collaborators, and
//! turns a validation call into rendered, reported messages plus a skip
//! decision.

use crate::walker::{ChainWalker, ValidationResult};
use chainval_core::collaborators::{HandleFormatter, HexHandleFormatter, ObjectStateRegistry, Reporter};
use chainval_core::config::ValidatorConfig;
use chainval_core::error::Result;
use chainval_core::location::Location;
use chainval_core::value::ExtensibleNode;
use chainval_registry::catalog::builtin_registry;
use chainval_registry::type_registry::TypeRegistry;
use chainval_render::renderer::{DiagnosticRenderer, Message};
use chainval_rules::catalog::builtin_rule_set;
use chainval_rules::diagnostic::{fingerprint, Diagnostic};
use chainval_rules::rule_set::RuleSet;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info_span};

/// Result of one validation call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub diagnostics: Vec<Diagnostic>,
    pub messages: Vec<Message>,
    /// The caller should not forward the call
    pub skip_call: bool,
    /// `blake3:` digest of the diagnostics
    pub fingerprint: String,
    pub nodes_visited: usize,
}

impl Outcome {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

pub struct Validator {
    registry: Arc<TypeRegistry>,
    rules: Arc<RuleSet>,
    renderer: DiagnosticRenderer,
    config: ValidatorConfig,
    state: Option<Arc<dyn ObjectStateRegistry>>,
    reporter: Option<Arc<dyn Reporter>>,
}

impl Validator {
    /// Built-in catalog and rules with default settings
    pub fn builtin() -> Result<Self> {
        Self::new(
            Arc::new(builtin_registry().clone()),
            Arc::new(builtin_rule_set().clone()),
            ValidatorConfig::default(),
        )
    }

    pub fn new(registry: Arc<TypeRegistry>, rules: Arc<RuleSet>, config: ValidatorConfig) -> Result<Self> {
        config.check()?;
        let renderer = Self::renderer(&rules, &config, Arc::new(HexHandleFormatter))?;
        Ok(Self {
            registry,
            rules,
            renderer,
            config,
            state: None,
            reporter: None,
        })
    }

    pub fn with_state(mut self, state: Arc<dyn ObjectStateRegistry>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Recompile the message templates with another handle formatter
    pub fn with_formatter(mut self, formatter: Arc<dyn HandleFormatter>) -> Result<Self> {
        self.renderer = Self::renderer(&self.rules, &self.config, formatter)?;
        Ok(self)
    }

    fn renderer(
        rules: &RuleSet,
        config: &ValidatorConfig,
        formatter: Arc<dyn HandleFormatter>,
    ) -> Result<DiagnosticRenderer> {
        Ok(DiagnosticRenderer::for_rule_set(rules, config.render_style, formatter)?
            .with_annotations(config.annotate_expressions))
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    // ========================================================================
    // VALIDATION
    // ========================================================================

    /// Validate a structured argument and its chain
    pub fn validate(&self, root: &ExtensibleNode) -> Outcome {
        let name = self.registry.tag_name(root.tag);
        self.validate_named(&name, root)
    }

    /// Same as [`validate`](Self::validate), with locations rooted at the
    /// parameter name the caller used, e.g. `pCreateInfo`
    pub fn validate_named(&self, param: &str, root: &ExtensibleNode) -> Outcome {
        let _span = info_span!("validate", param, tag = %root.tag).entered();
        let result = self
            .walker()
            .validate_argument_at(root, Location::root(param));
        self.finish(result)
    }

    /// Validate a bare extension chain; `None` is a valid empty chain
    pub fn validate_chain(&self, head: Option<&ExtensibleNode>) -> Outcome {
        let _span = info_span!("validate_chain").entered();
        let result = self.walker().walk_and_validate(head);
        self.finish(result)
    }

    fn walker(&self) -> ChainWalker<'_> {
        let walker = ChainWalker::new(&self.registry, &self.rules, &self.config);
        match &self.state {
            Some(state) => walker.with_state(state.as_ref()),
            None => walker,
        }
    }

    fn finish(&self, result: ValidationResult) -> Outcome {
        let messages = self.renderer.render_all(&result.diagnostics);

        let skip_call = match &self.reporter {
            // Every diagnostic is reported even after one asks for a skip
            Some(reporter) => result
                .diagnostics
                .iter()
                .zip(&messages)
                .fold(false, |skip, (d, m)| {
                    reporter.report(&d.objects, &d.rule_id, d.severity, &m.to_string()) || skip
                }),
            None => result
                .diagnostics
                .iter()
                .any(|d| d.severity >= self.config.abort_at),
        };

        debug!(
            diagnostics = result.diagnostics.len(),
            nodes = result.nodes_visited,
            skip_call,
            "validation finished"
        );

        Outcome {
            fingerprint: fingerprint(&result.diagnostics),
            diagnostics: result.diagnostics,
            messages,
            skip_call,
            nodes_visited: result.nodes_visited,
        }
    }
}
