//! chainval rules: semantic rules, their expression language and the
//! engine that evaluates them
//!
//! Rules are attached to a tag or a struct name and come in four shapes
//! (assert, pairwise, require-companion, custom). Failures become
//! [`Diagnostic`]s holding copies of the values involved, ready to render.

pub mod catalog;
pub mod diagnostic;
pub mod engine;
pub mod expr;
pub mod rule;
pub mod rule_set;
pub mod snapshot;

pub use catalog::{builtin_rule_set, builtin_rules};
pub use diagnostic::{fingerprint, CapturedValue, Diagnostic, DiagnosticKind, ExprTrace};
pub use engine::RuleEngine;
pub use expr::{EvalError, Expression};
pub use rule::{
    CompanionCheck, CompanionCheckSpec, CustomPredicate, Rule, RuleOwner, RuleShape, RuleSpec,
    ShapeSpec,
};
pub use rule_set::{RuleSet, RuleSetBuilder, RuleSetFile};
pub use snapshot::{ChainView, Scope, Snapshot};
