//! chainval validate: walks structured arguments and their extension chains
//!
//! Every known node gets the generic structural check (arrays present and
//! long enough, scalars of the declared type) and then the semantic rules
//! registered for its tag or struct name. Unknown tags are skipped.
//!
//! # Flow
//!
//! ```text
//! argument → structural → rules → pNext[0] → structural → rules → ...
//!                 ↓                               ↓
//!          nested records                  nested records
//!          (rules, chains)                 (rules, chains)
//! ```
//!
//! [`Validator`] wraps the walk with rendering, reporting and the skip
//! decision.

pub mod report;
pub mod structural;
pub mod validator;
pub mod walker;

pub use report::{CollectingReporter, Reported, TracingReporter};
pub use structural::{NoopVisitor, RecordVisitor, StructuralValidator};
pub use validator::{Outcome, Validator};
pub use walker::{ChainWalker, ValidationResult};

use chainval_core::value::ExtensibleNode;

// ============================================================================
// CONVENIENCE
// ============================================================================

/// Validate a bare chain against the built-in catalog and rules
pub fn walk_and_validate(head: Option<&ExtensibleNode>) -> ValidationResult {
    let config = chainval_core::config::ValidatorConfig::default();
    ChainWalker::new(
        chainval_registry::builtin_registry(),
        chainval_rules::builtin_rule_set(),
        &config,
    )
    .walk_and_validate(head)
}
