//! Semantic Rule Engine
//!
//! Runs every rule registered for a record's type and turns failures into
//! [`Diagnostic`]s carrying copies of the values involved. An expression
//! that cannot be evaluated (a missing field, an unknown object) means the
//! rule does not apply; the structural validator reports the gap instead.

use crate::diagnostic::{CapturedValue, Diagnostic, ExprTrace};
use crate::expr::Expression;
use crate::rule::{Rule, RuleShape};
use crate::rule_set::RuleSet;
use crate::snapshot::{ChainView, Snapshot};
use chainval_core::collaborators::ObjectStateRegistry;
use chainval_core::location::Location;
use chainval_core::severity::Severity;
use chainval_core::value::{Record, Scalar};
use chainval_registry::descriptor::TypeDescriptor;
use tracing::{debug, trace};

#[derive(Clone, Copy)]
pub struct RuleEngine<'a> {
    rules: &'a RuleSet,
    state: Option<&'a dyn ObjectStateRegistry>,
}

impl<'a> RuleEngine<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self { rules, state: None }
    }

    pub fn with_state(mut self, state: &'a dyn ObjectStateRegistry) -> Self {
        self.state = Some(state);
        self
    }

    pub fn rules(&self) -> &'a RuleSet {
        self.rules
    }

    /// Evaluate all rules owned by `descriptor` against `record`
    ///
    /// `chain` is the chain the record belongs to (or hangs under); its root
    /// is bound as `root` and companions are looked up in it.
    pub fn evaluate(
        &self,
        descriptor: &TypeDescriptor,
        record: &Record,
        location: &Location,
        chain: &ChainView<'_>,
    ) -> Vec<Diagnostic> {
        let root = chain.root().unwrap_or(record);
        let mut base = Snapshot::new(record).with_root(Some(root));
        if let Some(state) = self.state {
            base = base.with_state(state);
        }

        let mut out = Vec::new();
        for rule in self.rules.rules_for(descriptor) {
            trace!(rule = %rule.id, owner = %rule.owner_name, "evaluating rule");
            match &rule.shape {
                RuleShape::Assert(expr) => {
                    if let Some(d) = check(rule, expr, &base, location) {
                        out.push(d);
                    }
                }
                RuleShape::Pairwise { array, assert } => {
                    let elems = descriptor.view(record).elements(array);
                    let at = location.field(array.as_str());
                    for i in 0..elems.len() {
                        for j in 0..i {
                            let snap = base.with_pair((i, elems[i]), (j, elems[j]));
                            if let Some(d) = check(rule, assert, &snap, &at.index(i)) {
                                out.push(d.with_pair(i, j));
                            }
                        }
                    }
                }
                RuleShape::RequireCompanion { each, .. } => match each {
                    Some(array) => {
                        let at = location.field(array.as_str());
                        let elems = descriptor.view(record).elements(array);
                        for (i, elem) in elems.into_iter().enumerate() {
                            let snap = base.with_elem(i, elem);
                            out.extend(
                                companion(rule, &snap, &at.index(i), chain)
                                    .map(|d| d.with_element(i)),
                            );
                        }
                    }
                    None => out.extend(companion(rule, &base, location, chain)),
                },
                RuleShape::Custom(custom) => {
                    if !(custom.predicate)(&base) {
                        out.push(rule_failure(rule, &base, location));
                    }
                }
            }
        }
        out
    }
}

/// Evaluate a condition; `None` when it holds or does not apply
fn check(
    rule: &Rule,
    expr: &Expression,
    snap: &Snapshot<'_>,
    location: &Location,
) -> Option<Diagnostic> {
    match expr.check(snap) {
        Ok(true) => None,
        Ok(false) => Some(rule_failure(rule, snap, location).with_trace(trace_of(expr, snap))),
        Err(e) => {
            debug!(rule = %rule.id, expression = %expr, reason = %e, "rule not applicable");
            None
        }
    }
}

/// Trigger first, then the lookup, then the optional second stage
fn companion(
    rule: &Rule,
    snap: &Snapshot<'_>,
    location: &Location,
    chain: &ChainView<'_>,
) -> Option<Diagnostic> {
    let RuleShape::RequireCompanion {
        when,
        companion,
        companion_name,
        check: second,
        ..
    } = &rule.shape
    else {
        return None;
    };

    match when.check(snap) {
        Ok(true) => {}
        Ok(false) => return None,
        Err(e) => {
            debug!(rule = %rule.id, expression = %when, reason = %e, "trigger not applicable");
            return None;
        }
    }

    let Some(found) = chain.find(*companion) else {
        trace!(rule = %rule.id, companion = %companion_name, "companion missing");
        return Some(rule_failure(rule, snap, location));
    };

    let check = second.as_ref()?;
    let with_companion = snap.with_companion(&found.record);
    match check.assert.check(&with_companion) {
        Ok(true) => None,
        Ok(false) => Some(
            failure(
                check.id.as_str(),
                check.severity,
                &check.message,
                &check.args,
                rule,
                &with_companion,
                location,
            )
            .with_trace(trace_of(&check.assert, &with_companion)),
        ),
        Err(e) => {
            debug!(
                rule = %check.id,
                expression = %check.assert,
                reason = %e,
                "companion check not applicable"
            );
            None
        }
    }
}

fn rule_failure(rule: &Rule, snap: &Snapshot<'_>, location: &Location) -> Diagnostic {
    failure(
        &rule.id,
        rule.severity,
        &rule.message,
        &rule.args,
        rule,
        snap,
        location,
    )
}

fn failure(
    id: &str,
    severity: Severity,
    template: &str,
    args: &[Expression],
    rule: &Rule,
    snap: &Snapshot<'_>,
    location: &Location,
) -> Diagnostic {
    let captured = args
        .iter()
        .map(|arg| {
            let value = arg.eval(snap).unwrap_or_else(|e| {
                debug!(rule = %id, arg = %arg, reason = %e, "argument unavailable");
                Scalar::Text("<unavailable>".to_string())
            });
            CapturedValue::new(arg.source(), value)
        })
        .collect();

    let objects = rule
        .objects
        .iter()
        .filter_map(|e| match e.eval(snap) {
            Ok(Scalar::Handle(h)) => Some(h),
            _ => None,
        })
        .collect();

    Diagnostic::semantic(id, severity, location.to_string(), template)
        .with_args(captured)
        .with_objects(objects)
}

fn trace_of(expr: &Expression, snap: &Snapshot<'_>) -> ExprTrace {
    ExprTrace {
        expression: expr.source().to_string(),
        blame: expr.blame(snap).span,
        values: expr.captured_values(snap),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{CompanionCheckSpec, RuleOwner, RuleSpec};
    use chainval_core::value::{ExtensibleNode, FieldValue, TypeTag};
    use chainval_registry::descriptor::{ElementKind, FieldDescriptor, ScalarType};
    use chainval_registry::type_registry::TypeRegistry;

    const ROOT: TypeTag = TypeTag(1);
    const EXT: TypeTag = TypeTag(2);

    fn registry() -> TypeRegistry {
        TypeRegistry::builder()
            .with_type(
                TypeDescriptor::plain("Item")
                    .with_field(FieldDescriptor::scalar("key", ScalarType::U32))
                    .with_field(FieldDescriptor::scalar("flag", ScalarType::U32))
                    .with_field(FieldDescriptor::scalar("kind", ScalarType::Enum)),
            )
            .with_type(
                TypeDescriptor::extensible("Root", ROOT)
                    .with_field(FieldDescriptor::scalar("count", ScalarType::U32))
                    .with_field(FieldDescriptor::counted(
                        "items",
                        ElementKind::Struct("Item".to_string()),
                        "count",
                    )),
            )
            .with_type(
                TypeDescriptor::extensible("Ext", EXT)
                    .extends("Root")
                    .with_field(FieldDescriptor::scalar("listCount", ScalarType::U32)),
            )
            .build()
            .unwrap()
    }

    fn item(key: u32, flag: u32, kind: u32) -> Record {
        Record::new()
            .with("key", key)
            .with("flag", flag)
            .with("kind", FieldValue::Enum(kind))
    }

    fn root(items: Vec<Record>) -> Record {
        Record::new()
            .with("count", items.len() as u32)
            .with("items", FieldValue::array(items))
    }

    fn run(rules: &RuleSet, registry: &TypeRegistry, head: &ExtensibleNode) -> Vec<Diagnostic> {
        let chain = ChainView::collect(Some(head), 64);
        let desc = registry.by_tag(head.tag).unwrap();
        RuleEngine::new(rules).evaluate(desc, &head.record, &Location::root("pInfo"), &chain)
    }

    #[test]
    fn test_pairwise_reports_larger_index_first() {
        let registry = registry();
        let rules = RuleSet::builder()
            .with_rule(
                RuleSpec::pairwise("dup", RuleOwner::Tag(ROOT), "items", "a.key != b.key")
                    .message("items[%u] and items[%u] share key %u", ["i", "j", "a.key"]),
            )
            .build(&registry)
            .unwrap();

        let head = ExtensibleNode::new(ROOT, root(vec![item(5, 0, 0), item(6, 0, 0), item(5, 0, 0)]));
        let diags = run(&rules, &registry, &head);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].pair, Some((2, 0)));
        assert_eq!(diags[0].location, "pInfo->items[2]");
        assert_eq!(diags[0].args[0].value, Scalar::UInt(2));
        assert_eq!(diags[0].args[1].value, Scalar::UInt(0));
        assert_eq!(diags[0].args[2].value, Scalar::UInt(5));
        assert!(diags[0].trace.is_some());
    }

    #[test]
    fn test_pairwise_or_escape() {
        let registry = registry();
        let rules = RuleSet::builder()
            .with_rule(RuleSpec::pairwise(
                "dup",
                RuleOwner::Tag(ROOT),
                "items",
                "a.key != b.key || a.flag != b.flag",
            ))
            .build(&registry)
            .unwrap();
        let head = ExtensibleNode::new(ROOT, root(vec![item(5, 0, 0), item(5, 1, 0)]));
        assert!(run(&rules, &registry, &head).is_empty());
    }

    #[test]
    fn test_empty_array_never_pairs() {
        let registry = registry();
        let rules = RuleSet::builder()
            .with_rule(RuleSpec::pairwise("dup", RuleOwner::Tag(ROOT), "items", "false"))
            .build(&registry)
            .unwrap();
        let head = ExtensibleNode::new(
            ROOT,
            Record::new().with("count", 0u32).with("items", FieldValue::null_array()),
        );
        assert!(run(&rules, &registry, &head).is_empty());
    }

    fn companion_rules(registry: &TypeRegistry) -> RuleSet {
        RuleSet::builder()
            .with_rule(
                RuleSpec::require_companion("needs-ext", RuleOwner::Tag(ROOT), "elem.kind == 7", EXT)
                    .each("items")
                    .message("items[%u] needs Ext", ["i"])
                    .then_check(CompanionCheckSpec {
                        id: "ext-too-short".to_string(),
                        assert: "companion.listCount > i".to_string(),
                        message: "listCount %u <= %u".to_string(),
                        args: vec!["companion.listCount".to_string(), "i".to_string()],
                        severity: Severity::Error,
                    }),
            )
            .build(registry)
            .unwrap()
    }

    #[test]
    fn test_companion_missing_skips_second_stage() {
        let registry = registry();
        let rules = companion_rules(&registry);
        let head = ExtensibleNode::new(ROOT, root(vec![item(0, 0, 1), item(1, 0, 7)]));
        let diags = run(&rules, &registry, &head);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].rule_id, "needs-ext");
        assert_eq!(diags[0].element, Some(1));
        assert!(diags[0].trace.is_none());
    }

    #[test]
    fn test_companion_check_runs_when_present() {
        let registry = registry();
        let rules = companion_rules(&registry);
        let head = ExtensibleNode::link(vec![
            ExtensibleNode::new(ROOT, root(vec![item(0, 0, 7), item(1, 0, 7)])),
            ExtensibleNode::new(EXT, Record::new().with("listCount", 1u32)),
        ])
        .unwrap();
        let diags = run(&rules, &registry, &head);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].rule_id, "ext-too-short");
        assert_eq!(diags[0].element, Some(1));
        assert_eq!(diags[0].args[0].value, Scalar::UInt(1));
    }

    #[test]
    fn test_trigger_false_never_reads_companion() {
        let registry = registry();
        let rules = companion_rules(&registry);
        let head = ExtensibleNode::new(ROOT, root(vec![item(0, 0, 1)]));
        assert!(run(&rules, &registry, &head).is_empty());
    }

    #[test]
    fn test_custom_predicate() {
        fn even_count(snap: &Snapshot<'_>) -> bool {
            matches!(snap.node().get("count"), Some(FieldValue::U32(c)) if c % 2 == 0)
        }
        let registry = registry();
        let rules = RuleSet::builder()
            .with_rule(
                RuleSpec::custom("even", RuleOwner::Tag(ROOT), "count is even", even_count)
                    .message("count %u is odd", ["node.count"]),
            )
            .build(&registry)
            .unwrap();
        let head = ExtensibleNode::new(ROOT, root(vec![item(0, 0, 0)]));
        let diags = run(&rules, &registry, &head);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].args[0].value, Scalar::UInt(1));
    }
}
