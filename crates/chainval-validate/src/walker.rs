//! Extension Chain Walker
//!
//! Walks a tagged chain, resolving each tag against the registry. Known
//! nodes get the structural validator and their semantic rules; unknown
//! nodes are skipped. Records nested anywhere below a node are visited the
//! same way, including chains hanging off them.

use crate::structural::{RecordVisitor, StructuralValidator};
use chainval_core::collaborators::ObjectStateRegistry;
use chainval_core::config::{DuplicatePolicy, ValidatorConfig};
use chainval_core::location::Location;
use chainval_core::severity::Severity;
use chainval_core::value::{ExtensibleNode, Record, Scalar, TypeTag};
use chainval_registry::descriptor::TypeDescriptor;
use chainval_registry::type_registry::{TagResolution, TypeRegistry};
use chainval_rules::diagnostic::{structural, Diagnostic};
use chainval_rules::engine::RuleEngine;
use chainval_rules::rule_set::RuleSet;
use chainval_rules::snapshot::ChainView;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Everything one walk produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    /// Chain nodes visited, known or not
    pub nodes_visited: usize,
    /// Tags of the visited chain nodes, in visit order
    pub visited_tags: Vec<TypeTag>,
}

impl ValidationResult {
    fn merge(&mut self, other: ValidationResult) {
        self.diagnostics.extend(other.diagnostics);
        self.nodes_visited += other.nodes_visited;
        self.visited_tags.extend(other.visited_tags);
    }
}

#[derive(Clone, Copy)]
pub struct ChainWalker<'a> {
    registry: &'a TypeRegistry,
    rules: &'a RuleSet,
    config: &'a ValidatorConfig,
    state: Option<&'a dyn ObjectStateRegistry>,
}

impl<'a> ChainWalker<'a> {
    pub fn new(registry: &'a TypeRegistry, rules: &'a RuleSet, config: &'a ValidatorConfig) -> Self {
        Self {
            registry,
            rules,
            config,
            state: None,
        }
    }

    pub fn with_state(mut self, state: &'a dyn ObjectStateRegistry) -> Self {
        self.state = Some(state);
        self
    }

    /// Validate a bare chain; an absent head does nothing
    pub fn walk_and_validate(&self, head: Option<&ExtensibleNode>) -> ValidationResult {
        let mut result = ValidationResult::default();
        if let Some(head) = head {
            let chain = ChainView::collect(Some(head), self.config.max_chain_length);
            let base = Location::root("pNext");
            self.walk(head, None, &chain, &base, &mut result);
        }
        result
    }

    /// Validate a structured argument and then its chain
    pub fn validate_argument(&self, root: &ExtensibleNode) -> ValidationResult {
        let name = self.registry.tag_name(root.tag);
        self.validate_argument_at(root, Location::root(name))
    }

    /// Same as [`validate_argument`](Self::validate_argument) with the
    /// argument named as the caller sees it, e.g. `pCreateInfo`
    pub fn validate_argument_at(&self, root: &ExtensibleNode, location: Location) -> ValidationResult {
        let mut result = ValidationResult::default();
        let descriptor = match self.registry.resolve(root.tag) {
            TagResolution::Known(descriptor) => descriptor,
            TagResolution::Unknown(tag) => {
                debug!(tag = %tag, "unknown argument tag, nothing to validate");
                return result;
            }
        };

        // The argument heads the chain so `root` and companion lookups see it
        let chain = ChainView::collect(Some(root), self.config.max_chain_length.saturating_add(1));
        self.node(descriptor, &root.record, &location, &chain, &mut result);
        if let Some(first) = root.next() {
            self.walk(first, Some(descriptor), &chain, &location, &mut result);
        }
        result
    }

    fn walk(
        &self,
        first: &ExtensibleNode,
        owner: Option<&TypeDescriptor>,
        chain: &ChainView<'_>,
        base: &Location,
        result: &mut ValidationResult,
    ) {
        let limit = self.config.max_chain_length;
        let mut seen: HashMap<TypeTag, usize> = HashMap::new();

        for (n, node) in first.iter().enumerate() {
            if n >= limit {
                result.diagnostics.push(
                    Diagnostic::structural(
                        structural::CHAIN_TOO_LONG,
                        base.to_string(),
                        "pNext chain exceeds %zu nodes; the rest was not validated",
                    )
                    .with_arg("limit", Scalar::UInt(limit as u64)),
                );
                break;
            }
            result.nodes_visited += 1;
            result.visited_tags.push(node.tag);

            match self.registry.resolve(node.tag) {
                TagResolution::Unknown(tag) => {
                    debug!(tag = %tag, "unknown extension tag, skipping");
                }
                TagResolution::Known(descriptor) => {
                    trace!(node = %descriptor.name, index = n, "validating chain node");
                    let at = base.chain(descriptor.name.as_str());
                    let occurrences = seen.entry(node.tag).or_insert(0);
                    *occurrences += 1;
                    let duplicate = *occurrences > 1;
                    self.chain_checks(descriptor, owner, duplicate, &at, result);
                    self.node(descriptor, &node.record, &at, chain, result);
                }
            }
        }
    }

    fn chain_checks(
        &self,
        descriptor: &TypeDescriptor,
        owner: Option<&TypeDescriptor>,
        duplicate: bool,
        location: &Location,
        result: &mut ValidationResult,
    ) {
        let name = || Scalar::Text(descriptor.name.clone());

        if let Some(owner) = owner {
            if !self.registry.compat().is_allowed(&owner.name, &descriptor.name) {
                result.diagnostics.push(
                    Diagnostic::structural(
                        structural::EXTENSION_NOT_ALLOWED,
                        location.to_string(),
                        "[[%s]] is not a valid extension of %s",
                    )
                    .with_arg("extension", name())
                    .with_arg("root", Scalar::Text(owner.name.clone())),
                );
            }
        }

        if duplicate
            && descriptor.unique_in_chain
            && self.config.duplicate_policy == DuplicatePolicy::Reject
        {
            result.diagnostics.push(
                Diagnostic::structural(
                    structural::DUPLICATE_EXTENSION,
                    location.to_string(),
                    "[[%s]] appears more than once in the pNext chain",
                )
                .with_arg("extension", name()),
            );
        }

        if descriptor.introduced > self.config.api_version {
            result.diagnostics.push(
                Diagnostic::structural(
                    structural::EXTENSION_VERSION,
                    location.to_string(),
                    "%s requires API version %s but the target version is %s",
                )
                .with_severity(Severity::Warning)
                .with_arg("extension", name())
                .with_arg("introduced", Scalar::Text(descriptor.introduced.to_string()))
                .with_arg("target", Scalar::Text(self.config.api_version.to_string())),
            );
        }
    }

    /// Structural checks, then the node's own rules, then whatever the
    /// visitor collected below it
    fn node(
        &self,
        descriptor: &TypeDescriptor,
        record: &Record,
        location: &Location,
        chain: &ChainView<'_>,
        result: &mut ValidationResult,
    ) {
        let mut visitor = NodeVisitor {
            walker: self,
            chain,
            collected: ValidationResult::default(),
        };
        let structural = StructuralValidator::new(self.registry).validate(
            descriptor,
            record,
            location,
            &mut visitor,
        );
        result.diagnostics.extend(structural);
        result
            .diagnostics
            .extend(self.engine().evaluate(descriptor, record, location, chain));
        result.merge(visitor.collected);
    }

    fn engine(&self) -> RuleEngine<'a> {
        match self.state {
            Some(state) => RuleEngine::new(self.rules).with_state(state),
            None => RuleEngine::new(self.rules),
        }
    }
}

/// Runs rules on nested records and walks nested chains
struct NodeVisitor<'w, 'c> {
    walker: &'w ChainWalker<'w>,
    chain: &'c ChainView<'c>,
    collected: ValidationResult,
}

impl RecordVisitor for NodeVisitor<'_, '_> {
    fn visit_record(&mut self, descriptor: &TypeDescriptor, record: &Record, location: &Location) {
        let diagnostics = self
            .walker
            .engine()
            .evaluate(descriptor, record, location, self.chain);
        self.collected.diagnostics.extend(diagnostics);
    }

    fn visit_chain(&mut self, owner: &TypeDescriptor, record: &Record, location: &Location) {
        let Some(first) = record.next() else {
            return;
        };
        let chain = ChainView::collect(Some(first), self.walker.config.max_chain_length)
            .with_root(record);
        let mut nested = ValidationResult::default();
        self.walker
            .walk(first, Some(owner), &chain, location, &mut nested);
        self.collected.merge(nested);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainval_registry::descriptor::{FieldDescriptor, ScalarType};
    use chainval_rules::rule::{RuleOwner, RuleSpec};

    const ROOT: TypeTag = TypeTag(10);
    const EXT: TypeTag = TypeTag(11);
    const LATE: TypeTag = TypeTag(12);
    const OTHER_ROOT: TypeTag = TypeTag(13);

    fn registry() -> TypeRegistry {
        TypeRegistry::builder()
            .with_type(
                TypeDescriptor::extensible("Root", ROOT)
                    .with_field(FieldDescriptor::scalar("size", ScalarType::U32)),
            )
            .with_type(TypeDescriptor::extensible("OtherRoot", OTHER_ROOT))
            .with_type(
                TypeDescriptor::extensible("Ext", EXT)
                    .extends("Root")
                    .with_field(FieldDescriptor::scalar("value", ScalarType::U32)),
            )
            .with_type(
                TypeDescriptor::extensible("Late", LATE)
                    .introduced(chainval_core::value::ApiVersion::new(9, 0)),
            )
            .build()
            .unwrap()
    }

    fn rules(registry: &TypeRegistry) -> RuleSet {
        RuleSet::builder()
            .with_rule(
                RuleSpec::assert("ext-value", RuleOwner::Tag(EXT), "node.value != 0")
                    .with_message("value is 0"),
            )
            .with_rule(
                RuleSpec::assert("ext-fits", RuleOwner::Tag(EXT), "node.value <= root.size")
                    .with_message("value exceeds size"),
            )
            .build(registry)
            .unwrap()
    }

    fn ext(value: u32) -> ExtensibleNode {
        ExtensibleNode::new(EXT, Record::new().with("value", value))
    }

    #[test]
    fn test_argument_then_chain() {
        let registry = registry();
        let rules = rules(&registry);
        let config = ValidatorConfig::default();
        let walker = ChainWalker::new(&registry, &rules, &config);

        let root = ExtensibleNode::new(ROOT, Record::new().with("size", 4u32).with_next(ext(8)));
        let result = walker.validate_argument(&root);
        assert_eq!(result.nodes_visited, 1);
        let ids: Vec<_> = result.diagnostics.iter().map(|d| d.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["ext-fits"]);
        assert_eq!(result.diagnostics[0].location, "Root->pNext<Ext>");
    }

    #[test]
    fn test_unknown_tags_are_skipped() {
        let registry = registry();
        let rules = rules(&registry);
        let config = ValidatorConfig::default();
        let walker = ChainWalker::new(&registry, &rules, &config);

        let head = ExtensibleNode::link(vec![
            ExtensibleNode::new(TypeTag(999), Record::new()),
            ext(0),
        ]);
        let result = walker.walk_and_validate(head.as_ref());
        assert_eq!(result.nodes_visited, 2);
        assert_eq!(result.visited_tags, vec![TypeTag(999), EXT]);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].rule_id, "ext-value");
    }

    #[test]
    fn test_chain_checks() {
        let registry = registry();
        let rules = RuleSet::default();
        let config = ValidatorConfig {
            api_version: chainval_core::value::ApiVersion::V1_3,
            ..ValidatorConfig::default()
        };
        let walker = ChainWalker::new(&registry, &rules, &config);

        let chain = ExtensibleNode::link(vec![
            ExtensibleNode::new(OTHER_ROOT, Record::new()),
            ext(1),
            ext(2),
            ExtensibleNode::new(LATE, Record::new()),
        ])
        .unwrap();
        let result = walker.validate_argument(&chain);
        let ids: Vec<_> = result.diagnostics.iter().map(|d| d.rule_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                structural::EXTENSION_NOT_ALLOWED,
                structural::EXTENSION_NOT_ALLOWED,
                structural::DUPLICATE_EXTENSION,
                structural::EXTENSION_VERSION,
            ]
        );
    }

    #[test]
    fn test_first_match_policy_ignores_duplicates() {
        let registry = registry();
        let rules = RuleSet::default();
        let config = ValidatorConfig {
            duplicate_policy: DuplicatePolicy::FirstMatch,
            ..ValidatorConfig::default()
        };
        let walker = ChainWalker::new(&registry, &rules, &config);
        let root = ExtensibleNode::link(vec![
            ExtensibleNode::new(ROOT, Record::new().with("size", 4u32)),
            ext(1),
            ext(2),
        ])
        .unwrap();
        assert!(walker.validate_argument(&root).diagnostics.is_empty());
    }

    #[test]
    fn test_chain_length_is_bounded() {
        let registry = registry();
        let rules = RuleSet::default();
        let config = ValidatorConfig {
            max_chain_length: 3,
            duplicate_policy: DuplicatePolicy::FirstMatch,
            ..ValidatorConfig::default()
        };
        let walker = ChainWalker::new(&registry, &rules, &config);
        let head = ExtensibleNode::link((0..10).map(|_| ext(1)).collect());
        let result = walker.walk_and_validate(head.as_ref());
        assert_eq!(result.nodes_visited, 3);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].rule_id, structural::CHAIN_TOO_LONG);
    }

    #[test]
    fn test_absent_head() {
        let registry = registry();
        let rules = rules(&registry);
        let config = ValidatorConfig::default();
        let result = ChainWalker::new(&registry, &rules, &config).walk_and_validate(None);
        assert_eq!(result, ValidationResult::default());
    }
}
