//! Rule Set
//!
//! The compiled, immutable collection of rules, indexed by owner. Built once
//! against a registry and shared by reference.
use crate::rule::{Rule, RuleOwner, RuleSpec};
use chainval_core::error::{ChainvalError, Result};
use chainval_registry::descriptor::TypeDescriptor;
use chainval_registry::type_registry::TypeRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    by_owner: HashMap<RuleOwner, Vec<usize>>,
}

/// On-disk rule set format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSetFile {
    pub version: String,
    pub rules: Vec<RuleSpec>,
}

impl RuleSet {
    pub fn builder() -> RuleSetBuilder {
        RuleSetBuilder::default()
    }

    /// Enabled rules that apply to records of this type
    ///
    /// Tag-owned rules come first, then rules owned by the type name, each
    /// in declaration order.
    pub fn rules_for<'a>(&'a self, descriptor: &TypeDescriptor) -> impl Iterator<Item = &'a Rule> {
        let by_tag = descriptor
            .tag
            .and_then(|tag| self.by_owner.get(&RuleOwner::Tag(tag)));
        let by_name = self.by_owner.get(&RuleOwner::Type(descriptor.name.clone()));
        by_tag
            .into_iter()
            .chain(by_name)
            .flatten()
            .map(move |&idx| &self.rules[idx])
            .filter(|rule| rule.enabled)
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Parse a rule set from YAML and compile it against `registry`
    pub fn from_yaml(yaml: &str, registry: &TypeRegistry) -> Result<Self> {
        let file: RuleSetFile = serde_yaml::from_str(yaml)
            .map_err(|e| ChainvalError::rule("<file>", e.to_string()))?;
        tracing::debug!(version = %file.version, rules = file.rules.len(), "parsed rule set");
        RuleSet::builder().with_rules(file.rules).build(registry)
    }

    pub fn load(path: impl AsRef<Path>, registry: &TypeRegistry) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content, registry)
    }
}

#[derive(Debug, Default, Clone)]
pub struct RuleSetBuilder {
    specs: Vec<RuleSpec>,
}

impl RuleSetBuilder {
    pub fn with_rule(mut self, spec: RuleSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn with_rules(mut self, specs: impl IntoIterator<Item = RuleSpec>) -> Self {
        self.specs.extend(specs);
        self
    }

    /// Compile every rule; the first invalid rule fails the whole set
    pub fn build(self, registry: &TypeRegistry) -> Result<RuleSet> {
        let mut ids = HashSet::new();
        let mut set = RuleSet::default();

        for spec in &self.specs {
            let rule = spec.compile(registry)?;
            for (id, _) in rule.templates() {
                if !ids.insert(id.to_string()) {
                    return Err(ChainvalError::rule(id, "duplicate rule id"));
                }
            }
            set.by_owner
                .entry(rule.owner.clone())
                .or_default()
                .push(set.rules.len());
            set.rules.push(rule);
        }

        tracing::debug!(rules = set.rules.len(), "compiled rule set");
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainval_registry::builtin_registry;
    use chainval_registry::catalog::tags;

    const RULES: &str = r#"
version: "1"
rules:
  - id: dsl-dup
    owner: 32
    shape: pairwise
    array: pBindings
    assert: a.binding != b.binding
    message: "binding %u repeated"
    args: [a.binding]
  - id: pcr-size
    owner: VkPushConstantRange
    shape: assert
    assert: node.size != 0
    message: "size is 0"
  - id: dsl-off
    owner: 32
    shape: assert
    assert: node.bindingCount < 100
    message: "too many"
    enabled: false
"#;

    #[test]
    fn test_from_yaml() {
        let registry = builtin_registry();
        let set = RuleSet::from_yaml(RULES, registry).unwrap();
        assert_eq!(set.len(), 3);

        let dslci = registry.by_tag(tags::DESCRIPTOR_SET_LAYOUT_CREATE_INFO).unwrap();
        let ids: Vec<_> = set.rules_for(dslci).map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["dsl-dup"]);

        let pcr = registry.by_name("VkPushConstantRange").unwrap();
        assert_eq!(set.rules_for(pcr).count(), 1);
        assert!(set.get("dsl-off").is_some());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let spec = RuleSpec::assert(
            "same",
            RuleOwner::Tag(tags::IMAGE_CREATE_INFO),
            "node.mipLevels != 0",
        );
        let err = RuleSet::builder()
            .with_rule(spec.clone())
            .with_rule(spec)
            .build(builtin_registry())
            .unwrap_err();
        assert!(err.to_string().contains("duplicate rule id"));
    }

    #[test]
    fn test_bad_yaml() {
        assert!(RuleSet::from_yaml("rules: [", builtin_registry()).is_err());
    }
}
