//! Semantic rules
//!
//! A rule is declared as a [`RuleSpec`] (serde, so rule sets can live in
//! YAML) and compiled against a [`TypeRegistry`] into a [`Rule`] whose
//! expressions are parsed and whose paths are known to exist.
//!
//! Four shapes are supported:
//! - `assert`: one expression over the owning record
//! - `pairwise`: a relation between every pair of array elements
//! - `require_companion`: when a trigger holds, another node must be in
//!   the same chain, optionally followed by a check against it
//! - custom: a native predicate for logic the expression language lacks

use crate::expr::{Expression, References};
use crate::snapshot::{Scope, Snapshot};
use chainval_core::error::{ChainvalError, Result};
use chainval_core::severity::Severity;
use chainval_core::value::TypeTag;
use chainval_registry::descriptor::{ElementKind, FieldKind, TypeDescriptor};
use chainval_registry::type_registry::TypeRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The record type a rule is attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleOwner {
    /// A chainable struct, by tag
    Tag(TypeTag),
    /// Any struct, by name
    Type(String),
}

impl fmt::Display for RuleOwner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RuleOwner::Tag(tag) => write!(f, "tag {}", tag),
            RuleOwner::Type(name) => f.write_str(name),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Declarative form of a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    pub id: String,
    pub owner: RuleOwner,
    #[serde(default)]
    pub severity: Severity,
    /// printf-style template; `[[...]]` marks highlighted spans
    pub message: String,
    /// Expressions whose values fill the template placeholders in order
    #[serde(default)]
    pub args: Vec<String>,
    /// Expressions yielding the handles the diagnostic is about
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<String>,
    #[serde(flatten)]
    pub shape: ShapeSpec,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ShapeSpec {
    Assert {
        assert: String,
    },
    Pairwise {
        array: String,
        assert: String,
    },
    RequireCompanion {
        /// Run once per element of this array field
        #[serde(default, skip_serializing_if = "Option::is_none")]
        each: Option<String>,
        when: String,
        companion: TypeTag,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        then: Option<CompanionCheckSpec>,
    },
    #[serde(skip)]
    Custom(CustomPredicate),
}

/// Second stage of a companion rule, evaluated with `companion` bound
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanionCheckSpec {
    pub id: String,
    pub assert: String,
    pub message: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub severity: Severity,
}

/// Native predicate; returns `true` when the record is valid
#[derive(Clone, Copy)]
pub struct CustomPredicate {
    pub description: &'static str,
    pub predicate: fn(&Snapshot<'_>) -> bool,
}

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CustomPredicate")
            .field("description", &self.description)
            .finish()
    }
}

impl RuleSpec {
    fn new(id: impl Into<String>, owner: RuleOwner, shape: ShapeSpec) -> Self {
        Self {
            id: id.into(),
            owner,
            severity: Severity::Error,
            message: String::new(),
            args: Vec::new(),
            objects: Vec::new(),
            shape,
            enabled: true,
        }
    }

    pub fn assert(id: impl Into<String>, owner: RuleOwner, expression: impl Into<String>) -> Self {
        Self::new(
            id,
            owner,
            ShapeSpec::Assert {
                assert: expression.into(),
            },
        )
    }

    pub fn pairwise(
        id: impl Into<String>,
        owner: RuleOwner,
        array: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            owner,
            ShapeSpec::Pairwise {
                array: array.into(),
                assert: expression.into(),
            },
        )
    }

    pub fn require_companion(
        id: impl Into<String>,
        owner: RuleOwner,
        when: impl Into<String>,
        companion: TypeTag,
    ) -> Self {
        Self::new(
            id,
            owner,
            ShapeSpec::RequireCompanion {
                each: None,
                when: when.into(),
                companion,
                then: None,
            },
        )
    }

    pub fn custom(
        id: impl Into<String>,
        owner: RuleOwner,
        description: &'static str,
        predicate: fn(&Snapshot<'_>) -> bool,
    ) -> Self {
        Self::new(
            id,
            owner,
            ShapeSpec::Custom(CustomPredicate {
                description,
                predicate,
            }),
        )
    }

    /// Set the message template and its argument expressions
    pub fn message<I, S>(mut self, template: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.message = template.into();
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set a template that takes no arguments
    pub fn with_message(mut self, template: impl Into<String>) -> Self {
        self.message = template.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_object(mut self, expression: impl Into<String>) -> Self {
        self.objects.push(expression.into());
        self
    }

    /// Make a companion rule run per element of `array`
    pub fn each(mut self, array: impl Into<String>) -> Self {
        if let ShapeSpec::RequireCompanion { each, .. } = &mut self.shape {
            *each = Some(array.into());
        }
        self
    }

    /// Attach the second-stage check of a companion rule
    pub fn then_check(mut self, check: CompanionCheckSpec) -> Self {
        if let ShapeSpec::RequireCompanion { then, .. } = &mut self.shape {
            *then = Some(check);
        }
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Parse and check every expression against the owner's descriptor
    pub fn compile(&self, registry: &TypeRegistry) -> Result<Rule> {
        let owner = match &self.owner {
            RuleOwner::Tag(tag) => registry.by_tag(*tag),
            RuleOwner::Type(name) => registry.by_name(name),
        }
        .ok_or_else(|| ChainvalError::rule(&self.id, format!("unknown owner {}", self.owner)))?;

        let ctx = CompileContext {
            id: &self.id,
            owner,
            registry,
        };

        let (shape, binds) = match &self.shape {
            ShapeSpec::Assert { assert } => {
                let expr = ctx.expression(assert, &Binds::default())?;
                (RuleShape::Assert(expr), Binds::default())
            }
            ShapeSpec::Pairwise { array, assert } => {
                let element = ctx.array_element(array)?;
                let binds = Binds {
                    pair: Some(element),
                    ..Binds::default()
                };
                let expr = ctx.expression(assert, &binds)?;
                (
                    RuleShape::Pairwise {
                        array: array.clone(),
                        assert: expr,
                    },
                    binds,
                )
            }
            ShapeSpec::RequireCompanion {
                each,
                when,
                companion,
                then,
            } => {
                let elem = each.as_deref().map(|a| ctx.array_element(a)).transpose()?;
                let binds = Binds {
                    elem,
                    ..Binds::default()
                };
                let when = ctx.expression(when, &binds)?;
                let companion_desc = registry.by_tag(*companion).ok_or_else(|| {
                    ChainvalError::rule(&self.id, format!("unknown companion tag {}", companion))
                })?;
                let check = match then {
                    Some(spec) => {
                        let with_companion = Binds {
                            companion: Some(companion_desc),
                            ..binds.clone()
                        };
                        Some(CompanionCheck {
                            id: spec.id.clone(),
                            severity: spec.severity,
                            message: spec.message.clone(),
                            assert: ctx.expression(&spec.assert, &with_companion)?,
                            args: ctx.expressions(&spec.args, &with_companion)?,
                        })
                    }
                    None => None,
                };
                (
                    RuleShape::RequireCompanion {
                        each: each.clone(),
                        when,
                        companion: *companion,
                        companion_name: companion_desc.name.clone(),
                        check,
                    },
                    binds,
                )
            }
            ShapeSpec::Custom(predicate) => (RuleShape::Custom(*predicate), Binds::default()),
        };

        Ok(Rule {
            id: self.id.clone(),
            owner: self.owner.clone(),
            owner_name: owner.name.clone(),
            severity: self.severity,
            message: self.message.clone(),
            args: ctx.expressions(&self.args, &binds)?,
            objects: ctx.expressions(&self.objects, &binds)?,
            shape,
            enabled: self.enabled,
        })
    }
}

/// Scopes bound for one expression, with the descriptors behind them
#[derive(Debug, Clone, Default)]
struct Binds<'r> {
    pair: Option<&'r ElementKind>,
    elem: Option<&'r ElementKind>,
    companion: Option<&'r TypeDescriptor>,
}

struct CompileContext<'r> {
    id: &'r str,
    owner: &'r TypeDescriptor,
    registry: &'r TypeRegistry,
}

impl<'r> CompileContext<'r> {
    fn err(&self, reason: impl Into<String>) -> ChainvalError {
        ChainvalError::rule(self.id, reason)
    }

    fn array_element(&self, field: &str) -> Result<&'r ElementKind> {
        match self.owner.field(field).map(|f| &f.kind) {
            Some(FieldKind::FixedArray { element, .. })
            | Some(FieldKind::CountedArray { element, .. }) => Ok(element),
            Some(_) => Err(self.err(format!("`{}.{}` is not an array", self.owner.name, field))),
            None => Err(self.err(format!("`{}` has no field `{}`", self.owner.name, field))),
        }
    }

    fn expressions(&self, sources: &[String], binds: &Binds<'r>) -> Result<Vec<Expression>> {
        sources.iter().map(|s| self.expression(s, binds)).collect()
    }

    fn expression(&self, source: &str, binds: &Binds<'r>) -> Result<Expression> {
        let expr = Expression::parse(source)?;
        let References {
            scopes,
            uses_i,
            uses_j,
            ..
        } = expr.references();

        if (uses_i && binds.pair.is_none() && binds.elem.is_none())
            || (uses_j && binds.pair.is_none())
        {
            return Err(self.err(format!("`{}` uses an unbound index", source)));
        }
        for scope in scopes {
            let bound = match scope {
                Scope::Node | Scope::Root => true,
                Scope::A | Scope::B => binds.pair.is_some(),
                Scope::Elem => binds.elem.is_some(),
                Scope::Companion => binds.companion.is_some(),
            };
            if !bound {
                return Err(self.err(format!("`{}` is not available in `{}`", scope, source)));
            }
        }

        for (scope, fields) in expr.paths() {
            match scope {
                Scope::Node => self.check_fields(self.owner, fields, source)?,
                Scope::Companion => {
                    if let Some(desc) = binds.companion {
                        self.check_fields(desc, fields, source)?;
                    }
                }
                Scope::A | Scope::B => {
                    if let Some(kind) = binds.pair {
                        self.check_element(kind, fields, source)?;
                    }
                }
                Scope::Elem => {
                    if let Some(kind) = binds.elem {
                        self.check_element(kind, fields, source)?;
                    }
                }
                // The root type depends on where the owner ends up in a chain
                Scope::Root => {}
            }
        }
        Ok(expr)
    }

    fn check_element(&self, kind: &ElementKind, fields: &[String], source: &str) -> Result<()> {
        match kind {
            ElementKind::Scalar(_) if fields.is_empty() => Ok(()),
            ElementKind::Scalar(_) => Err(self.err(format!(
                "scalar elements have no fields in `{}`",
                source
            ))),
            ElementKind::Struct(name) => {
                let desc = self
                    .registry
                    .by_name(name)
                    .ok_or_else(|| self.err(format!("unknown element type `{}`", name)))?;
                self.check_fields(desc, fields, source)
            }
        }
    }

    /// Follows nested and pointer fields so `node.extent.width` is checked
    /// all the way down.
    fn check_fields(&self, desc: &TypeDescriptor, fields: &[String], source: &str) -> Result<()> {
        let Some((first, rest)) = fields.split_first() else {
            return Err(self.err(format!("`{}` reads a whole struct", source)));
        };
        let field = desc
            .field(first)
            .ok_or_else(|| self.err(format!("`{}` has no field `{}`", desc.name, first)))?;
        match (&field.kind, rest.is_empty()) {
            (FieldKind::Scalar { .. }, true) => Ok(()),
            (FieldKind::Nested { type_name }, false)
            | (FieldKind::OptionalPointer { type_name }, false) => {
                let nested = self
                    .registry
                    .by_name(type_name)
                    .ok_or_else(|| self.err(format!("unknown type `{}`", type_name)))?;
                self.check_fields(nested, rest, source)
            }
            _ => Err(self.err(format!(
                "`{}.{}` cannot be read as a scalar in `{}`",
                desc.name, first, source
            ))),
        }
    }
}

/// Compiled companion check
#[derive(Debug, Clone)]
pub struct CompanionCheck {
    pub id: String,
    pub severity: Severity,
    pub message: String,
    pub assert: Expression,
    pub args: Vec<Expression>,
}

#[derive(Debug, Clone)]
pub enum RuleShape {
    Assert(Expression),
    Pairwise {
        array: String,
        assert: Expression,
    },
    RequireCompanion {
        each: Option<String>,
        when: Expression,
        companion: TypeTag,
        companion_name: String,
        check: Option<CompanionCheck>,
    },
    Custom(CustomPredicate),
}

impl RuleShape {
    pub fn name(&self) -> &'static str {
        match self {
            RuleShape::Assert(_) => "assert",
            RuleShape::Pairwise { .. } => "pairwise",
            RuleShape::RequireCompanion { .. } => "require_companion",
            RuleShape::Custom(_) => "custom",
        }
    }
}

/// A rule ready for evaluation
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub owner: RuleOwner,
    /// Name of the owning struct type
    pub owner_name: String,
    pub severity: Severity,
    pub message: String,
    pub args: Vec<Expression>,
    pub objects: Vec<Expression>,
    pub shape: RuleShape,
    pub enabled: bool,
}

impl Rule {
    /// The expression whose failure this rule reports, if any
    pub fn expression(&self) -> Option<&Expression> {
        match &self.shape {
            RuleShape::Assert(e) => Some(e),
            RuleShape::Pairwise { assert, .. } => Some(assert),
            RuleShape::RequireCompanion { when, .. } => Some(when),
            RuleShape::Custom(_) => None,
        }
    }

    /// Every template this rule may render, keyed by rule id
    pub fn templates(&self) -> Vec<(&str, &str)> {
        let mut out = vec![(self.id.as_str(), self.message.as_str())];
        if let RuleShape::RequireCompanion {
            check: Some(check), ..
        } = &self.shape
        {
            out.push((check.id.as_str(), check.message.as_str()));
        }
        out
    }
}
