//! Rule expressions
//!
//! Rules state their invariants as small C-like boolean expressions over a
//! [`Snapshot`]. Expressions are parsed once, when the rule set is built,
//! and keep their source text so a failing sub-expression can be pointed at
//! in the rendered message.
//!
//! ```text
//! a.binding != b.binding
//! (root.flags & 0x8) != 0 || node.viewFormatCount <= 1
//! companion.mutableDescriptorTypeListCount > i
//! state(node.framebuffer).flags & 0x1
//! ```

use crate::diagnostic::CapturedValue;
use crate::snapshot::{Scope, Snapshot};
use chainval_core::error::{ChainvalError, Result};
use chainval_core::value::Scalar;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Parser)]
#[grammar = "expr.pest"]
struct ExprParser;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "==" => CmpOp::Eq,
            "!=" => CmpOp::Ne,
            "<" => CmpOp::Lt,
            "<=" => CmpOp::Le,
            ">" => CmpOp::Gt,
            ">=" => CmpOp::Ge,
            _ => return None,
        })
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        }
    }
}

/// Loop indices available to pairwise and per-element rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexVar {
    I,
    J,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Scalar),
    Path { scope: Scope, fields: Vec<String> },
    Index(IndexVar),
    /// `state(handle).field` read from the object state registry
    State { handle: Box<Expr>, fields: Vec<String> },
    Not(Box<Expr>),
    BitAnd(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

/// One node of a parsed expression with its byte span in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: (usize, usize),
}

/// Why an expression could not be evaluated
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// The scope is not bound in this snapshot (e.g. no companion yet)
    Unbound(Scope),
    MissingField(String),
    /// No registry, or the registry does not know the handle
    NoState(String),
    NotComparable(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EvalError::Unbound(scope) => write!(f, "scope `{}` is not bound", scope),
            EvalError::MissingField(path) => write!(f, "no value at `{}`", path),
            EvalError::NoState(handle) => write!(f, "no state for `{}`", handle),
            EvalError::NotComparable(what) => write!(f, "not comparable: {}", what),
        }
    }
}

/// A parsed expression together with its source text
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self> {
        let mut pairs = ExprParser::parse(Rule::expression, source).map_err(|e| {
            ChainvalError::Expression {
                expression: source.to_string(),
                message: e.variant.message().to_string(),
            }
        })?;
        let top = pairs
            .next()
            .and_then(|p| p.into_inner().next())
            .ok_or_else(|| ChainvalError::Expression {
                expression: source.to_string(),
                message: "empty expression".to_string(),
            })?;
        let root = build(top).map_err(|message| ChainvalError::Expression {
            expression: source.to_string(),
            message,
        })?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    /// Source text of a sub-expression
    pub fn text_of(&self, expr: &Expr) -> &str {
        self.source.get(expr.span.0..expr.span.1).unwrap_or("")
    }

    pub fn eval(&self, snap: &Snapshot<'_>) -> std::result::Result<Scalar, EvalError> {
        eval(&self.root, snap)
    }

    /// Evaluate as a condition
    pub fn check(&self, snap: &Snapshot<'_>) -> std::result::Result<bool, EvalError> {
        truth(&self.root, snap)
    }

    /// The sub-expression responsible for a false result
    ///
    /// Descends through conjunctions to the first false conjunct; any other
    /// node is blamed as a whole.
    pub fn blame(&self, snap: &Snapshot<'_>) -> &Expr {
        blame(&self.root, snap)
    }

    /// Every value the expression reads, labelled with its source text
    pub fn captured_values(&self, snap: &Snapshot<'_>) -> Vec<CapturedValue> {
        let mut leaves = Vec::new();
        collect_leaves(&self.root, &mut leaves);

        let mut seen = BTreeSet::new();
        leaves
            .into_iter()
            .filter_map(|leaf| {
                let label = self.text_of(leaf).to_string();
                if !seen.insert(label.clone()) {
                    return None;
                }
                eval(leaf, snap)
                    .ok()
                    .map(|value| CapturedValue { label, value })
            })
            .collect()
    }

    /// Scopes and indices the expression refers to
    pub fn references(&self) -> References {
        let mut refs = References::default();
        gather_refs(&self.root, &mut refs);
        refs
    }

    /// Every `scope.field...` path the expression reads
    pub fn paths(&self) -> Vec<(Scope, &[String])> {
        let mut leaves = Vec::new();
        collect_leaves(&self.root, &mut leaves);
        let mut out = Vec::new();
        for leaf in leaves {
            push_paths(leaf, &mut out);
        }
        out
    }
}

fn push_paths<'e>(expr: &'e Expr, out: &mut Vec<(Scope, &'e [String])>) {
    match &expr.kind {
        ExprKind::Path { scope, fields } => out.push((*scope, fields.as_slice())),
        ExprKind::State { handle, .. } => push_paths(handle, out),
        _ => {}
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Scopes and loop indices used by an expression
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct References {
    pub scopes: BTreeSet<Scope>,
    pub uses_i: bool,
    pub uses_j: bool,
    pub uses_state: bool,
}

// ============================================================================
// Parsing
// ============================================================================

fn span_of(pair: &Pair<'_, Rule>) -> (usize, usize) {
    let span = pair.as_span();
    (span.start(), span.end())
}

fn build(pair: Pair<'_, Rule>) -> std::result::Result<Expr, String> {
    let span = span_of(&pair);
    match pair.as_rule() {
        Rule::or_expr | Rule::and_expr => {
            let is_or = pair.as_rule() == Rule::or_expr;
            let mut parts = pair
                .into_inner()
                .map(build)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            if parts.len() == 1 {
                return Ok(parts.remove(0));
            }
            let kind = if is_or {
                ExprKind::Or(parts)
            } else {
                ExprKind::And(parts)
            };
            Ok(Expr { kind, span })
        }
        Rule::cmp_expr => {
            let mut inner = pair.into_inner();
            let lhs = build(next_pair(&mut inner)?)?;
            let Some(op) = inner.next() else {
                return Ok(lhs);
            };
            let op = CmpOp::parse(op.as_str())
                .ok_or_else(|| format!("unknown operator `{}`", op.as_str()))?;
            let rhs = build(next_pair(&mut inner)?)?;
            Ok(Expr {
                kind: ExprKind::Compare(op, Box::new(lhs), Box::new(rhs)),
                span,
            })
        }
        Rule::bit_expr => {
            let mut operands = pair.into_inner().filter(|p| p.as_rule() != Rule::bit_and);
            let first = build(next_pair(&mut operands)?)?;
            operands.try_fold(first, |acc, p| {
                let rhs = build(p)?;
                let joined = (acc.span.0, rhs.span.1);
                Ok(Expr {
                    kind: ExprKind::BitAnd(Box::new(acc), Box::new(rhs)),
                    span: joined,
                })
            })
        }
        Rule::unary => {
            let mut nots = 0usize;
            let mut operand = None;
            for p in pair.into_inner() {
                if p.as_rule() == Rule::not_op {
                    nots += 1;
                } else {
                    operand = Some(build(p)?);
                }
            }
            let operand = operand.ok_or_else(|| "missing operand".to_string())?;
            if nots == 0 {
                return Ok(operand);
            }
            let mut expr = operand;
            for _ in 0..nots {
                expr = Expr {
                    kind: ExprKind::Not(Box::new(expr)),
                    span,
                };
            }
            Ok(expr)
        }
        Rule::state_ref => {
            let mut inner = pair.into_inner();
            let handle = build(next_pair(&mut inner)?)?;
            let fields = idents(next_pair(&mut inner)?);
            Ok(Expr {
                kind: ExprKind::State {
                    handle: Box::new(handle),
                    fields,
                },
                span,
            })
        }
        Rule::float => {
            let v: f64 = pair
                .as_str()
                .parse()
                .map_err(|_| format!("invalid float `{}`", pair.as_str()))?;
            Ok(Expr {
                kind: ExprKind::Literal(Scalar::Float(v)),
                span,
            })
        }
        Rule::number => Ok(Expr {
            kind: ExprKind::Literal(parse_number(pair.as_str())?),
            span,
        }),
        Rule::boolean => Ok(Expr {
            kind: ExprKind::Literal(Scalar::Bool(pair.as_str() == "true")),
            span,
        }),
        Rule::path => {
            let mut segments = idents(pair);
            let head = segments.remove(0);
            let kind = match (head.as_str(), segments.is_empty()) {
                ("i", true) => ExprKind::Index(IndexVar::I),
                ("j", true) => ExprKind::Index(IndexVar::J),
                ("null", true) => ExprKind::Literal(Scalar::UInt(0)),
                (scope, _) => ExprKind::Path {
                    scope: Scope::parse(scope)
                        .ok_or_else(|| format!("unknown scope `{}`", scope))?,
                    fields: segments,
                },
            };
            Ok(Expr { kind, span })
        }
        other => Err(format!("unexpected {:?}", other)),
    }
}

fn next_pair<'i>(
    pairs: &mut impl Iterator<Item = Pair<'i, Rule>>,
) -> std::result::Result<Pair<'i, Rule>, String> {
    pairs.next().ok_or_else(|| "truncated expression".to_string())
}

fn idents(path: Pair<'_, Rule>) -> Vec<String> {
    path.into_inner().map(|p| p.as_str().to_string()).collect()
}

fn parse_number(text: &str) -> std::result::Result<Scalar, String> {
    if let Some(hex) = text.strip_prefix("0x") {
        return u64::from_str_radix(hex, 16)
            .map(Scalar::Flags)
            .map_err(|_| format!("invalid hex literal `{}`", text));
    }
    if text.starts_with('-') {
        return text
            .parse::<i64>()
            .map(Scalar::Int)
            .map_err(|_| format!("invalid integer `{}`", text));
    }
    text.parse::<u64>()
        .map(Scalar::UInt)
        .map_err(|_| format!("invalid integer `{}`", text))
}

// ============================================================================
// Evaluation
// ============================================================================

fn eval(expr: &Expr, snap: &Snapshot<'_>) -> std::result::Result<Scalar, EvalError> {
    match &expr.kind {
        ExprKind::Literal(v) => Ok(v.clone()),
        ExprKind::Path { scope, fields } => snap.read(*scope, fields),
        ExprKind::Index(var) => snap.index(*var).map(|i| Scalar::UInt(i as u64)),
        ExprKind::State { handle, fields } => {
            let handle = match eval(handle, snap)? {
                Scalar::Handle(h) => h,
                other => {
                    return Err(EvalError::NotComparable(format!(
                        "state() of {} value",
                        other.kind_name()
                    )))
                }
            };
            snap.read_state(&handle, fields)
        }
        ExprKind::Not(inner) => truth(inner, snap).map(|b| Scalar::Bool(!b)),
        ExprKind::BitAnd(lhs, rhs) => {
            let l = integer(lhs, snap)?;
            let r = integer(rhs, snap)?;
            Ok(Scalar::Flags((l & r) as u64))
        }
        ExprKind::Compare(op, lhs, rhs) => {
            let l = eval(lhs, snap)?;
            let r = eval(rhs, snap)?;
            let ord = l.compare(&r).ok_or_else(|| {
                EvalError::NotComparable(format!("{} with {}", l.kind_name(), r.kind_name()))
            })?;
            Ok(Scalar::Bool(op.holds(ord)))
        }
        ExprKind::And(_) | ExprKind::Or(_) => truth(expr, snap).map(Scalar::Bool),
    }
}

fn integer(expr: &Expr, snap: &Snapshot<'_>) -> std::result::Result<i128, EvalError> {
    let v = eval(expr, snap)?;
    v.as_integer()
        .ok_or_else(|| EvalError::NotComparable(format!("bit test on {}", v.kind_name())))
}

/// Short-circuits: `&&` stops at the first false operand and `||` at the
/// first true one, so guarded reads are never attempted.
fn truth(expr: &Expr, snap: &Snapshot<'_>) -> std::result::Result<bool, EvalError> {
    match &expr.kind {
        ExprKind::And(parts) => {
            for part in parts {
                if !truth(part, snap)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ExprKind::Or(parts) => {
            for part in parts {
                if truth(part, snap)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => {
            let v = eval(expr, snap)?;
            v.truthy()
                .ok_or_else(|| EvalError::NotComparable(format!("{} as condition", v.kind_name())))
        }
    }
}

fn blame<'e>(expr: &'e Expr, snap: &Snapshot<'_>) -> &'e Expr {
    if let ExprKind::And(parts) = &expr.kind {
        for part in parts {
            if let Ok(false) = truth(part, snap) {
                return blame(part, snap);
            }
        }
    }
    expr
}

fn collect_leaves<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match &expr.kind {
        ExprKind::Literal(_) => {}
        ExprKind::Path { .. } | ExprKind::Index(_) | ExprKind::State { .. } => out.push(expr),
        ExprKind::Not(inner) => collect_leaves(inner, out),
        ExprKind::BitAnd(l, r) | ExprKind::Compare(_, l, r) => {
            collect_leaves(l, out);
            collect_leaves(r, out);
        }
        ExprKind::And(parts) | ExprKind::Or(parts) => {
            for part in parts {
                collect_leaves(part, out);
            }
        }
    }
}

fn gather_refs(expr: &Expr, refs: &mut References) {
    match &expr.kind {
        ExprKind::Literal(_) => {}
        ExprKind::Path { scope, .. } => {
            refs.scopes.insert(*scope);
        }
        ExprKind::Index(IndexVar::I) => refs.uses_i = true,
        ExprKind::Index(IndexVar::J) => refs.uses_j = true,
        ExprKind::State { handle, .. } => {
            refs.uses_state = true;
            gather_refs(handle, refs);
        }
        ExprKind::Not(inner) => gather_refs(inner, refs),
        ExprKind::BitAnd(l, r) | ExprKind::Compare(_, l, r) => {
            gather_refs(l, refs);
            gather_refs(r, refs);
        }
        ExprKind::And(parts) | ExprKind::Or(parts) => {
            for part in parts {
                gather_refs(part, refs);
            }
        }
    }
}
