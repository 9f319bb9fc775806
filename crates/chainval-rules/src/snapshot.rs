//! What a rule can see while it is evaluated

use crate::expr::{EvalError, IndexVar};
use chainval_core::collaborators::ObjectStateRegistry;
use chainval_core::value::{ExtensibleNode, FieldValue, Handle, Record, Scalar, TypeTag};
use std::fmt;

/// Named roots of an expression path
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    /// The record that owns the rule
    Node,
    /// The argument at the head of the chain
    Root,
    /// Pairwise element `i`
    A,
    /// Pairwise element `j`
    B,
    /// Current element of a per-element rule
    Elem,
    /// Companion node found in the chain
    Companion,
}

impl Scope {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "node" => Scope::Node,
            "root" => Scope::Root,
            "a" => Scope::A,
            "b" => Scope::B,
            "elem" => Scope::Elem,
            "companion" => Scope::Companion,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Scope::Node => "node",
            Scope::Root => "root",
            Scope::A => "a",
            Scope::B => "b",
            Scope::Elem => "elem",
            Scope::Companion => "companion",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Borrowed view of everything one rule evaluation may read
#[derive(Clone, Copy)]
pub struct Snapshot<'a> {
    node: &'a Record,
    root: Option<&'a Record>,
    a: Option<(usize, &'a FieldValue)>,
    b: Option<(usize, &'a FieldValue)>,
    elem: Option<(usize, &'a FieldValue)>,
    companion: Option<&'a Record>,
    state: Option<&'a dyn ObjectStateRegistry>,
}

impl<'a> Snapshot<'a> {
    pub fn new(node: &'a Record) -> Self {
        Self {
            node,
            root: None,
            a: None,
            b: None,
            elem: None,
            companion: None,
            state: None,
        }
    }

    pub fn with_root(mut self, root: Option<&'a Record>) -> Self {
        self.root = root;
        self
    }

    /// Bind `a`/`i` and `b`/`j`
    pub fn with_pair(mut self, a: (usize, &'a FieldValue), b: (usize, &'a FieldValue)) -> Self {
        self.a = Some(a);
        self.b = Some(b);
        self
    }

    /// Bind `elem`/`i`
    pub fn with_elem(mut self, index: usize, elem: &'a FieldValue) -> Self {
        self.elem = Some((index, elem));
        self
    }

    pub fn with_companion(mut self, companion: &'a Record) -> Self {
        self.companion = Some(companion);
        self
    }

    pub fn with_state(mut self, state: &'a dyn ObjectStateRegistry) -> Self {
        self.state = Some(state);
        self
    }

    pub fn node(&self) -> &'a Record {
        self.node
    }

    pub fn root(&self) -> Option<&'a Record> {
        self.root
    }

    pub fn elem(&self) -> Option<(usize, &'a FieldValue)> {
        self.elem
    }

    pub fn pair(&self) -> Option<((usize, &'a FieldValue), (usize, &'a FieldValue))> {
        self.a.zip(self.b)
    }

    pub fn companion(&self) -> Option<&'a Record> {
        self.companion
    }

    pub fn state(&self) -> Option<&'a dyn ObjectStateRegistry> {
        self.state
    }

    /// Value of `i` or `j`
    pub fn index(&self, var: IndexVar) -> Result<usize, EvalError> {
        let bound = match var {
            IndexVar::I => self.a.or(self.elem),
            IndexVar::J => self.b,
        };
        bound.map(|(idx, _)| idx).ok_or_else(|| {
            EvalError::MissingField(match var {
                IndexVar::I => "i".to_string(),
                IndexVar::J => "j".to_string(),
            })
        })
    }

    /// Read `scope.f1.f2...` as a scalar
    pub fn read(&self, scope: Scope, fields: &[String]) -> Result<Scalar, EvalError> {
        let start = match scope {
            Scope::Node => Cursor::Record(self.node),
            Scope::Root => Cursor::Record(self.root.ok_or(EvalError::Unbound(scope))?),
            Scope::Companion => Cursor::Record(self.companion.ok_or(EvalError::Unbound(scope))?),
            Scope::A => Cursor::Value(self.a.ok_or(EvalError::Unbound(scope))?.1),
            Scope::B => Cursor::Value(self.b.ok_or(EvalError::Unbound(scope))?.1),
            Scope::Elem => Cursor::Value(self.elem.ok_or(EvalError::Unbound(scope))?.1),
        };
        start
            .walk(fields)
            .ok_or_else(|| EvalError::MissingField(dotted(scope.name(), fields)))
    }

    /// Read a field of a live object's state
    pub fn read_state(&self, handle: &Handle, fields: &[String]) -> Result<Scalar, EvalError> {
        let described = || format!("{} 0x{:x}", handle.object_type, handle.raw);
        let registry = self.state.ok_or_else(|| EvalError::NoState(described()))?;
        let state = registry
            .get(handle)
            .ok_or_else(|| EvalError::NoState(described()))?;
        Cursor::Record(&state)
            .walk(fields)
            .ok_or_else(|| EvalError::MissingField(dotted("state", fields)))
    }
}

impl fmt::Debug for Snapshot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("node", self.node)
            .field("root", &self.root.is_some())
            .field("a", &self.a.map(|(i, _)| i))
            .field("b", &self.b.map(|(j, _)| j))
            .field("elem", &self.elem.map(|(i, _)| i))
            .field("companion", &self.companion.is_some())
            .field("state", &self.state.is_some())
            .finish()
    }
}

fn dotted(head: &str, fields: &[String]) -> String {
    std::iter::once(head)
        .chain(fields.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(".")
}

enum Cursor<'a> {
    Record(&'a Record),
    Value(&'a FieldValue),
}

impl<'a> Cursor<'a> {
    fn walk(self, fields: &[String]) -> Option<Scalar> {
        let mut cursor = self;
        for field in fields {
            let record = match cursor {
                Cursor::Record(r) => r,
                Cursor::Value(v) => v.as_record()?,
            };
            cursor = Cursor::Value(record.get(field)?);
        }
        match cursor {
            Cursor::Value(v) => v.as_scalar(),
            Cursor::Record(_) => None,
        }
    }
}

/// The nodes of one chain, head first
///
/// Companion lookup always returns the first node carrying the tag. The
/// root is the record the chain hangs off; for a chain walked on its own
/// it is the head node's record.
#[derive(Debug, Clone, Default)]
pub struct ChainView<'a> {
    root: Option<&'a Record>,
    nodes: Vec<&'a ExtensibleNode>,
}

impl<'a> ChainView<'a> {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Collect at most `limit` nodes starting at `head`
    pub fn collect(head: Option<&'a ExtensibleNode>, limit: usize) -> Self {
        Self {
            root: None,
            nodes: head.map(|h| h.iter().take(limit).collect()).unwrap_or_default(),
        }
    }

    /// Bind the record that owns the chain
    pub fn with_root(mut self, root: &'a Record) -> Self {
        self.root = Some(root);
        self
    }

    pub fn root(&self) -> Option<&'a Record> {
        self.root.or_else(|| self.head().map(|n| &n.record))
    }

    pub fn head(&self) -> Option<&'a ExtensibleNode> {
        self.nodes.first().copied()
    }

    pub fn nodes(&self) -> &[&'a ExtensibleNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, tag: TypeTag) -> Option<&'a ExtensibleNode> {
        self.nodes.iter().copied().find(|n| n.tag == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_through_pointer() {
        let node = Record::new().with(
            "pSpecializationInfo",
            FieldValue::pointer(Record::new().with("dataSize", 16u64)),
        );
        let snap = Snapshot::new(&node);
        let fields = vec!["pSpecializationInfo".to_string(), "dataSize".to_string()];
        assert_eq!(snap.read(Scope::Node, &fields), Ok(Scalar::UInt(16)));

        let null = Record::new().with("pSpecializationInfo", FieldValue::null_pointer());
        assert!(Snapshot::new(&null).read(Scope::Node, &fields).is_err());
    }

    #[test]
    fn test_bare_element() {
        let node = Record::new();
        let elem = FieldValue::Enum(7);
        let snap = Snapshot::new(&node).with_elem(3, &elem);
        assert_eq!(snap.read(Scope::Elem, &[]), Ok(Scalar::UInt(7)));
        assert_eq!(snap.index(IndexVar::I), Ok(3));
        assert!(snap.index(IndexVar::J).is_err());
    }

    #[test]
    fn test_chain_find_first_match() {
        let head = ExtensibleNode::link(vec![
            ExtensibleNode::new(TypeTag(1), Record::new()),
            ExtensibleNode::new(TypeTag(2), Record::new().with("n", 1u32)),
            ExtensibleNode::new(TypeTag(2), Record::new().with("n", 2u32)),
        ])
        .unwrap();
        let chain = ChainView::collect(Some(&head), 16);
        assert_eq!(chain.len(), 3);
        let found = chain.find(TypeTag(2)).unwrap();
        assert_eq!(found.record.get("n"), Some(&FieldValue::U32(1)));
        assert!(chain.find(TypeTag(9)).is_none());
        assert!(ChainView::collect(None, 16).is_empty());
        assert_eq!(chain.root(), Some(&head.record));

        let owner = Record::new().with("n", 0u32);
        let nested = ChainView::collect(head.next(), 16).with_root(&owner);
        assert_eq!(nested.root(), Some(&owner));
        assert_eq!(nested.len(), 2);
    }

    #[test]
    fn test_chain_limit() {
        let head = ExtensibleNode::link(
            (0..10).map(|t| ExtensibleNode::new(TypeTag(t), Record::new())).collect(),
        )
        .unwrap();
        assert_eq!(ChainView::collect(Some(&head), 4).len(), 4);
    }
}
