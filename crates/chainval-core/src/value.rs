//! Argument Values: tags, scalars, records and extension nodes
//!
//! Callers build a [`Record`] per structured argument. Extensible structs
//! carry an owned `next` link, so a chain is a singly linked list of
//! [`ExtensibleNode`]s that the validator only ever borrows.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Discriminator identifying one record variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(pub u32);

impl TypeTag {
    pub const fn new(raw: u32) -> Self {
        TypeTag(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// API version a type was introduced in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiVersion {
    pub major: u16,
    pub minor: u16,
}

impl ApiVersion {
    pub const V1_0: ApiVersion = ApiVersion::new(1, 0);
    pub const V1_1: ApiVersion = ApiVersion::new(1, 1);
    pub const V1_2: ApiVersion = ApiVersion::new(1, 2);
    pub const V1_3: ApiVersion = ApiVersion::new(1, 3);

    pub const fn new(major: u16, minor: u16) -> Self {
        ApiVersion { major, minor }
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        ApiVersion::V1_3
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ApiVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| format!("expected MAJOR.MINOR, got `{}`", s))?;
        let major = major
            .parse()
            .map_err(|_| format!("invalid major version in `{}`", s))?;
        let minor = minor
            .parse()
            .map_err(|_| format!("invalid minor version in `{}`", s))?;
        Ok(ApiVersion { major, minor })
    }
}

impl TryFrom<String> for ApiVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ApiVersion> for String {
    fn from(v: ApiVersion) -> Self {
        v.to_string()
    }
}

/// An opaque API object handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle {
    /// Object type name (e.g. "VkSampler")
    pub object_type: String,
    /// Raw handle bits; 0 is the null handle
    pub raw: u64,
}

impl Handle {
    pub fn new(object_type: impl Into<String>, raw: u64) -> Self {
        Self {
            object_type: object_type.into(),
            raw,
        }
    }

    pub fn is_null(&self) -> bool {
        self.raw == 0
    }
}

/// A leaf value as seen by rule expressions and diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Int(i64),
    UInt(u64),
    Flags(u64),
    Bool(bool),
    Float(f64),
    Text(String),
    Handle(Handle),
}

impl Scalar {
    /// Integer view used by comparisons and bit tests
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Scalar::Int(v) => Some(*v as i128),
            Scalar::UInt(v) | Scalar::Flags(v) => Some(*v as i128),
            Scalar::Bool(b) => Some(*b as i128),
            Scalar::Handle(h) => Some(h.raw as i128),
            Scalar::Float(_) | Scalar::Text(_) => None,
        }
    }

    /// Truth value of a scalar used directly as a condition
    pub fn truthy(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::Text(_) | Scalar::Float(_) => None,
            other => other.as_integer().map(|v| v != 0),
        }
    }

    /// Exact comparison; `None` when the kinds are not comparable
    pub fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
            (Scalar::Float(a), Scalar::Float(b)) => a.partial_cmp(b),
            (Scalar::Float(a), b) => b.as_integer().and_then(|b| a.partial_cmp(&(b as f64))),
            (a, Scalar::Float(b)) => a.as_integer().and_then(|a| (a as f64).partial_cmp(b)),
            (a, b) => match (a.as_integer(), b.as_integer()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => None,
            },
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Scalar::Int(_) => "int",
            Scalar::UInt(_) => "uint",
            Scalar::Flags(_) => "flags",
            Scalar::Bool(_) => "bool",
            Scalar::Float(_) => "float",
            Scalar::Text(_) => "text",
            Scalar::Handle(_) => "handle",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::UInt(v) => write!(f, "{}", v),
            Scalar::Flags(v) => write!(f, "0x{:x}", v),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(s) => write!(f, "{}", s),
            Scalar::Handle(h) => write!(f, "{} 0x{:x}", h.object_type, h.raw),
        }
    }
}

/// A field value inside a [`Record`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    U32(u32),
    U64(u64),
    I32(i32),
    I64(i64),
    F32(f32),
    Bool(bool),
    Flags(u64),
    Enum(u32),
    Handle(Handle),
    Str(String),
    Struct(Record),
    /// Optional pointer to a struct; `None` is a null pointer
    Pointer(Option<Box<Record>>),
    /// Array elements; `None` is a null base pointer
    Array(Option<Vec<FieldValue>>),
}

impl FieldValue {
    /// Leaf view of this value, `None` for aggregates
    pub fn as_scalar(&self) -> Option<Scalar> {
        Some(match self {
            FieldValue::U32(v) => Scalar::UInt(*v as u64),
            FieldValue::U64(v) => Scalar::UInt(*v),
            FieldValue::I32(v) => Scalar::Int(*v as i64),
            FieldValue::I64(v) => Scalar::Int(*v),
            FieldValue::F32(v) => Scalar::Float(*v as f64),
            FieldValue::Bool(b) => Scalar::Bool(*b),
            FieldValue::Flags(v) => Scalar::Flags(*v),
            FieldValue::Enum(v) => Scalar::UInt(*v as u64),
            FieldValue::Handle(h) => Scalar::Handle(h.clone()),
            FieldValue::Str(s) => Scalar::Text(s.clone()),
            FieldValue::Struct(_) | FieldValue::Pointer(_) | FieldValue::Array(_) => return None,
        })
    }

    /// Unsigned integer view, used for array count fields
    pub fn as_count(&self) -> Option<u64> {
        match self {
            FieldValue::U32(v) | FieldValue::Enum(v) => Some(*v as u64),
            FieldValue::U64(v) | FieldValue::Flags(v) => Some(*v),
            FieldValue::I32(v) if *v >= 0 => Some(*v as u64),
            FieldValue::I64(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            FieldValue::Struct(r) => Some(r),
            FieldValue::Pointer(Some(r)) => Some(r),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::U32(_) => "u32",
            FieldValue::U64(_) => "u64",
            FieldValue::I32(_) => "i32",
            FieldValue::I64(_) => "i64",
            FieldValue::F32(_) => "f32",
            FieldValue::Bool(_) => "bool",
            FieldValue::Flags(_) => "flags",
            FieldValue::Enum(_) => "enum",
            FieldValue::Handle(_) => "handle",
            FieldValue::Str(_) => "string",
            FieldValue::Struct(_) => "struct",
            FieldValue::Pointer(_) => "pointer",
            FieldValue::Array(_) => "array",
        }
    }

    /// Build an array value from any iterable of element values
    pub fn array<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        FieldValue::Array(Some(items.into_iter().map(Into::into).collect()))
    }

    /// A null array base pointer
    pub fn null_array() -> Self {
        FieldValue::Array(None)
    }

    pub fn pointer(record: Record) -> Self {
        FieldValue::Pointer(Some(Box::new(record)))
    }

    pub fn null_pointer() -> Self {
        FieldValue::Pointer(None)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::U32(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::U64(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::I32(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::I64(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::F32(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<Handle> for FieldValue {
    fn from(h: Handle) -> Self {
        FieldValue::Handle(h)
    }
}

impl From<Record> for FieldValue {
    fn from(r: Record) -> Self {
        FieldValue::Struct(r)
    }
}

/// Field values of one struct instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,

    /// Head of this struct's extension chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Box<ExtensibleNode>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Attach an extension chain head
    pub fn with_next(mut self, next: ExtensibleNode) -> Self {
        self.next = Some(Box::new(next));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn next(&self) -> Option<&ExtensibleNode> {
        self.next.as_deref()
    }
}

/// Unlinks the chain one node at a time so long chains don't recurse
impl Drop for Record {
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(mut node) = next {
            next = node.record.next.take();
        }
    }
}

/// One tagged record in an extension chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensibleNode {
    pub tag: TypeTag,
    #[serde(default)]
    pub record: Record,
}

impl ExtensibleNode {
    pub fn new(tag: TypeTag, record: Record) -> Self {
        Self { tag, record }
    }

    pub fn next(&self) -> Option<&ExtensibleNode> {
        self.record.next()
    }

    /// Iterate this node and every node after it
    ///
    /// The iterator is unbounded; callers that must stay bounded should
    /// combine it with `take`.
    pub fn iter(&self) -> ChainIter<'_> {
        ChainIter { current: Some(self) }
    }

    /// Link nodes in order, returning the head
    pub fn link(nodes: Vec<ExtensibleNode>) -> Option<ExtensibleNode> {
        nodes.into_iter().rev().fold(None, |next, mut node| {
            if let Some(next) = next {
                node.record.next = Some(Box::new(next));
            }
            Some(node)
        })
    }
}

/// Iterator over an extension chain
pub struct ChainIter<'a> {
    current: Option<&'a ExtensibleNode>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = &'a ExtensibleNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;
        self.current = node.next();
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_preserves_order() {
        let head = ExtensibleNode::link(vec![
            ExtensibleNode::new(TypeTag(1), Record::new()),
            ExtensibleNode::new(TypeTag(2), Record::new()),
            ExtensibleNode::new(TypeTag(3), Record::new()),
        ])
        .unwrap();

        let tags: Vec<u32> = head.iter().map(|n| n.tag.raw()).collect();
        assert_eq!(tags, vec![1, 2, 3]);
    }

    #[test]
    fn test_long_chain_drops() {
        let nodes = (0..200_000)
            .map(|i| ExtensibleNode::new(TypeTag(i), Record::new().with("i", i)))
            .collect();
        let head = ExtensibleNode::link(nodes).unwrap();
        assert_eq!(head.iter().count(), 200_000);

        let root = Record::new().with_next(head);
        drop(root);
    }

    #[test]
    fn test_link_empty() {
        assert!(ExtensibleNode::link(vec![]).is_none());
    }

    #[test]
    fn test_scalar_compare_across_kinds() {
        assert_eq!(
            Scalar::UInt(3).compare(&Scalar::Int(3)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Scalar::Flags(0x10).compare(&Scalar::UInt(2)),
            Some(Ordering::Greater)
        );
        assert_eq!(Scalar::Text("a".into()).compare(&Scalar::UInt(1)), None);
        assert_eq!(Scalar::Int(-1).compare(&Scalar::UInt(0)), Some(Ordering::Less));
    }

    #[test]
    fn test_field_value_views() {
        assert_eq!(FieldValue::U32(7).as_scalar(), Some(Scalar::UInt(7)));
        assert_eq!(FieldValue::I32(-2).as_count(), None);
        assert!(FieldValue::null_array().as_scalar().is_none());
        assert!(FieldValue::null_pointer().as_record().is_none());
    }

    #[test]
    fn test_api_version_parse() {
        let v: ApiVersion = "1.2".parse().unwrap();
        assert_eq!(v, ApiVersion::V1_2);
        assert!(ApiVersion::V1_3 > v);
        assert!("12".parse::<ApiVersion>().is_err());
    }

    #[test]
    fn test_record_json_shape() {
        let record = Record::new()
            .with("flags", FieldValue::Flags(2))
            .with("count", 1u32);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["fields"]["flags"]["flags"], 2);
        assert_eq!(json["fields"]["count"]["u32"], 1);
        assert!(json.get("next").is_none());
    }
}
