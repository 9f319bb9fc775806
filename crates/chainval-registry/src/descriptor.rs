//! Type and field descriptors
//!
//! A descriptor is the shape of one struct: which fields it has and how to
//! reach the values nested under each one. Shapes are data; one traversal
//! interprets them all.

use chainval_core::value::{ApiVersion, FieldValue, Record, Scalar, TypeTag};
use serde::{Deserialize, Serialize};

/// Leaf field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    U32,
    U64,
    I32,
    I64,
    F32,
    Bool,
    Flags,
    Enum,
    Handle,
    CString,
}

impl ScalarType {
    /// Does a supplied value fit this declared type?
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (ScalarType::U32, FieldValue::U32(_)) => true,
            (ScalarType::U64, FieldValue::U64(_) | FieldValue::U32(_)) => true,
            (ScalarType::I32, FieldValue::I32(_)) => true,
            (ScalarType::I64, FieldValue::I64(_) | FieldValue::I32(_)) => true,
            (ScalarType::F32, FieldValue::F32(_)) => true,
            (ScalarType::Bool, FieldValue::Bool(_)) => true,
            (ScalarType::Flags, FieldValue::Flags(_)) => true,
            (ScalarType::Enum, FieldValue::Enum(_) | FieldValue::U32(_)) => true,
            (ScalarType::Handle, FieldValue::Handle(_)) => true,
            (ScalarType::CString, FieldValue::Str(_)) => true,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::U32 => "u32",
            ScalarType::U64 => "u64",
            ScalarType::I32 => "i32",
            ScalarType::I64 => "i64",
            ScalarType::F32 => "f32",
            ScalarType::Bool => "bool",
            ScalarType::Flags => "flags",
            ScalarType::Enum => "enum",
            ScalarType::Handle => "handle",
            ScalarType::CString => "cstring",
        }
    }
}

/// Element type of an array field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Scalar(ScalarType),
    Struct(String),
}

/// How a field's value is reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Scalar {
        scalar: ScalarType,
    },
    /// Struct embedded by value
    Nested {
        type_name: String,
    },
    /// Pointer to a struct that may be null
    OptionalPointer {
        type_name: String,
    },
    FixedArray {
        element: ElementKind,
        len: usize,
    },
    /// Pointer to `count_field` elements
    CountedArray {
        element: ElementKind,
        count_field: String,
    },
}

impl FieldKind {
    pub fn is_array(&self) -> bool {
        matches!(self, FieldKind::FixedArray { .. } | FieldKind::CountedArray { .. })
    }

    /// Struct types this field refers to, if any
    pub fn referenced_type(&self) -> Option<&str> {
        match self {
            FieldKind::Nested { type_name } | FieldKind::OptionalPointer { type_name } => {
                Some(type_name)
            }
            FieldKind::FixedArray {
                element: ElementKind::Struct(name),
                ..
            }
            | FieldKind::CountedArray {
                element: ElementKind::Struct(name),
                ..
            } => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    /// Absent values are not reported
    #[serde(default)]
    pub optional: bool,
}

impl FieldDescriptor {
    pub fn scalar(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self::new(name, FieldKind::Scalar { scalar })
    }

    pub fn nested(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Nested {
                type_name: type_name.into(),
            },
        )
    }

    /// Optional pointers are optional fields by nature
    pub fn pointer(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::OptionalPointer {
                type_name: type_name.into(),
            },
        )
        .optional()
    }

    pub fn fixed_array(name: impl Into<String>, element: ElementKind, len: usize) -> Self {
        Self::new(name, FieldKind::FixedArray { element, len })
    }

    pub fn counted(
        name: impl Into<String>,
        element: ElementKind,
        count_field: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            FieldKind::CountedArray {
                element,
                count_field: count_field.into(),
            },
        )
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_introduced() -> ApiVersion {
    ApiVersion::V1_0
}

/// Shape of one struct type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,

    /// Present for structs that can appear in an extension chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<TypeTag>,

    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,

    /// Root structs whose chains may carry this one; empty means any
    #[serde(default)]
    pub extends: Vec<String>,

    #[serde(default = "default_introduced")]
    pub introduced: ApiVersion,

    /// At most one instance per chain
    #[serde(default = "default_true")]
    pub unique_in_chain: bool,
}

impl TypeDescriptor {
    /// A struct that carries a tag and may be chained
    pub fn extensible(name: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            tag: Some(tag),
            ..Self::plain(name)
        }
    }

    /// A struct that only appears nested by value, by pointer or in arrays
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: None,
            fields: Vec::new(),
            extends: Vec::new(),
            introduced: ApiVersion::V1_0,
            unique_in_chain: true,
        }
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn extends(mut self, root: impl Into<String>) -> Self {
        self.extends.push(root.into());
        self
    }

    pub fn introduced(mut self, version: ApiVersion) -> Self {
        self.introduced = version;
        self
    }

    /// Allow several instances in one chain
    pub fn repeatable(mut self) -> Self {
        self.unique_in_chain = false;
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Checked, typed view of a record of this type
    pub fn view<'a>(&'a self, record: &'a Record) -> RecordView<'a> {
        RecordView {
            descriptor: self,
            record,
        }
    }
}

/// A record read through its descriptor
///
/// Accessors only return values whose shape matches the declaration, so a
/// mistyped or missing value reads as absent instead of being reinterpreted.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    descriptor: &'a TypeDescriptor,
    record: &'a Record,
}

impl<'a> RecordView<'a> {
    pub fn descriptor(&self) -> &'a TypeDescriptor {
        self.descriptor
    }

    pub fn record(&self) -> &'a Record {
        self.record
    }

    pub fn scalar(&self, name: &str) -> Option<Scalar> {
        let field = self.descriptor.field(name)?;
        let value = self.record.get(name)?;
        match &field.kind {
            FieldKind::Scalar { scalar } if scalar.accepts(value) => value.as_scalar(),
            _ => None,
        }
    }

    /// Nested struct or non-null pointee
    pub fn nested(&self, name: &str) -> Option<&'a Record> {
        let field = self.descriptor.field(name)?;
        match &field.kind {
            FieldKind::Nested { .. } | FieldKind::OptionalPointer { .. } => {
                self.record.get(name)?.as_record()
            }
            _ => None,
        }
    }

    /// Elements the caller actually supplied, bounded by the declared count
    ///
    /// A null base or a missing count yields no elements.
    pub fn elements(&self, name: &str) -> Vec<&'a FieldValue> {
        let Some(field) = self.descriptor.field(name) else {
            return Vec::new();
        };
        let bound = match &field.kind {
            FieldKind::FixedArray { len, .. } => *len,
            FieldKind::CountedArray { count_field, .. } => self
                .record
                .get(count_field)
                .and_then(FieldValue::as_count)
                .map(|c| usize::try_from(c).unwrap_or(usize::MAX))
                .unwrap_or(0),
            _ => return Vec::new(),
        };
        match self.record.get(name) {
            Some(FieldValue::Array(Some(items))) => items.iter().take(bound).collect(),
            _ => Vec::new(),
        }
    }
}
