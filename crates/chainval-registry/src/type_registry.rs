//! Type Registry
//!
//! Immutable table from tags and struct names to descriptors. Built once,
//! checked for internal consistency, then shared read-only.
use crate::compat::CompatMatrix;
use crate::descriptor::{FieldKind, TypeDescriptor};
use chainval_core::error::{ChainvalError, Result};
use chainval_core::value::TypeTag;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Outcome of looking up a chain node's tag
#[derive(Debug, Clone, Copy)]
pub enum TagResolution<'a> {
    Known(&'a TypeDescriptor),
    /// Newer or foreign variant; validators must treat it as a no-op
    Unknown(TypeTag),
}

#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: Vec<TypeDescriptor>,
    by_name: HashMap<String, usize>,
    by_tag: HashMap<TypeTag, usize>,
    compat: CompatMatrix,
}

impl TypeRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn resolve(&self, tag: TypeTag) -> TagResolution<'_> {
        match self.by_tag.get(&tag) {
            Some(&idx) => TagResolution::Known(&self.types[idx]),
            None => TagResolution::Unknown(tag),
        }
    }

    pub fn by_name(&self, name: &str) -> Option<&TypeDescriptor> {
        self.by_name.get(name).map(|&idx| &self.types[idx])
    }

    pub fn by_tag(&self, tag: TypeTag) -> Option<&TypeDescriptor> {
        self.by_tag.get(&tag).map(|&idx| &self.types[idx])
    }

    /// Display name for a tag, falling back to the raw number
    pub fn tag_name(&self, tag: TypeTag) -> String {
        match self.resolve(tag) {
            TagResolution::Known(desc) => desc.name.clone(),
            TagResolution::Unknown(tag) => format!("<unknown tag {}>", tag),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn compat(&self) -> &CompatMatrix {
        &self.compat
    }

    /// Parse a catalog from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: CatalogFile =
            serde_yaml::from_str(yaml).map_err(|e| ChainvalError::Registry(e.to_string()))?;
        tracing::debug!(version = %file.version, types = file.types.len(), "parsed type catalog");
        file.types
            .into_iter()
            .fold(TypeRegistry::builder(), RegistryBuilder::with_type)
            .build()
    }

    /// Load a catalog from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

/// On-disk catalog format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    pub version: String,
    pub types: Vec<TypeDescriptor>,
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    types: Vec<TypeDescriptor>,
}

impl RegistryBuilder {
    pub fn with_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.types.push(descriptor);
        self
    }

    pub fn with_types(mut self, descriptors: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        self.types.extend(descriptors);
        self
    }

    /// Index the descriptors and check that every reference resolves
    pub fn build(self) -> Result<TypeRegistry> {
        let mut by_name = HashMap::new();
        let mut by_tag = HashMap::new();
        let mut compat = CompatMatrix::new();

        for (idx, desc) in self.types.iter().enumerate() {
            if by_name.insert(desc.name.clone(), idx).is_some() {
                return Err(ChainvalError::Registry(format!(
                    "duplicate type name {}",
                    desc.name
                )));
            }
            if let Some(tag) = desc.tag {
                if let Some(prev) = by_tag.insert(tag, idx) {
                    return Err(ChainvalError::Registry(format!(
                        "tag {} used by both {} and {}",
                        tag, self.types[prev].name, desc.name
                    )));
                }
            }
        }

        for desc in &self.types {
            for field in &desc.fields {
                if let Some(target) = field.kind.referenced_type() {
                    if !by_name.contains_key(target) {
                        return Err(ChainvalError::Registry(format!(
                            "{}.{} refers to unknown type {}",
                            desc.name, field.name, target
                        )));
                    }
                }
                if let FieldKind::CountedArray { count_field, .. } = &field.kind {
                    let declared = desc
                        .field(count_field)
                        .map(|f| matches!(f.kind, FieldKind::Scalar { .. }))
                        .unwrap_or(false);
                    if !declared {
                        return Err(ChainvalError::Registry(format!(
                            "{}.{} counts with undeclared scalar {}",
                            desc.name, field.name, count_field
                        )));
                    }
                }
            }
            if !desc.extends.is_empty() && desc.tag.is_none() {
                return Err(ChainvalError::Registry(format!(
                    "{} extends other structs but has no tag",
                    desc.name
                )));
            }
            for root in &desc.extends {
                if !by_name.contains_key(root) {
                    return Err(ChainvalError::Registry(format!(
                        "{} extends unknown type {}",
                        desc.name, root
                    )));
                }
                compat.allow(desc.name.clone(), root.clone());
            }
        }

        Ok(TypeRegistry {
            types: self.types,
            by_name,
            by_tag,
            compat,
        })
    }
}
