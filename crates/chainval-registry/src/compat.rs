//! Compatibility Matrix
//!
//! Which extension structs may appear in which root struct's chain.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompatMatrix {
    /// extension name -> roots it may extend
    pub extends: BTreeMap<String, BTreeSet<String>>,
}

impl CompatMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(&mut self, extension: impl Into<String>, root: impl Into<String>) {
        self.extends
            .entry(extension.into())
            .or_default()
            .insert(root.into());
    }

    /// An extension with no declared roots is accepted everywhere
    pub fn is_allowed(&self, root: &str, extension: &str) -> bool {
        self.extends
            .get(extension)
            .map(|roots| roots.is_empty() || roots.contains(root))
            .unwrap_or(true)
    }

    /// Extensions declared for a root, sorted by name
    pub fn extensions_of(&self, root: &str) -> Vec<&str> {
        self.extends
            .iter()
            .filter(|(_, roots)| roots.contains(root))
            .map(|(ext, _)| ext.as_str())
            .collect()
    }
}
