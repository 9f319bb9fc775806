//! chainval Registry: type descriptors, tag resolution and the compat matrix
pub mod catalog;
pub mod compat;
pub mod descriptor;
pub mod type_registry;

pub use catalog::{builtin_registry, builtin_types};
pub use compat::CompatMatrix;
pub use descriptor::{ElementKind, FieldDescriptor, FieldKind, RecordView, ScalarType, TypeDescriptor};
pub use type_registry::{CatalogFile, RegistryBuilder, TagResolution, TypeRegistry};
