//! chainval core: value model, configuration and collaborator contracts
//!
//! Everything the validation crates share. Nothing here validates; it only
//! describes what is validated and who gets told about it.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod location;
pub mod severity;
pub mod value;

pub use collaborators::{
    HandleFormatter, HexHandleFormatter, InMemoryStateRegistry, ObjectStateRegistry, Reporter,
    StateSnapshot,
};
pub use config::{DuplicatePolicy, RenderStyle, ValidatorConfig};
pub use error::{ChainvalError, Result};
pub use location::Location;
pub use severity::Severity;
pub use value::{ApiVersion, ExtensibleNode, FieldValue, Handle, Record, Scalar, TypeTag};

/// Engine version
pub const CHAINVAL_VERSION: &str = "0.1.0";
