//! Unified Error Model
//!
//! Validation itself never fails: violations become diagnostics. These
//! errors cover construction-time problems only (catalogs, rules, templates,
//! configuration).
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainvalError {
    #[error("REGISTRY/{0}")]
    Registry(String),

    #[error("RULE/{id}: {reason}")]
    Rule { id: String, reason: String },

    #[error("EXPR/{message} in `{expression}`")]
    Expression { expression: String, message: String },

    #[error("TEMPLATE/{0}")]
    Template(String),

    #[error("CONFIG/{0}")]
    Config(String),

    #[error("IO/{0}")]
    Io(#[from] std::io::Error),
}

impl ChainvalError {
    pub fn rule(id: impl Into<String>, reason: impl Into<String>) -> Self {
        ChainvalError::Rule {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainvalError>;
