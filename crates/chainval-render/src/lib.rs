//! chainval render: diagnostics to natural-language messages
//!
//! Rule templates are printf-style strings; they are compiled to handlebars
//! templates once per rule set and rendered against the values captured
//! when the rule failed.
//!
//! # Example
//!
//! ```ignore
//! use chainval_render::DiagnosticRenderer;
//! use chainval_core::{HexHandleFormatter, RenderStyle};
//! use std::sync::Arc;
//!
//! let renderer = DiagnosticRenderer::for_rule_set(
//!     chainval_rules::builtin_rule_set(),
//!     RenderStyle::Plain,
//!     Arc::new(HexHandleFormatter),
//! )?;
//! for message in renderer.render_all(&diagnostics) {
//!     println!("{}", message);
//! }
//! ```

pub mod annotate;
pub mod renderer;
pub mod templates;

pub use annotate::annotate;
pub use renderer::{DiagnosticRenderer, Message};
pub use templates::{Conversion, MessageTemplate, Piece};
