//! printf-style message templates
//!
//! Rule messages are written the way API validation messages traditionally
//! are: `pBindings[%u].binding is [[%u]]`. This module parses them once and
//! compiles them into handlebars templates, one helper call per
//! placeholder, so rendering never re-scans the format string.
//!
//! Supported conversions:
//! - `%u`, `%d`: integers
//! - `%x`: hexadecimal (write `0x%x` for the prefix)
//! - `%zu`, `%lu`, `%llu`: pointer-width integers
//! - `%s`: strings, booleans and handles
//! - `%%`: a literal percent sign
//!
//! `[[...]]` marks a highlighted span.

use chainval_core::error::{ChainvalError, Result};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TOKEN: Regex = Regex::new(r"%%|%(zu|llu|lu|u|d|x|s)|%[A-Za-z]*|\[\[|\]\]")
        .expect("template token pattern is valid");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Unsigned,
    Signed,
    Hex,
    Size,
    Str,
}

impl Conversion {
    fn parse(spec: &str) -> Option<Self> {
        Some(match spec {
            "u" => Conversion::Unsigned,
            "d" => Conversion::Signed,
            "x" => Conversion::Hex,
            "zu" | "lu" | "llu" => Conversion::Size,
            "s" => Conversion::Str,
            _ => return None,
        })
    }

    /// Name of the handlebars helper that formats this conversion
    pub fn helper(self) -> &'static str {
        match self {
            Conversion::Unsigned => "uint",
            Conversion::Signed => "int",
            Conversion::Hex => "hex",
            Conversion::Size => "size",
            Conversion::Str => "cstr",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Literal(String),
    Placeholder(Conversion),
    HighlightStart,
    HighlightEnd,
}

/// A parsed message template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    source: String,
    pieces: Vec<Piece>,
}

impl MessageTemplate {
    pub fn parse(source: &str) -> Result<Self> {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut open = false;
        let mut last = 0;

        for m in TOKEN.find_iter(source) {
            literal.push_str(&source[last..m.start()]);
            last = m.end();
            let token = m.as_str();
            let piece = match token {
                "%%" => {
                    literal.push('%');
                    continue;
                }
                "[[" if open => {
                    return Err(template_error(source, "nested [["));
                }
                "[[" => {
                    open = true;
                    Piece::HighlightStart
                }
                "]]" if !open => {
                    return Err(template_error(source, "]] without [["));
                }
                "]]" => {
                    open = false;
                    Piece::HighlightEnd
                }
                _ => Piece::Placeholder(Conversion::parse(&token[1..]).ok_or_else(|| {
                    template_error(source, &format!("unsupported conversion {}", token))
                })?),
            };
            if !literal.is_empty() {
                pieces.push(Piece::Literal(std::mem::take(&mut literal)));
            }
            pieces.push(piece);
        }
        literal.push_str(&source[last..]);
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }
        if open {
            return Err(template_error(source, "unclosed [["));
        }

        Ok(Self {
            source: source.to_string(),
            pieces,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    pub fn placeholder_count(&self) -> usize {
        self.pieces
            .iter()
            .filter(|p| matches!(p, Piece::Placeholder(_)))
            .count()
    }

    /// Handlebars source; placeholders read `a0`, `a1`, ... from the data
    pub fn to_handlebars(&self) -> String {
        let mut out = String::with_capacity(self.source.len() + 16);
        let mut arg = 0;
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(&escape_literal(text)),
                Piece::Placeholder(conv) => {
                    out.push_str(&format!("{{{{{} a{}}}}}", conv.helper(), arg));
                    arg += 1;
                }
                Piece::HighlightStart => out.push_str("{{#hl}}"),
                Piece::HighlightEnd => out.push_str("{{/hl}}"),
            }
        }
        out
    }
}

/// Handlebars treats `\` before `{{` as an escape, so literal backslashes go
/// through the `backslash` helper and literal `{{` is escaped
fn escape_literal(text: &str) -> String {
    text.split("{{")
        .map(|part| part.replace('\\', "{{backslash}}"))
        .collect::<Vec<_>>()
        .join("\\{{")
}

fn template_error(source: &str, reason: &str) -> ChainvalError {
    ChainvalError::Template(format!("{} in \"{}\"", reason, source))
}
