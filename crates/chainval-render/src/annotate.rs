//! Caret annotation of a failing expression
//!
//! ```text
//!   a.binding != b.binding || a.flags != b.flags
//!   ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^
//!   a.binding = 3, b.binding = 3, a.flags = 0x0, b.flags = 0x0
//! ```

use chainval_rules::diagnostic::ExprTrace;

const INDENT: &str = "  ";

pub fn annotate(trace: &ExprTrace) -> String {
    let expression = &trace.expression;
    let (start, end) = trace.blame;
    let start = start.min(expression.len());
    let end = end.clamp(start, expression.len());

    let lead = expression.get(..start).map_or(start, |s| s.chars().count());
    let width = expression
        .get(start..end)
        .map_or(end - start, |s| s.chars().count())
        .max(1);

    let mut out = format!(
        "{indent}{expression}\n{indent}{pad}{carets}",
        indent = INDENT,
        pad = " ".repeat(lead),
        carets = "^".repeat(width),
    );
    if !trace.values.is_empty() {
        let values = trace
            .values
            .iter()
            .map(|v| format!("{} = {}", v.label, v.value))
            .collect::<Vec<_>>()
            .join(", ");
        out.push('\n');
        out.push_str(INDENT);
        out.push_str(&values);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainval_core::value::Scalar;
    use chainval_rules::diagnostic::CapturedValue;

    #[test]
    fn test_caret_under_blamed_conjunct() {
        let trace = ExprTrace {
            expression: "node.x == 1 && node.y != 0".to_string(),
            blame: (15, 26),
            values: vec![CapturedValue::new("node.y", Scalar::UInt(0))],
        };
        let text = annotate(&trace);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "  node.x == 1 && node.y != 0");
        assert_eq!(lines[1], format!("  {}{}", " ".repeat(15), "^".repeat(11)));
        assert_eq!(lines[2], "  node.y = 0");
    }

    #[test]
    fn test_out_of_range_span_is_clamped() {
        let trace = ExprTrace {
            expression: "a != b".to_string(),
            blame: (4, 99),
            values: Vec::new(),
        };
        assert_eq!(annotate(&trace), "  a != b\n      ^^");
    }
}
