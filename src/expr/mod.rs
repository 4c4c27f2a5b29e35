//! Expression language: grammar, AST, and evaluator (§4.2, §4.4).

pub mod ast;
mod eval;
mod grammar;

pub use ast::Expr;
pub use eval::eval;

use crate::error::{format_parse_error, BuilderError};
use crate::location::Location;

/// Parse a single expression. `location` is used only to attribute a
/// parse failure to a source position.
pub fn parse(source: &str, location: &Location) -> Result<Expr, BuilderError> {
    grammar::expr_grammar::top_level(source).map_err(|e| {
        let expected: Vec<String> = e.expected.tokens().map(|t| t.to_string()).collect();
        format_parse_error(location, source, e.location.column, &expected)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_location_on_parse_failure() {
        let loc = Location::at_line("file.bdr", 3);
        let err = parse("1 +", &loc).unwrap_err();
        match err {
            BuilderError::Expr { location, .. } => assert_eq!(location.line, 3),
            other => panic!("expected Expr error, got {:?}", other),
        }
    }
}
