//! Error taxonomy (§7) and colored, counted-warning diagnostics, built on
//! `once_cell`+`Mutex` rather than a raw `static mut` counter.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use colored::*;
use once_cell::sync::Lazy;

use crate::location::Location;

/// Every error kind `execute` can fail with. All are fatal: no directive
/// recovers from an error raised inside its body.
#[derive(thiserror::Error, Debug)]
pub enum BuilderError {
    #[error("{location}: syntax error: {message}")]
    Syntax { location: Location, message: String },

    #[error("{location}: could not parse expression: {message}")]
    Expr { location: Location, message: String },

    #[error("{location}: type error: {message}")]
    Type { location: Location, message: String },

    #[error("{location}: unknown function `{name}`")]
    Name { location: Location, name: String },

    #[error("{location}: circular include of \"{reference}\" (include stack: {stack})")]
    CircularInclude { location: Location, reference: String, stack: String },

    #[error("{location}: no reader supports reference \"{reference}\"")]
    UnknownSource { location: Location, reference: String },

    #[error("{location}: failed to read \"{reference}\": {cause}")]
    SourceReading { location: Location, reference: String, cause: String },

    #[error("{location}: {message}")]
    User { location: Location, message: String },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Prepend context to an error without losing the original cause.
pub trait ErrorExt<T> {
    fn prepend_error(self, msg: impl std::fmt::Display) -> Result<T, BuilderError>;
    fn print_error(self, exit: bool);
}

impl<T> ErrorExt<T> for Result<T, BuilderError> {
    fn prepend_error(self, msg: impl std::fmt::Display) -> Result<T, BuilderError> {
        match self {
            Ok(t) => Ok(t),
            Err(e) => Err(BuilderError::User {
                location: Location::at_line("", 0),
                message: format!("{}\n{}", msg, e),
            }),
        }
    }

    fn print_error(self, exit: bool) {
        if let Err(error) = self {
            eprintln!("{}: {}", "error".red().bold(), error);
            if exit {
                print_warning_summary();
                std::process::exit(1);
            }
        }
    }
}

/// Formats an expression parse failure (§7 `ExprError`) in a framed
/// "offending line, then a caret under the column" style. Directive
/// structure errors (unclosed `@macro`/`@if`, stray `@elseif`/`@else`,
/// nested `@macro`, bad inline splice) are `SyntaxError`s raised directly
/// by the driver; this is only for the expression grammar itself.
pub fn format_parse_error(
    location: &Location,
    line_text: &str,
    column: usize,
    expected: &[String],
) -> BuilderError {
    let trimmed = line_text.trim_start();
    let indent = line_text.len() - trimmed.len();
    let caret_offset = column.saturating_sub(1).saturating_sub(indent);
    let caret_line = format!("{}{}", " ".repeat(caret_offset), "^".red().bold());
    let message = format!(
        "\n\n  {}\n  {}\n\nexpected one of: {}",
        trimmed,
        caret_line,
        expected.join(", ")
    );
    BuilderError::Expr { location: location.clone(), message }
}

pub static WARNINGS_MAXIMUM: Lazy<Mutex<u32>> = Lazy::new(|| Mutex::new(10));
static WARNINGS_RAISED: Lazy<Mutex<HashMap<String, u32>>> = Lazy::new(|| Mutex::new(HashMap::new()));
static WARNINGS_MUTED: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Set the maximum number of warnings of any one name to print before
/// suppressing the rest (summarized at the end of the run instead).
pub fn set_warnings_maximum(max: u32) {
    *WARNINGS_MAXIMUM.lock().unwrap() = max;
}

/// Mute a named warning family entirely (`-w <name>`).
pub fn mute_warning(name: impl Into<String>) {
    WARNINGS_MUTED.lock().unwrap().insert(name.into());
}

/// Print a warning-level diagnostic, honoring the per-name mute list and
/// the per-name spam cap.
pub fn warning(msg: impl std::fmt::Display, name: Option<&'static str>, location: Option<&Location>) {
    if let Some(name) = name {
        let muted = WARNINGS_MUTED.lock().unwrap().contains(name);
        if muted {
            return;
        }

        let mut raised = WARNINGS_RAISED.lock().unwrap();
        let count = raised.entry(name.to_string()).or_insert(0);
        *count += 1;
        let max = *WARNINGS_MAXIMUM.lock().unwrap();
        if *count > max {
            return;
        }
    }

    let loc_str = match location {
        Some(loc) => format!("{}: ", loc),
        None => String::new(),
    };
    let name_str = match name {
        Some(name) => format!(" [{}]", name),
        None => String::new(),
    };

    eprintln!("{}{}: {}{}", loc_str, "warning".yellow().bold(), msg, name_str);
}

/// Print a summary of how many warnings of each name were suppressed past
/// the spam cap.
pub fn print_warning_summary() {
    let raised = WARNINGS_RAISED.lock().unwrap();
    let muted = WARNINGS_MUTED.lock().unwrap();
    let max = *WARNINGS_MAXIMUM.lock().unwrap();

    for (name, count) in raised.iter() {
        if muted.contains(name) {
            continue;
        }
        if *count <= max {
            continue;
        }
        let excess = *count - max;
        if excess > 1 {
            warning(
                format!(
                    "{} warnings of type \"{}\" were suppressed to prevent spam. Use \"-w {}\" to disable these warnings entirely.",
                    excess, name, name
                ),
                None,
                None,
            );
        } else {
            warning(
                format!(
                    "{} warning of type \"{}\" was suppressed to prevent spam. Use \"-w {}\" to disable these warnings entirely.",
                    excess, name, name
                ),
                None,
                None,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_error_displays_location_and_message() {
        let err = BuilderError::User {
            location: Location::at_line("main.bdr", 5),
            message: "Platform is null is unsupported".to_string(),
        };
        assert_eq!(err.to_string(), "main.bdr:5: Platform is null is unsupported");
    }
}
