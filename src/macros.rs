//! Macro table (§4.3): registry from macro name to parameter list and
//! verbatim body, captured at the `@macro` definition site.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{warning, BuilderError};
use crate::location::Location;

/// A macro definition. The body is the literal sequence of lines between
/// `@macro` and `@endmacro`/`@end`, retained verbatim: it is re-processed
/// line-by-line at each invocation rather than pre-parsed, exactly as the
/// spec requires.
#[derive(Clone, Debug)]
pub struct MacroDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<String>,
    pub def_site: Location,
}

static MACRO_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*(?:\(\s*([^)]*)\s*\))?$").unwrap());

/// Parse the text following `@macro` (e.g. `m(a, b, c)` or bare `m`) into
/// a name and parameter list.
pub fn parse_macro_header(rest: &str, location: &Location) -> Result<(String, Vec<String>), BuilderError> {
    let caps = MACRO_HEADER.captures(rest.trim()).ok_or_else(|| BuilderError::Syntax {
        location: location.clone(),
        message: format!("malformed @macro header \"{}\"", rest),
    })?;

    let name = caps[1].to_string();
    let params = match caps.get(2) {
        Some(m) if !m.as_str().trim().is_empty() => {
            m.as_str().split(',').map(|p| p.trim().to_string()).collect()
        }
        _ => Vec::new(),
    };

    Ok((name, params))
}

/// Registry from macro name to definition. Redefinition overwrites with a
/// warning-level diagnostic; there is no `@undef` in this directive
/// language, so the table only ever grows or is replaced entry-by-entry.
#[derive(Debug, Default)]
pub struct MacroTable {
    macros: HashMap<String, MacroDef>,
}

impl MacroTable {
    pub fn new() -> Self {
        MacroTable { macros: HashMap::new() }
    }

    pub fn define(&mut self, def: MacroDef) {
        if let Some(previous) = self.macros.insert(def.name.clone(), def) {
            warning(
                format!("macro \"{}\" redefined (previously defined at {})", previous.name, previous.def_site),
                Some("macro-redefined"),
                None,
            );
        }
    }

    pub fn get(&self, name: &str) -> Option<&MacroDef> {
        self.macros.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_with_params() {
        let loc = Location::at_line("f", 1);
        let (name, params) = parse_macro_header("m(a, b, c)", &loc).unwrap();
        assert_eq!(name, "m");
        assert_eq!(params, vec!["a", "b", "c"]);
    }

    #[test]
    fn parses_header_without_params() {
        let loc = Location::at_line("f", 1);
        let (name, params) = parse_macro_header("noop", &loc).unwrap();
        assert_eq!(name, "noop");
        assert!(params.is_empty());
    }

    #[test]
    fn redefinition_overwrites() {
        let loc = Location::at_line("f", 1);
        let mut table = MacroTable::new();
        table.define(MacroDef { name: "m".into(), params: vec![], body: vec!["a".into()], def_site: loc.clone() });
        table.define(MacroDef { name: "m".into(), params: vec![], body: vec!["b".into()], def_site: loc });
        assert_eq!(table.get("m").unwrap().body, vec!["b".to_string()]);
    }
}
