//! Line-oriented lexer (§4.1): classifies each input line as a directive
//! line or a (possibly splice-bearing) text line, and strips comments from
//! directive expression regions.

use once_cell::sync::Lazy;
use regex::Regex;

/// A parsed directive line, with the directive keyword's trailing text
/// (already comment-stripped and trimmed) attached where relevant.
#[derive(Clone, Debug, PartialEq)]
pub enum Directive {
    Set(String),
    Macro(String),
    EndMacro,
    /// Bare `@end`, which closes whichever of `@macro`/`@if` is
    /// currently open; resolved by the driver, not the lexer.
    End,
    If(String),
    ElseIf(String),
    Else,
    EndIf,
    Error(String),
    Include(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Line {
    Directive(Directive),
    Text(String),
}

static DIRECTIVE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*@(set|macro|endmacro|end|if|elseif|else|endif|error|include)\b(.*)$").unwrap());

/// Classify one input line. Only the ten recognized directive keywords
/// make a line a directive line; any other `@word` is left as plain text,
/// untransformed.
pub fn classify(raw_line: &str) -> Line {
    let Some(caps) = DIRECTIVE_LINE.captures(raw_line) else {
        return Line::Text(raw_line.to_string());
    };

    let keyword = &caps[1];
    let rest = strip_directive_comments(caps[2].trim());

    let directive = match keyword {
        "set" => Directive::Set(rest),
        "macro" => Directive::Macro(rest),
        "endmacro" => Directive::EndMacro,
        "end" => Directive::End,
        "if" => Directive::If(rest),
        "elseif" => Directive::ElseIf(rest),
        "else" => Directive::Else,
        "endif" => Directive::EndIf,
        "error" => Directive::Error(rest),
        "include" => Directive::Include(rest),
        _ => unreachable!("regex only matches the listed keywords"),
    };

    Line::Directive(directive)
}

/// Strip `// ...` and single-line `/* ... */` comments from a directive's
/// expression region, respecting (not counting inside) string literals.
/// Text lines are never passed through this function: comments in
/// passthrough text are left untouched, per §4.1.
pub fn strip_directive_comments(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::new();
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(q) = in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                in_string = None;
            }
            i += 1;
            continue;
        }

        if c == '"' || c == '\'' {
            in_string = Some(c);
            out.push(c);
            i += 1;
            continue;
        }

        if c == '/' && chars.get(i + 1) == Some(&'/') {
            break;
        }

        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i += 2;
            continue;
        }

        out.push(c);
        i += 1;
    }

    out.trim().to_string()
}

/// One piece of a text line after splice scanning.
#[derive(Clone, Debug, PartialEq)]
pub enum Segment {
    Text(String),
    /// `expr_source` is the raw text between the `@{` and its matching
    /// `}`; `column` is the 1-based column of the `@`.
    Splice { expr_source: String, column: u32 },
}

/// Scan a text line for `@{...}` inline splices. Brace matching is
/// nest-sensitive: a `{`/`}` inside a string literal inside the splice
/// does not affect depth. Returns `Err(column)` for an unterminated
/// splice (no matching `}` before end of line).
pub fn scan_splices(line: &str) -> Result<Vec<Segment>, u32> {
    let chars: Vec<char> = line.chars().collect();
    let mut segments = Vec::new();
    let mut text_buf = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '@' && chars.get(i + 1) == Some(&'{') {
            if !text_buf.is_empty() {
                segments.push(Segment::Text(std::mem::take(&mut text_buf)));
            }

            let column = i as u32 + 1;
            let mut depth = 1;
            let mut j = i + 2;
            let start_expr = j;
            let mut in_string: Option<char> = None;
            let mut escaped = false;

            while j < chars.len() {
                let c = chars[j];
                if let Some(q) = in_string {
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == q {
                        in_string = None;
                    }
                } else {
                    match c {
                        '"' | '\'' => in_string = Some(c),
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                j += 1;
            }

            if j >= chars.len() {
                return Err(column);
            }

            let expr_source: String = chars[start_expr..j].iter().collect();
            segments.push(Segment::Splice { expr_source, column });
            i = j + 1;
        } else {
            text_buf.push(chars[i]);
            i += 1;
        }
    }

    if !text_buf.is_empty() {
        segments.push(Segment::Text(text_buf));
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_directives() {
        assert_eq!(classify("@set X 1"), Line::Directive(Directive::Set("X 1".to_string())));
        assert_eq!(classify("  @endif"), Line::Directive(Directive::EndIf));
        assert_eq!(classify("not a directive"), Line::Text("not a directive".to_string()));
    }

    #[test]
    fn unrecognized_at_word_is_text() {
        assert_eq!(classify("@foobar stays as text"), Line::Text("@foobar stays as text".to_string()));
    }

    #[test]
    fn strips_line_and_block_comments_but_not_inside_strings() {
        assert_eq!(strip_directive_comments("1 + 2 // trailing"), "1 + 2");
        assert_eq!(strip_directive_comments("1 /* mid */ + 2"), "1  + 2".trim());
        assert_eq!(strip_directive_comments("\"has // not a comment\""), "\"has // not a comment\"");
    }

    #[test]
    fn scans_simple_splice() {
        let segments = scan_splices("Hello, @{name}!").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Text("Hello, ".to_string()),
                Segment::Splice { expr_source: "name".to_string(), column: 8 },
                Segment::Text("!".to_string()),
            ]
        );
    }

    #[test]
    fn scans_nested_braces_and_strings_in_splice() {
        let segments = scan_splices("@{ {\"a\":1}.a }").unwrap();
        match &segments[0] {
            Segment::Splice { expr_source, .. } => assert_eq!(expr_source, " {\"a\":1}.a "),
            other => panic!("expected splice, got {:?}", other),
        }
    }

    #[test]
    fn unterminated_splice_is_an_error() {
        assert_eq!(scan_splices("text @{oops"), Err(6));
    }
}
