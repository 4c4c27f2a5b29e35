//! Source location tracking: where a line, token, or include came from.

use std::fmt;

/// A single point in a source: which file, which line, which column.
///
/// `file` is a displayable identifier rather than a real filesystem path:
/// a local path, an `http(s)://` URL, or a `git-<host>:<org>/<repo>/<path>`
/// style string for git-backed includes.
#[derive(Clone, Debug, PartialEq)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Location { file: file.into(), line, column }
    }

    /// A location with no useful column information, used for whole-line
    /// bookkeeping (directive dispatch, macro definition sites).
    pub fn at_line(file: impl Into<String>, line: u32) -> Self {
        Location::new(file, line, 1)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Metadata a reader hands back about the reference it resolved, used to
/// populate `__FILE__`/`__PATH__` and to drive relative-include arithmetic
/// for the frame this reference introduces.
#[derive(Clone, Debug, Default)]
pub struct PathMeta {
    /// Value of `__FILE__` inside the included text: typically the last
    /// path component.
    pub file: String,
    /// Value of `__PATH__` inside the included text: a full locator
    /// (absolute local path, URL, or git locator) other relative includes
    /// from this frame are resolved against.
    pub path: String,
    /// Present for git-backed reads: the ref (branch/tag/commit) that was
    /// actually read, after `latest`/dependency-map resolution.
    pub repo_ref: Option<String>,
    /// Present for git-backed reads: the `org/repo` (or provider-specific
    /// equivalent) prefix, used for remote-relative include resolution.
    pub repo_prefix: Option<String>,
}

/// One entry on the preprocessor's include/macro-expansion stack.
///
/// The stack as a whole implements `__FILE__`/`__PATH__`/`__LINE__` (the
/// top frame) and cycle detection (scanning for a `resolved_id` already on
/// the stack).
#[derive(Clone, Debug)]
pub struct IncludeFrame {
    /// Value of `__FILE__` while processing this frame.
    pub file: String,
    /// Value of `__PATH__` while processing this frame.
    pub path: String,
    pub repo_ref: Option<String>,
    pub repo_prefix: Option<String>,
    /// Offset added to the line number within this frame's raw text to
    /// compute the frame's own notion of `__LINE__` (used for macro bodies,
    /// whose lines are renumbered from the macro's definition site).
    pub line_offset: u32,
    /// Current line within this frame's raw text (1-based, relative to the
    /// frame's own text, *not* including `line_offset`).
    pub current_line: u32,
    /// The identifier used to detect cycles: resolved absolute path for
    /// local files, the full URL+ref for HTTP, and the resolved commit
    /// locator for git sources.
    pub resolved_id: String,
    /// Display string of whatever frame included this one, used in error
    /// messages ("included from ...").
    pub included_by: Option<String>,
}

impl IncludeFrame {
    pub fn top_level(file: Option<String>) -> Self {
        let file = file.unwrap_or_default();
        IncludeFrame {
            path: file.clone(),
            resolved_id: file.clone(),
            file,
            repo_ref: None,
            repo_prefix: None,
            line_offset: 0,
            current_line: 1,
            included_by: None,
        }
    }

    pub fn current_location(&self) -> Location {
        Location::at_line(self.file.clone(), self.line_offset + self.current_line)
    }
}
