//! Run configuration (§6, §5): the knobs `execute` reads, separated from
//! `Preprocessor`'s own runtime state.

use std::path::PathBuf;

use crate::readers::Credentials;

/// Options controlling one `execute` run. Constructed once from parsed
/// CLI flags (or directly by a library caller) and borrowed for the
/// duration of the run.
#[derive(Clone, Debug)]
pub struct BuilderConfig {
    /// Local directories searched, in order, for includes that do not
    /// resolve directly (§4.7 `LocalReader`).
    pub include_folders: Vec<PathBuf>,
    /// When true, a relative include from a remote (HTTP/Git) frame is
    /// resolved against that frame's own prefix rather than the
    /// top-level local source (§4.5).
    pub remote_relative_includes: bool,
    /// Emit `#line`-equivalent markers so diagnostics in downstream
    /// tools can be mapped back to original source locations.
    pub generate_line_control_statements: bool,
    /// Drop the commit cache and memoization map at the start of
    /// `execute` instead of reusing a previous run's (§5).
    pub clear_cache: bool,
    /// Warning names to suppress entirely (`-w <name>`, repeatable).
    pub muted_warnings: Vec<String>,
    /// Maximum number of warnings of one name printed before summarizing
    /// the rest.
    pub warnings_maximum: u32,
    /// Credential material for HTTP/Git readers that need it.
    pub credentials: Credentials,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        BuilderConfig {
            include_folders: Vec::new(),
            remote_relative_includes: true,
            generate_line_control_statements: false,
            clear_cache: false,
            muted_warnings: Vec::new(),
            warnings_maximum: 10,
            credentials: Credentials::default(),
        }
    }
}
