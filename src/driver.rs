//! The preprocessor driver (§4.5, §4.6): walks input line by line,
//! dispatching directives and splicing expressions, recursing into
//! includes and macro invocations.
//!
//! `Preprocessor` is deliberately `!Sync`-by-convention (§5): nothing in
//! its fields requires it, but `execute` must not be called concurrently
//! on the same instance from multiple threads.

use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::BuilderConfig;
use crate::depmap::DependencyMap;
use crate::env::Environment;
use crate::error::BuilderError;
use crate::expr::{self, Expr};
use crate::lexer::{self, Directive, Line, Segment};
use crate::location::{IncludeFrame, Location};
use crate::macros::{self, MacroDef, MacroTable};
use crate::readers::git::{GitReader, GitScheme, SystemGitClient};
use crate::readers::http::{HttpReader, UreqHttpClient};
use crate::readers::local::{FileSystem, LocalReader, StdFileSystem};
use crate::readers::{self, ReadContext, ReaderRegistry};

static SET_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=?\s*(.+)$").unwrap());

/// Boundaries found while scanning an `@if` block: the index of the
/// matching `@endif`/`@end`, and each branch's condition (`None` for
/// `@else`) plus its body's `[start, end)` range.
struct BlockScan {
    end_index: usize,
    branches: Vec<(Option<String>, usize, usize)>,
}

/// Runs one `execute` over a top-level source, maintaining the macro
/// table, variable environment, include stack, and dependency/memoization
/// state for the duration of the run.
pub struct Preprocessor {
    config: BuilderConfig,
    registry: ReaderRegistry,
    dependencies: DependencyMap,
    memo: std::collections::HashMap<String, String>,
    macros: MacroTable,
    env: Environment,
    stack: Vec<IncludeFrame>,
}

impl Preprocessor {
    /// Build a driver with the default reader stack: local filesystem,
    /// `ureq`-backed HTTP, and the five `git`-subprocess-backed schemes.
    pub fn new(config: BuilderConfig) -> Self {
        Preprocessor::with_readers(config, Arc::new(StdFileSystem), Arc::new(UreqHttpClient), Arc::new(SystemGitClient))
    }

    /// Build a driver with injected reader capabilities, for testing
    /// without real disk/network/subprocess access.
    pub fn with_readers(
        config: BuilderConfig,
        fs: Arc<dyn FileSystem>,
        http: Arc<dyn crate::readers::http::HttpClient>,
        git: Arc<dyn crate::readers::git::GitClient>,
    ) -> Self {
        let mut registry = ReaderRegistry::new();
        registry.register(Box::new(LocalReader::new(fs, config.include_folders.clone())));
        registry.register(Box::new(HttpReader::new(http)));
        for scheme in [GitScheme::GitHub, GitScheme::GitAzureRepos, GitScheme::GitLocal, GitScheme::BitbucketServer, GitScheme::Generic] {
            registry.register(Box::new(GitReader::new(scheme, git.clone())));
        }

        Preprocessor {
            dependencies: DependencyMap::new(),
            memo: std::collections::HashMap::new(),
            macros: MacroTable::new(),
            env: Environment::new(),
            stack: Vec::new(),
            config,
            registry,
        }
    }

    pub fn dependencies(&self) -> &DependencyMap {
        &self.dependencies
    }

    pub fn load_dependencies(&mut self, map: DependencyMap) {
        self.dependencies = map;
    }

    /// Run the preprocessor over `source`, named `file` (used for
    /// `__FILE__` and diagnostics; `None` for stdin).
    pub fn execute(&mut self, file: Option<String>, source: &str) -> Result<String, BuilderError> {
        if self.config.clear_cache {
            self.memo.clear();
            self.dependencies = DependencyMap::new();
        }

        crate::error::set_warnings_maximum(self.config.warnings_maximum);
        for name in &self.config.muted_warnings {
            crate::error::mute_warning(name.clone());
        }

        self.stack.push(IncludeFrame::top_level(file));
        let lines: Vec<String> = source.lines().map(|s| s.to_string()).collect();
        let result = self.process_lines(&lines, 0);
        self.stack.pop();
        result
    }

    fn current_location(&self) -> Location {
        self.stack.last().expect("execute pushes a frame before processing").current_location()
    }

    fn set_current_line(&mut self, line: u32) {
        self.stack.last_mut().expect("execute pushes a frame before processing").current_line = line;
    }

    /// Process a contiguous run of lines belonging to the current frame.
    /// `line_base` is the 0-based offset of `lines[0]` within the frame's
    /// own numbering (nonzero only when recursing into a `@if` branch
    /// that is a sub-range of a larger line array).
    fn process_lines(&mut self, lines: &[String], line_base: u32) -> Result<String, BuilderError> {
        let classified: Vec<Line> = lines.iter().map(|l| lexer::classify(l)).collect();
        let mut output = String::new();
        let mut i = 0usize;

        while i < lines.len() {
            self.set_current_line(line_base + i as u32 + 1);

            match &classified[i] {
                Line::Text(raw) => {
                    output.push_str(&self.splice_line(raw)?);
                    output.push('\n');
                    i += 1;
                }

                Line::Directive(Directive::Set(rest)) => {
                    self.execute_set(rest)?;
                    i += 1;
                }

                Line::Directive(Directive::Macro(rest)) => {
                    let end_index = self.scan_macro_body(&classified, i)?;
                    let loc = self.current_location();
                    let (name, params) = macros::parse_macro_header(rest, &loc)?;
                    let body = lines[i + 1..end_index].to_vec();
                    self.macros.define(MacroDef { name, params, body, def_site: loc });
                    i = end_index + 1;
                }

                Line::Directive(Directive::If(_)) => {
                    let scan = self.scan_block(&classified, i)?;
                    if let Some((start, end)) = self.select_branch(&scan)? {
                        let text = self.process_lines(&lines[start..end], line_base + start as u32)?;
                        output.push_str(&text);
                    }
                    i = scan.end_index + 1;
                }

                Line::Directive(Directive::ElseIf(_))
                | Line::Directive(Directive::Else)
                | Line::Directive(Directive::EndIf)
                | Line::Directive(Directive::EndMacro)
                | Line::Directive(Directive::End) => {
                    return Err(BuilderError::Syntax {
                        location: self.current_location(),
                        message: "directive has no matching @if or @macro".to_string(),
                    });
                }

                Line::Directive(Directive::Error(rest)) => {
                    let loc = self.current_location();
                    let expr = expr::parse(rest, &loc)?;
                    let value = expr::eval(&expr, &self.env, &loc)?;
                    return Err(BuilderError::User { location: loc, message: value.to_canonical_string() });
                }

                Line::Directive(Directive::Include(rest)) => {
                    output.push_str(&self.process_include(rest)?);
                    i += 1;
                }
            }
        }

        Ok(output)
    }

    fn execute_set(&mut self, rest: &str) -> Result<(), BuilderError> {
        let loc = self.current_location();
        let caps = SET_HEADER.captures(rest).ok_or_else(|| BuilderError::Syntax {
            location: loc.clone(),
            message: format!("malformed @set \"{}\"", rest),
        })?;
        let name = caps[1].to_string();
        let expr = expr::parse(&caps[2], &loc)?;
        let value = expr::eval(&expr, &self.env, &loc)?;
        self.env.set_global(name, value);
        Ok(())
    }

    fn splice_line(&self, raw: &str) -> Result<String, BuilderError> {
        let loc = self.current_location();
        let segments = lexer::scan_splices(raw).map_err(|column| BuilderError::Syntax {
            location: Location::new(loc.file.clone(), loc.line, column),
            message: "unterminated @{ splice".to_string(),
        })?;

        let mut line_out = String::new();
        for segment in segments {
            match segment {
                Segment::Text(text) => line_out.push_str(&text),
                Segment::Splice { expr_source, column } => {
                    let splice_loc = Location::new(loc.file.clone(), loc.line, column);
                    let expr = expr::parse(&expr_source, &splice_loc)?;
                    let value = expr::eval(&expr, &self.env, &splice_loc)?;
                    line_out.push_str(&value.to_splice_string());
                }
            }
        }
        Ok(line_out)
    }

    /// Starting at `classified[open_index]` (an `@if`), find the matching
    /// `@endif`/`@end`, tracking nested `@if`/`@macro` opens so an inner
    /// block's close does not end the outer one, and record each
    /// branch's condition and body range along the way. A `@macro`
    /// nested inside an `@if` branch is only skipped over here (its own
    /// nested-macro restriction is enforced when that branch is actually
    /// processed and the `@macro` line is reached for real).
    fn scan_block(&self, classified: &[Line], open_index: usize) -> Result<BlockScan, BuilderError> {
        let mut depth: u32 = 1;
        let mut branches = Vec::new();
        let mut branch_cond = match &classified[open_index] {
            Line::Directive(Directive::If(cond)) => Some(cond.clone()),
            _ => unreachable!("scan_block is only called on an @if line"),
        };
        let mut branch_start = open_index + 1;
        let mut i = open_index + 1;

        while i < classified.len() {
            if let Line::Directive(d) = &classified[i] {
                match d {
                    Directive::If(_) | Directive::Macro(_) => depth += 1,
                    Directive::ElseIf(cond) if depth == 1 => {
                        branches.push((branch_cond.take(), branch_start, i));
                        branch_cond = Some(cond.clone());
                        branch_start = i + 1;
                    }
                    Directive::Else if depth == 1 => {
                        branches.push((branch_cond.take(), branch_start, i));
                        branch_cond = None;
                        branch_start = i + 1;
                    }
                    Directive::EndIf | Directive::EndMacro | Directive::End => {
                        depth -= 1;
                        if depth == 0 {
                            branches.push((branch_cond.take(), branch_start, i));
                            return Ok(BlockScan { end_index: i, branches });
                        }
                    }
                    _ => {}
                }
            }
            i += 1;
        }

        Err(BuilderError::Syntax { location: self.current_location(), message: "unterminated @if".to_string() })
    }

    /// Starting at `classified[open_index]` (a `@macro`), perform the
    /// flat, non-nesting-aware capture scan described in §4.6: every line
    /// up to the matching `@endmacro`/`@end` is captured verbatim
    /// (including any `@if`/`@endif` it contains — those are re-parsed
    /// only when the macro is invoked), except that a bare `@macro` line
    /// anywhere in that range is a hard error, since macro definitions do
    /// not nest.
    fn scan_macro_body(&self, classified: &[Line], open_index: usize) -> Result<usize, BuilderError> {
        let mut i = open_index + 1;
        while i < classified.len() {
            match &classified[i] {
                Line::Directive(Directive::Macro(_)) => {
                    return Err(BuilderError::Syntax {
                        location: self.current_location(),
                        message: "nested @macro definition is not allowed".to_string(),
                    });
                }
                Line::Directive(Directive::EndMacro) | Line::Directive(Directive::End) => return Ok(i),
                _ => {}
            }
            i += 1;
        }

        Err(BuilderError::Syntax { location: self.current_location(), message: "unterminated @macro".to_string() })
    }

    /// Evaluate branch conditions in order; the first true condition (or
    /// an unconditional `@else` branch) wins. `None` means no branch of
    /// the `@if` was selected.
    fn select_branch(&self, scan: &BlockScan) -> Result<Option<(usize, usize)>, BuilderError> {
        for (cond, start, end) in &scan.branches {
            match cond {
                Some(source) => {
                    let loc = self.current_location();
                    let expr = expr::parse(source, &loc)?;
                    let value = expr::eval(&expr, &self.env, &loc)?;
                    if value.truthy() {
                        return Ok(Some((*start, *end)));
                    }
                }
                None => return Ok(Some((*start, *end))),
            }
        }
        Ok(None)
    }

    fn process_include(&mut self, rest: &str) -> Result<String, BuilderError> {
        let loc = self.current_location();
        let expr = expr::parse(rest, &loc)?;

        if let Expr::Call(name, args) = &expr {
            if self.macros.contains(name) {
                return self.invoke_macro(name, args, &loc);
            }
        }

        let value = expr::eval(&expr, &self.env, &loc)?;
        let reference = value.to_canonical_string();
        self.include_source(&reference, &loc)
    }

    fn invoke_macro(&mut self, name: &str, args: &[Expr], loc: &Location) -> Result<String, BuilderError> {
        let arg_values = args.iter().map(|a| expr::eval(a, &self.env, loc)).collect::<Result<Vec<_>, _>>()?;
        let def = self.macros.get(name).expect("presence checked by caller").clone();

        if arg_values.len() != def.params.len() {
            return Err(BuilderError::User {
                location: loc.clone(),
                message: format!("macro \"{}\" expects {} argument(s), got {}", name, def.params.len(), arg_values.len()),
            });
        }

        self.env.push_scope();
        for (param, value) in def.params.iter().zip(arg_values) {
            self.env.bind_local(param.clone(), value);
        }

        self.stack.push(IncludeFrame {
            file: def.def_site.file.clone(),
            path: def.def_site.file.clone(),
            repo_ref: None,
            repo_prefix: None,
            line_offset: def.def_site.line,
            current_line: 1,
            resolved_id: format!("{}#macro:{}@{}", def.def_site.file, name, def.def_site.line),
            included_by: Some(loc.to_string()),
        });

        let result = self.process_lines(&def.body, 0);
        self.stack.pop();
        self.env.pop_scope();
        result
    }

    fn include_source(&mut self, reference: &str, loc: &Location) -> Result<String, BuilderError> {
        let resolved_ref = self.resolve_reference(reference);

        let reader = self
            .registry
            .find(&resolved_ref)
            .ok_or_else(|| BuilderError::UnknownSource { location: loc.clone(), reference: resolved_ref.clone() })?;

        let path_meta = reader.parse_path(&resolved_ref)?;
        // Cycle detection and the read cache key off the reader's own
        // canonical form, not the as-written reference: two different
        // relative spellings of the same local file resolve to the same
        // `path_meta.path` and must be recognized as the same source.
        let resolved_id = path_meta.path.clone();

        if self.stack.iter().any(|f| f.resolved_id == resolved_id) {
            let stack_display = self.stack.iter().map(|f| f.file.clone()).collect::<Vec<_>>().join(" -> ");
            return Err(BuilderError::CircularInclude { location: loc.clone(), reference: resolved_id, stack: stack_display });
        }

        let text = match self.memo.get(&resolved_id) {
            Some(cached) => cached.clone(),
            None => {
                let ctx = ReadContext { dependencies: Some(&self.dependencies), credentials: &self.config.credentials };
                let result = reader.read(&resolved_ref, &ctx)?;
                if let Some(commit_id) = &result.commit_id {
                    self.dependencies.record(resolved_ref.clone(), commit_id.clone());
                }
                self.memo.insert(resolved_id.clone(), result.text.clone());
                result.text
            }
        };

        self.stack.push(IncludeFrame {
            file: path_meta.file,
            path: path_meta.path,
            repo_ref: path_meta.repo_ref,
            repo_prefix: path_meta.repo_prefix,
            line_offset: 0,
            current_line: 1,
            resolved_id,
            included_by: Some(loc.to_string()),
        });

        let lines: Vec<String> = text.lines().map(|s| s.to_string()).collect();
        let body = self.process_lines(&lines, 0);
        self.stack.pop();
        let body = body?;

        if self.config.generate_line_control_statements {
            let resume_line = loc.line + 1;
            Ok(format!("#line 1 \"{}\"\n{}#line {} \"{}\"\n", resolved_ref, body, resume_line, loc.file))
        } else {
            Ok(body)
        }
    }

    /// Resolve a raw include reference against the active frame (§4.5).
    /// `http(s)://` URLs and git-scheme references are already absolute.
    /// A scheme-less reference is resolved relative to the active
    /// frame's directory when the frame is local, relative to the
    /// frame's remote prefix when the frame is remote and
    /// `remote_relative_includes` is set, and relative to the top-level
    /// source otherwise.
    fn resolve_reference(&self, reference: &str) -> String {
        if readers::is_http_reference(reference) || readers::is_git_reference(reference) {
            return reference.to_string();
        }

        let frame = self.stack.last().expect("execute pushes a frame before processing");

        if frame.repo_prefix.is_some() {
            if self.config.remote_relative_includes {
                return join_remote(frame, reference);
            }
            let top = self.stack.first().expect("execute pushes a frame before processing");
            return join_local_path(&top.path, reference);
        }

        join_local_path(&frame.path, reference)
    }
}

fn join_remote(frame: &IncludeFrame, reference: &str) -> String {
    let (base, ref_suffix) = match frame.path.rsplit_once('@') {
        Some((b, r)) if !r.contains('/') => (b, Some(r)),
        _ => (frame.path.as_str(), None),
    };
    let dir = base.rfind('/').map(|idx| &base[..idx]).unwrap_or(base);

    match ref_suffix {
        Some(r) => format!("{}/{}@{}", dir, reference, r),
        None => format!("{}/{}", dir, reference),
    }
}

fn join_local_path(base_path: &str, reference: &str) -> String {
    if reference.starts_with('/') {
        return reference.to_string();
    }
    let base_dir = std::path::Path::new(base_path).parent().unwrap_or_else(|| std::path::Path::new(""));
    normalize_path(&base_dir.join(reference))
}

fn normalize_path(path: &std::path::Path) -> String {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::git::GitClient;
    use crate::readers::http::HttpClient;
    use crate::readers::Credentials;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeFs {
        files: HashMap<PathBuf, String>,
    }
    impl FileSystem for FakeFs {
        fn read_to_string(&self, path: &std::path::Path) -> std::io::Result<String> {
            self.files.get(path).cloned().ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
        }
        fn is_file(&self, path: &std::path::Path) -> bool {
            self.files.contains_key(path)
        }
    }

    struct DeadHttp;
    impl HttpClient for DeadHttp {
        fn get(&self, _url: &str, _credentials: &Credentials) -> Result<String, String> {
            Err("no network in tests".to_string())
        }
    }

    struct DeadGit;
    impl GitClient for DeadGit {
        fn list_tags(&self, _repo_locator: &str) -> Result<Vec<String>, String> {
            Err("no git in tests".to_string())
        }
        fn resolve_commit(&self, _repo_locator: &str, _git_ref: &str) -> Result<String, String> {
            Err("no git in tests".to_string())
        }
        fn read_file_at_commit(&self, _repo_locator: &str, _commit_id: &str, _path: &str) -> Result<String, String> {
            Err("no git in tests".to_string())
        }
    }

    fn run(files: &[(&str, &str)], entry_file: &str, source: &str) -> Result<String, BuilderError> {
        let mut map = HashMap::new();
        for (path, contents) in files {
            map.insert(PathBuf::from(*path), contents.to_string());
        }
        let fs = Arc::new(FakeFs { files: map });
        let mut pre = Preprocessor::with_readers(BuilderConfig::default(), fs, Arc::new(DeadHttp), Arc::new(DeadGit));
        pre.execute(Some(entry_file.to_string()), source)
    }

    #[test]
    fn set_and_splice_round_trip() {
        let out = run(&[], "main.bdr", "@set X 1 + 2\nvalue: @{X}\n").unwrap();
        assert_eq!(out, "value: 3\n");
    }

    #[test]
    fn macro_invocation_binds_parameters() {
        let source = "@macro greet(name)\nhello, @{name}!\n@endmacro\n@include greet(\"world\")\n";
        let out = run(&[], "main.bdr", source).unwrap();
        assert_eq!(out, "hello, world!\n");
    }

    #[test]
    fn if_elseif_else_selects_one_branch() {
        let source = "@set PLATFORM \"linux\"\n@if PLATFORM == \"windows\"\nwin\n@elseif PLATFORM == \"linux\"\nnix\n@else\nother\n@endif\n";
        let out = run(&[], "main.bdr", source).unwrap();
        assert_eq!(out, "nix\n");
    }

    #[test]
    fn file_pseudo_variable_reflects_active_frame() {
        let files = [("/inc/lib.bdr", "from: @{__FILE__}\n")];
        let source = "top: @{__FILE__}\n@include \"/inc/lib.bdr\"\n";
        let out = run(&files, "main.bdr", source).unwrap();
        assert_eq!(out, "top: main.bdr\nfrom: lib.bdr\n");
    }

    #[test]
    fn circular_include_is_detected() {
        let files = [("/a.bdr", "@include \"/b.bdr\"\n"), ("/b.bdr", "@include \"/a.bdr\"\n")];
        let err = run(&files, "/a.bdr", "@include \"/a.bdr\"\n").unwrap_err();
        assert!(matches!(err, BuilderError::CircularInclude { .. }));
    }

    #[test]
    fn error_directive_aborts_with_user_error() {
        let source = "@if !defined(REQUIRED)\n@error \"REQUIRED must be set\"\n@endif\n";
        let err = run(&[], "main.bdr", source).unwrap_err();
        match err {
            BuilderError::User { message, .. } => assert_eq!(message, "REQUIRED must be set"),
            other => panic!("expected User error, got {:?}", other),
        }
    }

    #[test]
    fn undefined_variable_splices_as_empty_string() {
        let out = run(&[], "main.bdr", "value=[@{UNSET}]\n").unwrap();
        assert_eq!(out, "value=[]\n");
    }

    #[test]
    fn three_argument_macro_and_min_builtin() {
        let source = "@macro pick3(a, b, c)\nsmallest is @{min(a, b, c)}\n@endmacro\n@include pick3(5, 1, 9)\n";
        let out = run(&[], "main.bdr", source).unwrap();
        assert_eq!(out, "smallest is 1\n");
    }

    #[test]
    fn nested_macro_definition_is_a_syntax_error() {
        let source = "@macro outer()\n@macro inner()\nx\n@endmacro\n@endmacro\n";
        let err = run(&[], "main.bdr", source).unwrap_err();
        match err {
            BuilderError::Syntax { message, .. } => assert!(message.contains("nested")),
            other => panic!("expected Syntax error, got {:?}", other),
        }
    }

    #[test]
    fn macro_body_may_contain_an_if_block_closed_with_endif() {
        let source = "\
@macro greet(who)
@if defined(who)
hi @{who}
@endif
@endmacro
@include greet(\"sam\")
";
        let out = run(&[], "main.bdr", source).unwrap();
        assert_eq!(out, "hi sam\n");
    }
}
