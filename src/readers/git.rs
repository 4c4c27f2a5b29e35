//! Git-backed reader (§4.7, §6.3): one `GitReader` parameterized by which
//! of the five reference grammars it was built for, all sharing the same
//! `GitClient` capability and `latest`-resolution logic.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::BuilderError;
use crate::location::{Location, PathMeta};

use super::{Credentials, ReadContext, ReadResult, Reader};

/// Which of the five reference grammars in §6.3 a `GitReader` handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GitScheme {
    /// `<repo-url>.git/<path>[@ref]`
    Generic,
    /// `github:<org>/<repo>/<path>[@ref]`
    GitHub,
    /// `git-azure-repos:<org>/<project>/<repo>/<path>[@ref]`
    GitAzureRepos,
    /// `git-local:<filesystem-repo>/<path>[@ref]`
    GitLocal,
    /// `bitbucket-server:<project>/<repo>/<path>[@ref]`
    BitbucketServer,
}

static GENERIC_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.git/").unwrap());

impl GitScheme {
    pub fn prefix(self) -> Option<&'static str> {
        match self {
            GitScheme::Generic => None,
            GitScheme::GitHub => Some("github:"),
            GitScheme::GitAzureRepos => Some("git-azure-repos:"),
            GitScheme::GitLocal => Some("git-local:"),
            GitScheme::BitbucketServer => Some("bitbucket-server:"),
        }
    }

    /// Identify which (if any) git scheme a reference uses.
    pub fn detect(reference: &str) -> Option<GitScheme> {
        for scheme in [GitScheme::GitHub, GitScheme::GitAzureRepos, GitScheme::GitLocal, GitScheme::BitbucketServer] {
            if reference.starts_with(scheme.prefix().unwrap()) {
                return Some(scheme);
            }
        }
        if GENERIC_MARKER.is_match(reference) {
            return Some(GitScheme::Generic);
        }
        None
    }
}

/// A reference split into its repository locator, in-repo path, and ref
/// (branch/tag/commit/`latest`, defaulting to `latest` when omitted).
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedGitRef {
    pub repo_locator: String,
    pub in_repo_path: String,
    pub requested_ref: String,
}

/// Split a reference on the scheme's prefix (if shorthand) and the
/// trailing `@ref`, then on the repo-boundary marker appropriate to the
/// scheme (`.git/` for generic; the Nth `/`-separated segment for the
/// shorthand forms, per their arity in §6.3).
pub fn parse_reference(scheme: GitScheme, reference: &str) -> Result<ParsedGitRef, BuilderError> {
    let without_prefix = match scheme.prefix() {
        Some(prefix) => reference.strip_prefix(prefix).unwrap_or(reference),
        None => reference,
    };

    let (before_ref, requested_ref) = match without_prefix.rsplit_once('@') {
        Some((before, r)) if !r.is_empty() => (before, r.to_string()),
        _ => (without_prefix, "latest".to_string()),
    };

    let (repo_locator, in_repo_path) = match scheme {
        GitScheme::Generic => {
            let idx = before_ref.find(".git/").ok_or_else(|| malformed(reference))?;
            let split_at = idx + ".git".len();
            (before_ref[..split_at].to_string(), before_ref[split_at + 1..].to_string())
        }
        GitScheme::GitHub | GitScheme::GitLocal => split_on_nth_slash(before_ref, 2, reference)?,
        GitScheme::GitAzureRepos | GitScheme::BitbucketServer => split_on_nth_slash(before_ref, 3, reference)?,
    };

    if in_repo_path.is_empty() {
        return Err(malformed(reference));
    }

    Ok(ParsedGitRef { repo_locator, in_repo_path, requested_ref })
}

fn split_on_nth_slash(input: &str, segments: usize, original: &str) -> Result<(String, String), BuilderError> {
    let mut idx = None;
    let mut seen = 0;
    for (pos, c) in input.char_indices() {
        if c == '/' {
            seen += 1;
            if seen == segments {
                idx = Some(pos);
                break;
            }
        }
    }
    let split_at = idx.ok_or_else(|| malformed(original))?;
    Ok((input[..split_at].to_string(), input[split_at + 1..].to_string()))
}

fn malformed(reference: &str) -> BuilderError {
    BuilderError::SourceReading {
        location: Location::at_line(reference.to_string(), 0),
        reference: reference.to_string(),
        cause: "malformed git reference".to_string(),
    }
}

/// Git plumbing as an injected capability: list tags, read a file at a
/// ref, and resolve a ref (branch/tag/`latest`) to a commit SHA.
pub trait GitClient: Send + Sync {
    fn list_tags(&self, repo_locator: &str) -> Result<Vec<String>, String>;
    fn resolve_commit(&self, repo_locator: &str, git_ref: &str) -> Result<String, String>;
    fn read_file_at_commit(&self, repo_locator: &str, commit_id: &str, path: &str) -> Result<String, String>;
}

/// Shells out to the system `git` binary: `git ls-remote --tags` for tag
/// discovery, `git archive <commit> <path> | tar -xO` equivalent for the
/// read. Mirrors the canonical reader's subprocess-based design (§4.7)
/// without committing to its exact wire format.
pub struct SystemGitClient;

impl GitClient for SystemGitClient {
    fn list_tags(&self, repo_locator: &str) -> Result<Vec<String>, String> {
        let output = std::process::Command::new("git")
            .args(["ls-remote", "--tags", repo_locator])
            .output()
            .map_err(|e| e.to_string())?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).into_owned());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .filter_map(|line| line.rsplit("refs/tags/").next())
            .map(|tag| tag.trim_end_matches("^{}").to_string())
            .collect())
    }

    fn resolve_commit(&self, repo_locator: &str, git_ref: &str) -> Result<String, String> {
        let output = std::process::Command::new("git")
            .args(["ls-remote", repo_locator, git_ref])
            .output()
            .map_err(|e| e.to_string())?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).into_owned());
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().next())
            .map(|s| s.to_string())
            .ok_or_else(|| format!("ref \"{}\" not found in {}", git_ref, repo_locator))
    }

    fn read_file_at_commit(&self, repo_locator: &str, commit_id: &str, path: &str) -> Result<String, String> {
        let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
        let clone = std::process::Command::new("git")
            .args(["clone", "--quiet", repo_locator, &dir.path().to_string_lossy()])
            .output()
            .map_err(|e| e.to_string())?;
        if !clone.status.success() {
            return Err(String::from_utf8_lossy(&clone.stderr).into_owned());
        }

        let show = std::process::Command::new("git")
            .args(["-C", &dir.path().to_string_lossy(), "show", &format!("{}:{}", commit_id, path)])
            .output()
            .map_err(|e| e.to_string())?;
        if !show.status.success() {
            return Err(String::from_utf8_lossy(&show.stderr).into_owned());
        }
        Ok(String::from_utf8_lossy(&show.stdout).into_owned())
    }
}

/// Resolve `latest` to the lexicographically greatest tag under
/// semantic-version ordering; tags that do not parse as semver sort
/// before all semver tags (§6.3).
pub fn resolve_latest_tag(tags: &[String]) -> Option<&String> {
    tags.iter().max_by(|a, b| compare_tags(a, b))
}

fn compare_tags(a: &str, b: &str) -> std::cmp::Ordering {
    match (parse_semver(a), parse_semver(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb),
        (Some(_), None) => std::cmp::Ordering::Greater,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

fn parse_semver(tag: &str) -> Option<(u64, u64, u64)> {
    let stripped = tag.strip_prefix('v').unwrap_or(tag);
    let mut parts = stripped.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

pub struct GitReader {
    scheme: GitScheme,
    client: Arc<dyn GitClient>,
}

impl GitReader {
    pub fn new(scheme: GitScheme, client: Arc<dyn GitClient>) -> Self {
        GitReader { scheme, client }
    }

    /// Resolve the parsed ref to a concrete commit, consulting the
    /// dependency map first (§4.5 step 4: a pinned reference is read at
    /// its pinned commit, not re-resolved).
    fn resolve(&self, reference: &str, parsed: &ParsedGitRef, ctx: &ReadContext) -> Result<String, BuilderError> {
        if let Some(pinned) = ctx.dependencies.and_then(|d| d.get(reference)) {
            return Ok(pinned.to_string());
        }

        if parsed.requested_ref == "latest" {
            let tags = self.client.list_tags(&parsed.repo_locator).map_err(|cause| BuilderError::SourceReading {
                location: Location::at_line(reference.to_string(), 0),
                reference: reference.to_string(),
                cause,
            })?;
            let tag = resolve_latest_tag(&tags).ok_or_else(|| BuilderError::SourceReading {
                location: Location::at_line(reference.to_string(), 0),
                reference: reference.to_string(),
                cause: "repository has no tags to resolve \"latest\" against".to_string(),
            })?;
            return self.client.resolve_commit(&parsed.repo_locator, tag).map_err(|cause| BuilderError::SourceReading {
                location: Location::at_line(reference.to_string(), 0),
                reference: reference.to_string(),
                cause,
            });
        }

        self.client.resolve_commit(&parsed.repo_locator, &parsed.requested_ref).map_err(|cause| {
            BuilderError::SourceReading {
                location: Location::at_line(reference.to_string(), 0),
                reference: reference.to_string(),
                cause,
            }
        })
    }
}

impl Reader for GitReader {
    fn supports(&self, reference: &str) -> bool {
        GitScheme::detect(reference) == Some(self.scheme)
    }

    fn parse_path(&self, reference: &str) -> Result<PathMeta, BuilderError> {
        let parsed = parse_reference(self.scheme, reference)?;
        let file = parsed.in_repo_path.rsplit('/').next().unwrap_or(&parsed.in_repo_path).to_string();
        Ok(PathMeta {
            file,
            path: reference.to_string(),
            repo_ref: Some(parsed.requested_ref),
            repo_prefix: Some(parsed.repo_locator),
        })
    }

    fn read(&self, reference: &str, ctx: &ReadContext) -> Result<ReadResult, BuilderError> {
        let parsed = parse_reference(self.scheme, reference)?;
        let commit_id = self.resolve(reference, &parsed, ctx)?;

        let text = self
            .client
            .read_file_at_commit(&parsed.repo_locator, &commit_id, &parsed.in_repo_path)
            .map_err(|cause| BuilderError::SourceReading {
                location: Location::at_line(reference.to_string(), 0),
                reference: reference.to_string(),
                cause,
            })?;

        Ok(ReadResult { text, commit_id: Some(commit_id) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depmap::DependencyMap;
    use std::sync::Mutex;

    struct FakeGit {
        tags: Vec<String>,
        files: Mutex<std::collections::HashMap<(String, String), String>>,
    }

    impl GitClient for FakeGit {
        fn list_tags(&self, _repo_locator: &str) -> Result<Vec<String>, String> {
            Ok(self.tags.clone())
        }

        fn resolve_commit(&self, _repo_locator: &str, git_ref: &str) -> Result<String, String> {
            Ok(format!("commit-for-{}", git_ref))
        }

        fn read_file_at_commit(&self, _repo_locator: &str, commit_id: &str, path: &str) -> Result<String, String> {
            self.files
                .lock()
                .unwrap()
                .get(&(commit_id.to_string(), path.to_string()))
                .cloned()
                .ok_or_else(|| "no such blob".to_string())
        }
    }

    #[test]
    fn detects_schemes() {
        assert_eq!(GitScheme::detect("github:org/repo/path.bdr@v1"), Some(GitScheme::GitHub));
        assert_eq!(GitScheme::detect("git-azure-repos:o/p/r/path.bdr"), Some(GitScheme::GitAzureRepos));
        assert_eq!(GitScheme::detect("git-local:/srv/repo/path.bdr"), Some(GitScheme::GitLocal));
        assert_eq!(GitScheme::detect("bitbucket-server:proj/repo/path.bdr"), Some(GitScheme::BitbucketServer));
        assert_eq!(GitScheme::detect("https://example.com/x.git/path.bdr"), Some(GitScheme::Generic));
        assert_eq!(GitScheme::detect("plain/local/path.bdr"), None);
    }

    #[test]
    fn parses_generic_reference_with_ref() {
        let parsed = parse_reference(GitScheme::Generic, "https://example.com/repo.git/dir/file.bdr@v2.0.0").unwrap();
        assert_eq!(parsed.repo_locator, "https://example.com/repo.git");
        assert_eq!(parsed.in_repo_path, "dir/file.bdr");
        assert_eq!(parsed.requested_ref, "v2.0.0");
    }

    #[test]
    fn parses_github_shorthand_defaulting_to_latest() {
        let parsed = parse_reference(GitScheme::GitHub, "github:org/repo/dir/file.bdr").unwrap();
        assert_eq!(parsed.repo_locator, "org/repo");
        assert_eq!(parsed.in_repo_path, "dir/file.bdr");
        assert_eq!(parsed.requested_ref, "latest");
    }

    #[test]
    fn parses_bitbucket_server_with_four_segments() {
        let parsed = parse_reference(GitScheme::BitbucketServer, "bitbucket-server:proj/repo/dir/file.bdr@main").unwrap();
        assert_eq!(parsed.repo_locator, "proj/repo");
        assert_eq!(parsed.in_repo_path, "dir/file.bdr");
        assert_eq!(parsed.requested_ref, "main");
    }

    #[test]
    fn latest_prefers_highest_semver_and_non_semver_sorts_first() {
        let tags = vec!["notes".to_string(), "v1.2.0".to_string(), "v1.10.0".to_string(), "v1.9.0".to_string()];
        assert_eq!(resolve_latest_tag(&tags), Some(&"v1.10.0".to_string()));
    }

    #[test]
    fn read_resolves_latest_tag_and_fetches_blob() {
        let mut files = std::collections::HashMap::new();
        files.insert(("commit-for-v2.0.0".to_string(), "dir/file.bdr".to_string()), "contents".to_string());
        let client = Arc::new(FakeGit { tags: vec!["v1.0.0".to_string(), "v2.0.0".to_string()], files: Mutex::new(files) });
        let reader = GitReader::new(GitScheme::GitHub, client);
        let creds = Credentials::default();
        let ctx = ReadContext { dependencies: None, credentials: &creds };

        let result = reader.read("github:org/repo/dir/file.bdr", &ctx).unwrap();
        assert_eq!(result.text, "contents");
        assert_eq!(result.commit_id, Some("commit-for-v2.0.0".to_string()));
    }

    #[test]
    fn read_uses_pinned_commit_instead_of_resolving() {
        let mut files = std::collections::HashMap::new();
        files.insert(("pinned-sha".to_string(), "dir/file.bdr".to_string()), "pinned contents".to_string());
        let client = Arc::new(FakeGit { tags: vec![], files: Mutex::new(files) });
        let reader = GitReader::new(GitScheme::GitHub, client);

        let mut deps = DependencyMap::new();
        deps.record("github:org/repo/dir/file.bdr", "pinned-sha");
        let creds = Credentials::default();
        let ctx = ReadContext { dependencies: Some(&deps), credentials: &creds };

        let result = reader.read("github:org/repo/dir/file.bdr", &ctx).unwrap();
        assert_eq!(result.text, "pinned contents");
        assert_eq!(result.commit_id, Some("pinned-sha".to_string()));
    }
}
