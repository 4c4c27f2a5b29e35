//! Reader registry (§4.5, §6.2): routes an include reference to the first
//! reader whose `supports(ref)` returns true.

pub mod git;
pub mod http;
pub mod local;

use crate::depmap::DependencyMap;
use crate::error::BuilderError;
use crate::location::PathMeta;

/// Credential material handed to readers that need it (HTTP basic/bearer
/// auth, git-over-https tokens). Kept deliberately thin: the core does
/// not know or care which provider a credential is for.
#[derive(Clone, Debug, Default)]
pub struct Credentials {
    pub basic_auth: Option<(String, String)>,
    pub bearer_token: Option<String>,
}

/// Context threaded through to a reader's `read` call: the dependency map
/// (for pin lookups the reader itself needs, e.g. resolving `latest`) and
/// credential material.
pub struct ReadContext<'a> {
    pub dependencies: Option<&'a DependencyMap>,
    pub credentials: &'a Credentials,
}

/// What a successful read produces: the text, and — for sources that have
/// a notion of a commit — the concrete commit identifier that was read,
/// used to populate the dependency map when recording is enabled.
#[derive(Clone, Debug)]
pub struct ReadResult {
    pub text: String,
    pub commit_id: Option<String>,
}

/// The reader contract (§6.2). Implementors are capability objects:
/// concrete network/filesystem access is injected (`FileSystem`,
/// `HttpClient`, `GitClient`), the reader itself only does reference
/// parsing and dispatch.
pub trait Reader: Send + Sync {
    fn supports(&self, reference: &str) -> bool;
    fn parse_path(&self, reference: &str) -> Result<PathMeta, BuilderError>;
    fn read(&self, reference: &str, ctx: &ReadContext) -> Result<ReadResult, BuilderError>;
}

/// Readers tried in registration order; the first whose `supports`
/// returns true wins (§4.5 step 2).
#[derive(Default)]
pub struct ReaderRegistry {
    readers: Vec<Box<dyn Reader>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        ReaderRegistry { readers: Vec::new() }
    }

    pub fn register(&mut self, reader: Box<dyn Reader>) {
        self.readers.push(reader);
    }

    pub fn find(&self, reference: &str) -> Option<&dyn Reader> {
        self.readers.iter().find(|r| r.supports(reference)).map(|r| r.as_ref())
    }
}

/// Whether a reference uses one of the recognized git-backed schemes or
/// the generic `<repo-url>.git/<path>[@ref]` form (§6.3), as opposed to a
/// plain local path or an `http(s)://` URL.
pub fn is_git_reference(reference: &str) -> bool {
    git::GitScheme::detect(reference).is_some()
}

pub fn is_http_reference(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}
