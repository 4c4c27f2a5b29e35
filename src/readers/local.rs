//! Local filesystem reader: given a set of include folders, resolve a
//! reference to a file and read it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::BuilderError;
use crate::location::{Location, PathMeta};

use super::{ReadContext, ReadResult, Reader};

/// Filesystem access as an injected capability, so the reader can be
/// exercised in tests against an in-memory stand-in instead of real
/// disk.
pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> std::io::Result<String>;
    fn is_file(&self, path: &Path) -> bool;
}

pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Reads references that are neither `http(s)://` URLs nor one of the
/// recognized git locator forms. `reference` is expected to already be an
/// absolute-ish path by the time it reaches this reader: relative
/// resolution against the including frame is the driver's job (§4.5),
/// since only the driver knows the active frame.
pub struct LocalReader {
    fs: Arc<dyn FileSystem>,
    include_folders: Vec<PathBuf>,
}

impl LocalReader {
    pub fn new(fs: Arc<dyn FileSystem>, include_folders: Vec<PathBuf>) -> Self {
        LocalReader { fs, include_folders }
    }

    /// Find the first existing candidate: the reference itself (if
    /// absolute or already resolvable relative to the working
    /// directory), then each include folder in order.
    fn locate(&self, reference: &str) -> Option<PathBuf> {
        let direct = PathBuf::from(reference);
        if self.fs.is_file(&direct) {
            return Some(direct);
        }

        for folder in &self.include_folders {
            let candidate = folder.join(reference);
            if self.fs.is_file(&candidate) {
                return Some(candidate);
            }
        }

        None
    }
}

impl Reader for LocalReader {
    fn supports(&self, reference: &str) -> bool {
        !super::is_http_reference(reference) && !super::is_git_reference(reference)
    }

    fn parse_path(&self, reference: &str) -> Result<PathMeta, BuilderError> {
        let resolved = self.locate(reference).unwrap_or_else(|| PathBuf::from(reference));
        let file = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| reference.to_string());

        Ok(PathMeta { file, path: resolved.to_string_lossy().into_owned(), repo_ref: None, repo_prefix: None })
    }

    fn read(&self, reference: &str, _ctx: &ReadContext) -> Result<ReadResult, BuilderError> {
        let resolved = self.locate(reference).ok_or_else(|| BuilderError::SourceReading {
            location: Location::at_line(reference.to_string(), 0),
            reference: reference.to_string(),
            cause: "no such file in the working directory or any include folder".to_string(),
        })?;

        let text = self.fs.read_to_string(&resolved).map_err(|e| BuilderError::SourceReading {
            location: Location::at_line(reference.to_string(), 0),
            reference: reference.to_string(),
            cause: e.to_string(),
        })?;

        Ok(ReadResult { text, commit_id: None })
    }
}
