//! HTTP(S) reader, grounded on `logicaffeine`'s `ureq`-based fetch
//! helpers: plain GET of a URL, no commit notion.

use std::sync::Arc;
use std::time::Duration;

use crate::error::BuilderError;
use crate::location::{Location, PathMeta};

use super::{Credentials, ReadContext, ReadResult, Reader};

/// Network access as an injected capability.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str, credentials: &Credentials) -> Result<String, String>;
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct UreqHttpClient;

impl HttpClient for UreqHttpClient {
    fn get(&self, url: &str, credentials: &Credentials) -> Result<String, String> {
        let agent = ureq::AgentBuilder::new().timeout(DEFAULT_TIMEOUT).build();
        let mut request = agent.get(url);

        if let Some(token) = &credentials.bearer_token {
            request = request.set("Authorization", &format!("Bearer {}", token));
        } else if let Some((user, pass)) = &credentials.basic_auth {
            let encoded = base64_encode(&format!("{}:{}", user, pass));
            request = request.set("Authorization", &format!("Basic {}", encoded));
        }

        request.call().map_err(|e| e.to_string())?.into_string().map_err(|e| e.to_string())
    }
}

/// Minimal base64 encoder, avoiding a dedicated dependency for one call
/// site; `ureq` does not expose basic-auth encoding itself.
fn base64_encode(input: &str) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let bytes = input.as_bytes();
    let mut out = String::new();

    for chunk in bytes.chunks(3) {
        let b0 = chunk[0];
        let b1 = *chunk.get(1).unwrap_or(&0);
        let b2 = *chunk.get(2).unwrap_or(&0);

        out.push(ALPHABET[(b0 >> 2) as usize] as char);
        out.push(ALPHABET[(((b0 & 0x03) << 4) | (b1 >> 4)) as usize] as char);
        out.push(if chunk.len() > 1 { ALPHABET[(((b1 & 0x0f) << 2) | (b2 >> 6)) as usize] as char } else { '=' });
        out.push(if chunk.len() > 2 { ALPHABET[(b2 & 0x3f) as usize] as char } else { '=' });
    }

    out
}

pub struct HttpReader {
    client: Arc<dyn HttpClient>,
}

impl HttpReader {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        HttpReader { client }
    }
}

impl Reader for HttpReader {
    fn supports(&self, reference: &str) -> bool {
        super::is_http_reference(reference)
    }

    fn parse_path(&self, reference: &str) -> Result<PathMeta, BuilderError> {
        let file = reference.rsplit('/').next().unwrap_or(reference).to_string();
        Ok(PathMeta { file, path: reference.to_string(), repo_ref: None, repo_prefix: None })
    }

    fn read(&self, reference: &str, ctx: &ReadContext) -> Result<ReadResult, BuilderError> {
        let text = self.client.get(reference, ctx.credentials).map_err(|cause| BuilderError::SourceReading {
            location: Location::at_line(reference.to_string(), 0),
            reference: reference.to_string(),
            cause,
        })?;
        Ok(ReadResult { text, commit_id: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeHttp(&'static str);
    impl HttpClient for FakeHttp {
        fn get(&self, _url: &str, _credentials: &Credentials) -> Result<String, String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingHttp;
    impl HttpClient for FailingHttp {
        fn get(&self, _url: &str, _credentials: &Credentials) -> Result<String, String> {
            Err("connection refused".to_string())
        }
    }

    #[test]
    fn supports_only_http_urls() {
        let reader = HttpReader::new(Arc::new(FakeHttp("")));
        assert!(reader.supports("https://example.com/x.bdr"));
        assert!(reader.supports("http://example.com/x.bdr"));
        assert!(!reader.supports("local/path.bdr"));
    }

    #[test]
    fn reads_body_text() {
        let reader = HttpReader::new(Arc::new(FakeHttp("remote contents")));
        let creds = Credentials::default();
        let ctx = ReadContext { dependencies: None, credentials: &creds };
        let result = reader.read("https://example.com/x.bdr", &ctx).unwrap();
        assert_eq!(result.text, "remote contents");
        assert_eq!(result.commit_id, None);
    }

    #[test]
    fn failure_becomes_source_reading_error() {
        let reader = HttpReader::new(Arc::new(FailingHttp));
        let creds = Credentials::default();
        let ctx = ReadContext { dependencies: None, credentials: &creds };
        assert!(matches!(reader.read("https://example.com/x.bdr", &ctx), Err(BuilderError::SourceReading { .. })));
    }

    #[test]
    fn base64_matches_known_vector() {
        assert_eq!(base64_encode("user:pass"), "dXNlcjpwYXNz");
    }
}
