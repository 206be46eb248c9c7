//! Content-addressed job identity.
//!
//! A job's signature is the SHA-256 of its canonical posting URL. It is the
//! only identity a Job Record has: two postings with the same canonical URL
//! are the same job, a reposted job under a new URL is a new job.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Hex-encoded SHA-256 of a canonical posting URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobSignature(String);

impl JobSignature {
    /// Compute the signature of a posting URL.
    pub fn of(url: &str) -> Self {
        let canonical = canonicalize_url(url);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap a signature loaded from storage.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    ///
    /// Text loaded from storage may not be hex; the whole value is returned
    /// when 12 bytes do not end on a character boundary.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for JobSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shorthand for [`JobSignature::of`].
pub fn signature_of(url: &str) -> JobSignature {
    JobSignature::of(url)
}

/// Normalize a URL so trivially different spellings hash the same.
///
/// - scheme and host lowercased, default port dropped (via `url`)
/// - fragment removed
/// - trailing slash removed from non-root paths
///
/// Strings that do not parse as absolute URLs are only trimmed.
pub fn canonicalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    url.set_fragment(None);

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    url.to_string()
}
