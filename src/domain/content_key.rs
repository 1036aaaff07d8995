//! Content-addressed identity for a submission.
//!
//! A `ContentKey` is derived once at ingestion and then travels by value
//! through every stage. It carries three things:
//! - `content_hash`: SHA256 of the exact uploaded bytes (hex)
//! - `identity_token`: the submitter's address, base64url encoded so a later
//!   stage can decode it and send the notification
//! - `category_slug`: the normalized position the resume is scored against

use base64::{
    engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
    Engine as _,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Separator used when collapsing whitespace in slugs
pub const SLUG_SEPARATOR: char = '_';

/// Errors raised while deriving or decoding key material
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("Invalid content: {0}")]
    InvalidContent(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),
}

/// Derived identity of one submission. Never mutated after derivation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentKey {
    content_hash: String,
    identity_token: String,
    category_slug: String,
}

impl ContentKey {
    /// Derive the key for raw artifact bytes, submitter address and category
    pub fn derive(raw: &[u8], address: &str, category: &str) -> Result<Self, KeyError> {
        if raw.is_empty() {
            return Err(KeyError::InvalidContent("artifact is empty".to_string()));
        }

        validate_address(address)?;

        let category_slug = normalize_slug(category);
        if category_slug.is_empty() {
            return Err(KeyError::InvalidContent("category is empty".to_string()));
        }
        if !is_path_safe(&category_slug) {
            return Err(KeyError::InvalidContent(format!(
                "category '{}' is not a valid path segment",
                category_slug
            )));
        }

        Ok(Self {
            content_hash: content_hash(raw),
            identity_token: encode_identity(address),
            category_slug,
        })
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn identity_token(&self) -> &str {
        &self.identity_token
    }

    pub fn category_slug(&self) -> &str {
        &self.category_slug
    }

    /// Recover the submitter's address from the identity token
    pub fn address(&self) -> Result<String, KeyError> {
        decode_identity(&self.identity_token)
    }

    /// Short form of the content hash for log lines
    pub fn short_hash(&self) -> &str {
        &self.content_hash[..self.content_hash.len().min(12)]
    }
}

impl std::fmt::Display for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.short_hash(), self.category_slug)
    }
}

/// SHA256 of the raw bytes, hex encoded (64 chars)
pub fn content_hash(raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    hex::encode(hasher.finalize())
}

/// Lowercase and collapse every run of whitespace, path separators and
/// control characters into a single `_`. Leading dots of each part are
/// dropped, so the result is always usable as one storage path segment.
///
/// Applying this to an already-normalized slug returns it unchanged, which
/// is what lets the analysis stage re-derive the key from a storage path.
pub fn normalize_slug(value: &str) -> String {
    value
        .split(|c: char| c.is_whitespace() || c.is_control() || c == '/' || c == '\\')
        .map(|part| part.trim_start_matches('.'))
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(&SLUG_SEPARATOR.to_string())
}

/// Whether a slug can be used verbatim as a single storage path segment
pub fn is_path_safe(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('.')
        && !slug.chars().any(|c| c == '/' || c == '\\' || c.is_control())
}

/// Encode an address into a reversible, path-safe token
pub fn encode_identity(address: &str) -> String {
    URL_SAFE_NO_PAD.encode(address.as_bytes())
}

/// Decode an identity token back into the address it was built from.
///
/// Padded tokens are accepted as well.
pub fn decode_identity(token: &str) -> Result<String, KeyError> {
    let engine = if token.ends_with('=') { &URL_SAFE } else { &URL_SAFE_NO_PAD };
    let bytes = engine
        .decode(token)
        .map_err(|e| KeyError::InvalidIdentity(format!("token is not base64url: {}", e)))?;

    let address = String::from_utf8(bytes)
        .map_err(|_| KeyError::InvalidIdentity("token does not decode to UTF-8".to_string()))?;

    validate_address(&address)?;
    Ok(address)
}

/// Minimal structural check of a contact address (local@domain.tld)
pub fn validate_address(address: &str) -> Result<(), KeyError> {
    let invalid = |reason: &str| KeyError::InvalidIdentity(format!("'{}': {}", address, reason));

    if address.is_empty() {
        return Err(invalid("address is empty"));
    }
    if address.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("address contains whitespace"));
    }

    let (local, domain) = address
        .split_once('@')
        .ok_or_else(|| invalid("missing '@'"))?;

    if local.is_empty() {
        return Err(invalid("empty local part"));
    }
    if domain.contains('@') {
        return Err(invalid("more than one '@'"));
    }
    if !domain.contains('.') || domain.split('.').any(str::is_empty) {
        return Err(invalid("malformed domain"));
    }

    Ok(())
}

/// Storage path of an uploaded artifact inside its bucket:
/// `{identity_token}/{category_slug}/{file_name}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPath {
    pub identity_token: String,
    pub category_slug: String,
    pub file_name: String,
}

impl ArtifactPath {
    /// Build the storage path for a key and the submitter's name
    pub fn for_submission(key: &ContentKey, submitter_name: &str) -> Self {
        let name_slug = match normalize_slug(submitter_name) {
            slug if slug.is_empty() => "unknown_user".to_string(),
            slug => slug,
        };

        Self {
            identity_token: key.identity_token.clone(),
            category_slug: key.category_slug.clone(),
            file_name: format!("resume-{}.pdf", name_slug),
        }
    }

    /// Parse a storage key back into its segments
    pub fn parse(key: &str) -> Result<Self, KeyError> {
        let parts: Vec<&str> = key.split('/').collect();

        match parts.as_slice() {
            [token, slug, file] if [token, slug, file].iter().all(|s| is_path_safe(s)) => {
                Ok(Self {
                    identity_token: token.to_string(),
                    category_slug: slug.to_string(),
                    file_name: file.to_string(),
                })
            }
            _ => Err(KeyError::InvalidContent(format!(
                "artifact key '{}' is not '<identity>/<category>/<file>'",
                key
            ))),
        }
    }

    /// Human-readable position ("software_engineer" -> "software engineer")
    pub fn position(&self) -> String {
        self.category_slug.replace(SLUG_SEPARATOR, " ")
    }
}

impl std::fmt::Display for ArtifactPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.identity_token, self.category_slug, self.file_name
        )
    }
}
