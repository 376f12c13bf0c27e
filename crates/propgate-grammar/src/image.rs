// crates/propgate-grammar/src/image.rs
// ============================================================================
// Module: Image Reference Grammar
// Description: Parser for container image references.
// Purpose: Accept `registry[:port]/namespace/.../name[:tag|@digest]` and
//          reject everything else with a typed reason.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! The parser walks an image reference in a fixed order: character screening,
//! digest split, tag split, path sanity, per-component checks, tag checks.
//! Each step returns a distinct [`ImageReferenceError`] so callers (and
//! tests) can see exactly which branch rejected an input.
//!
//! The `host:port` versus `name:tag` ambiguity is resolved with a last-colon
//! heuristic: when the text before the last `:` has no `/` and the text after
//! it is a bare port number, the whole candidate is treated as a name. A
//! five-digit tag on a single-segment name is therefore read as a port.
//!
//! ```
//! use propgate_grammar::image::ImageReference;
//!
//! let reference = ImageReference::parse("localhost:5000/team/app:v2").unwrap();
//! assert_eq!(reference.tag.as_deref(), Some("v2"));
//! assert_eq!(reference.repository, vec!["team".to_string(), "app".to_string()]);
//! ```

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Digest algorithms accepted after `@`.
pub const DIGEST_ALGORITHMS: &[&str] = &["sha256", "sha512", "sha1"];
/// Maximum number of digits in a registry port.
const MAX_PORT_DIGITS: usize = 5;
/// Maximum registry hostname length.
const MAX_HOSTNAME_LENGTH: usize = 253;
/// Maximum repository path component length.
const MAX_PATH_COMPONENT_LENGTH: usize = 63;
/// Maximum tag length.
const MAX_TAG_LENGTH: usize = 128;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Registry address parsed from the first path component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    /// Registry hostname.
    pub host: String,
    /// Optional registry port, kept as written so leading zeros survive
    /// [`Display`](fmt::Display).
    pub port: Option<String>,
}

impl Registry {
    /// Numeric value of the port.
    #[must_use]
    pub fn port_number(&self) -> Option<u32> {
        self.port.as_deref().and_then(|port| port.parse().ok())
    }
}

/// Content digest parsed after `@`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    /// Digest algorithm (one of [`DIGEST_ALGORITHMS`]).
    pub algorithm: String,
    /// Digest hash text.
    pub hash: String,
}

/// Parsed container image reference.
///
/// # Invariants
/// - At most one of `tag` and `digest` is populated.
/// - No repository component is empty.
/// - `repository` is empty only for a lone `host:port` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry address when the reference names one.
    pub registry: Option<Registry>,
    /// Repository path components.
    pub repository: Vec<String>,
    /// Tag, when present.
    pub tag: Option<String>,
    /// Digest, when present.
    pub digest: Option<Digest>,
}

/// Reasons an image reference is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageReferenceError {
    /// Input was empty.
    #[error("image reference is empty")]
    Empty,
    /// Input contained whitespace or control characters.
    #[error("image reference contains whitespace or control characters")]
    IllegalCharacter,
    /// Input contained more than one `@`.
    #[error("image reference contains more than one `@`")]
    AmbiguousDigest,
    /// Digest was not `algorithm:hash` with both parts present.
    #[error("malformed digest `{0}`")]
    MalformedDigest(String),
    /// Digest algorithm is not supported.
    #[error("unsupported digest algorithm `{0}`")]
    UnsupportedDigestAlgorithm(String),
    /// Image name was empty.
    #[error("image name is empty")]
    EmptyName,
    /// Image name contained `//` or `..`.
    #[error("image name `{0}` contains an empty or relative path segment")]
    InvalidPathSequence(String),
    /// Registry component was not `host:port`.
    #[error("invalid registry `{0}`")]
    InvalidRegistry(String),
    /// Registry port was not 1-5 digits.
    #[error("invalid registry port `{0}`")]
    InvalidPort(String),
    /// Registry hostname failed the hostname rule.
    #[error("invalid registry hostname `{0}`")]
    InvalidHostname(String),
    /// Repository path component failed the component rule.
    #[error("invalid repository component `{0}`")]
    InvalidPathComponent(String),
    /// Tag failed the tag rule.
    #[error("invalid tag `{0}`")]
    InvalidTag(String),
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

impl ImageReference {
    /// Parses an image reference.
    ///
    /// # Errors
    ///
    /// Returns [`ImageReferenceError`] naming the first grammar step that
    /// rejected the input.
    pub fn parse(input: &str) -> Result<Self, ImageReferenceError> {
        if input.is_empty() {
            return Err(ImageReferenceError::Empty);
        }
        if input.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
            return Err(ImageReferenceError::IllegalCharacter);
        }

        let (candidate, digest) = split_digest(input)?;
        let (name, tag) = if digest.is_some() { (candidate, None) } else { split_tag(candidate) };

        if name.is_empty() {
            return Err(ImageReferenceError::EmptyName);
        }
        if name.contains("//") || name.contains("..") {
            return Err(ImageReferenceError::InvalidPathSequence(name.to_string()));
        }

        let components: Vec<&str> = name.split('/').collect();
        let multi_component = components.len() > 1;
        let mut registry = None;
        let mut repository = Vec::with_capacity(components.len());
        for (index, component) in components.iter().enumerate() {
            if index == 0 && component.contains(':') {
                registry = Some(parse_registry_with_port(component)?);
            } else if index == 0 && multi_component && component.contains('.') {
                if !is_valid_hostname(component) {
                    return Err(ImageReferenceError::InvalidHostname((*component).to_string()));
                }
                registry = Some(Registry {
                    host: (*component).to_string(),
                    port: None,
                });
            } else {
                if !is_valid_path_component(component) {
                    return Err(ImageReferenceError::InvalidPathComponent(
                        (*component).to_string(),
                    ));
                }
                repository.push((*component).to_string());
            }
        }

        if let Some(tag) = tag
            && !is_valid_tag(tag)
        {
            return Err(ImageReferenceError::InvalidTag(tag.to_string()));
        }

        Ok(Self {
            registry,
            repository,
            tag: tag.map(str::to_string),
            digest,
        })
    }

    /// Returns the repository path joined with `/`.
    #[must_use]
    pub fn repository_path(&self) -> String {
        self.repository.join("/")
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote_segment = false;
        if let Some(registry) = &self.registry {
            f.write_str(&registry.host)?;
            if let Some(port) = &registry.port {
                write!(f, ":{port}")?;
            }
            wrote_segment = true;
        }
        for component in &self.repository {
            if wrote_segment {
                f.write_str("/")?;
            }
            f.write_str(component)?;
            wrote_segment = true;
        }
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}:{}", digest.algorithm, digest.hash)?;
        }
        Ok(())
    }
}

/// Returns true when `input` is a valid image reference.
#[must_use]
pub fn is_valid_image_reference(input: &str) -> bool {
    ImageReference::parse(input).is_ok()
}

// ============================================================================
// SECTION: Steps
// ============================================================================

/// Splits off and validates the digest, if any.
fn split_digest(input: &str) -> Result<(&str, Option<Digest>), ImageReferenceError> {
    if input.matches('@').count() > 1 {
        return Err(ImageReferenceError::AmbiguousDigest);
    }
    let Some((candidate, digest)) = input.split_once('@') else {
        return Ok((input, None));
    };
    let Some((algorithm, hash)) = digest.split_once(':') else {
        return Err(ImageReferenceError::MalformedDigest(digest.to_string()));
    };
    if algorithm.is_empty() || hash.is_empty() {
        return Err(ImageReferenceError::MalformedDigest(digest.to_string()));
    }
    if !DIGEST_ALGORITHMS.contains(&algorithm) {
        return Err(ImageReferenceError::UnsupportedDigestAlgorithm(algorithm.to_string()));
    }
    Ok((
        candidate,
        Some(Digest {
            algorithm: algorithm.to_string(),
            hash: hash.to_string(),
        }),
    ))
}

/// Splits a name candidate into name and tag on the last `:`.
fn split_tag(candidate: &str) -> (&str, Option<&str>) {
    match candidate.rsplit_once(':') {
        None => (candidate, None),
        Some((name, tag)) if !name.contains('/') && is_port(tag) => (candidate, None),
        Some((name, tag)) => (name, Some(tag)),
    }
}

/// Parses a leading `host:port` component.
fn parse_registry_with_port(component: &str) -> Result<Registry, ImageReferenceError> {
    let parts: Vec<&str> = component.split(':').collect();
    let [host, port] = parts.as_slice() else {
        return Err(ImageReferenceError::InvalidRegistry(component.to_string()));
    };
    if host.is_empty() || port.is_empty() {
        return Err(ImageReferenceError::InvalidRegistry(component.to_string()));
    }
    if !is_valid_hostname(host) {
        return Err(ImageReferenceError::InvalidHostname((*host).to_string()));
    }
    if !is_port(port) {
        return Err(ImageReferenceError::InvalidPort((*port).to_string()));
    }
    Ok(Registry {
        host: (*host).to_string(),
        port: Some((*port).to_string()),
    })
}

// ============================================================================
// SECTION: Character Rules
// ============================================================================

/// Returns true for 1-5 ASCII digits.
fn is_port(text: &str) -> bool {
    (1 ..= MAX_PORT_DIGITS).contains(&text.len()) && text.bytes().all(|b| b.is_ascii_digit())
}

/// Hostname rule: dotted labels of alphanumerics, `-` and `_`.
fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > MAX_HOSTNAME_LENGTH {
        return false;
    }
    if host.starts_with(['-', '.']) || host.ends_with(['-', '.']) {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    })
}

/// Repository component rule.
fn is_valid_path_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    bytes.len() <= MAX_PATH_COMPONENT_LENGTH
        && first.is_ascii_alphanumeric()
        && last.is_ascii_alphanumeric()
        && bytes.iter().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// Tag rule.
fn is_valid_tag(tag: &str) -> bool {
    (1 ..= MAX_TAG_LENGTH).contains(&tag.len())
        && !tag.starts_with(['-', '.'])
        && tag.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
