//! Content-addressed reference identifiers.
//!
//! A reference blob is identified by the SHA-256 digest of its content,
//! rendered as `sha256:` followed by the URL-safe, unpadded base64 encoding
//! of the 32 raw digest bytes. Parsing is more lenient than rendering: both
//! the URL-safe and the standard alphabet are accepted, with or without
//! trailing `=` padding.

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

const PREFIX: &str = "sha256:";

/// Unpadded base64 length of a 32-byte digest.
const RAW_LEN: usize = 43;
/// Padded base64 length of a 32-byte digest (one `=`).
const PADDED_LEN: usize = 44;

/// Error returned when a string does not parse as an [`Identifier`].
#[derive(Debug, Error)]
#[error("invalid identifier: {reason}")]
pub struct InvalidIdentifier {
    reason: &'static str,
    #[source]
    source: Option<base64::DecodeError>,
}

impl InvalidIdentifier {
    fn new(reason: &'static str) -> Self {
        Self {
            reason,
            source: None,
        }
    }

    /// The parse failure, independent of any underlying decode error.
    pub fn reason(&self) -> &str {
        self.reason
    }
}

/// The SHA-256 content hash identifying a reference blob.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identifier([u8; 32]);

impl Identifier {
    /// Compute the identifier for a fully buffered blob.
    pub fn digest(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self(hasher.finalize().into())
    }

    /// Create an incremental hasher for streamed content.
    pub fn hasher() -> IdentifierHasher {
        IdentifierHasher(Sha256::new())
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// URL-safe unpadded base64 of the digest, without the `sha256:` prefix.
    /// This is the form used for storage keys and file names.
    pub fn raw(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Parse the wire form (`sha256:` + base64 digest).
    ///
    /// The base64 part must be exactly 43 characters, or 44 with a trailing
    /// `=`. Both the URL-safe and the standard alphabet are accepted.
    pub fn parse(input: &str) -> Result<Self, InvalidIdentifier> {
        let n = input.len();
        if n != PREFIX.len() + RAW_LEN && n != PREFIX.len() + PADDED_LEN {
            return Err(InvalidIdentifier::new("unexpected input length"));
        }
        let Some(encoded) = input.strip_prefix(PREFIX) else {
            return Err(InvalidIdentifier::new("missing hash prefix"));
        };
        if encoded.len() == PADDED_LEN && !encoded.ends_with('=') {
            return Err(InvalidIdentifier::new(
                "unexpected non-padding character at the end",
            ));
        }

        let encoded = encoded.trim_end_matches('=');
        let engine = if encoded.contains(['+', '/']) {
            &STANDARD_NO_PAD
        } else {
            &URL_SAFE_NO_PAD
        };

        let bytes = engine.decode(encoded).map_err(|e| InvalidIdentifier {
            reason: "decoding failed",
            source: Some(e),
        })?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| InvalidIdentifier::new("decoding failed: unexpected output length"))?;
        Ok(Self(digest))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", self.raw())
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", &self.raw()[..8])
    }
}

impl std::str::FromStr for Identifier {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Incremental SHA-256 hasher producing an [`Identifier`].
pub struct IdentifierHasher(Sha256);

impl IdentifierHasher {
    /// Feed a chunk of content.
    pub fn update(&mut self, chunk: &[u8]) {
        self.0.update(chunk);
    }

    /// Finalize and return the identifier.
    pub fn finalize(self) -> Identifier {
        Identifier(self.0.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE};

    #[test]
    fn display_roundtrip() {
        let id = Identifier::digest(b"hello world");
        let parsed = Identifier::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn incremental_matches_buffered() {
        let mut h = Identifier::hasher();
        h.update(b"hello ");
        h.update(b"world");
        assert_eq!(h.finalize(), Identifier::digest(b"hello world"));
    }

    #[test]
    fn accepts_all_alphabets_and_padding() {
        let id = Identifier::digest(b"\xfb\xef\xbe\xff\xfe");
        let variants = [
            format!("sha256:{}", URL_SAFE_NO_PAD.encode(id.as_bytes())),
            format!("sha256:{}", URL_SAFE.encode(id.as_bytes())),
            format!("sha256:{}", STANDARD_NO_PAD.encode(id.as_bytes())),
            format!("sha256:{}", STANDARD.encode(id.as_bytes())),
        ];
        for v in &variants {
            assert_eq!(Identifier::parse(v).unwrap(), id, "variant {v}");
        }
    }

    #[test]
    fn rejects_bad_length() {
        let err = Identifier::parse("sha256:abc").unwrap_err();
        assert_eq!(err.reason(), "unexpected input length");

        let err = Identifier::parse("").unwrap_err();
        assert_eq!(err.reason(), "unexpected input length");
    }

    #[test]
    fn rejects_missing_prefix() {
        let raw = Identifier::digest(b"x").raw();
        let err = Identifier::parse(&format!("sha512:{raw}")).unwrap_err();
        assert_eq!(err.reason(), "missing hash prefix");
    }

    #[test]
    fn rejects_trailing_garbage() {
        let raw = Identifier::digest(b"x").raw();
        // 44 characters, but the last one is not padding
        let err = Identifier::parse(&format!("sha256:{raw}x")).unwrap_err();
        assert_eq!(err.reason(), "unexpected non-padding character at the end");
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = Identifier::parse(&format!("sha256:{}", "!".repeat(43))).unwrap_err();
        assert_eq!(err.reason(), "decoding failed");
    }
}
