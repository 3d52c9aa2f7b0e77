//! Deterministic fingerprints for error occurrences.
//!
//! A fingerprint has the form `<channel>:<source>:<hash>`. Channel and source
//! are percent-encoded so the key can be split back into its parts, and the
//! hash is a truncated BLAKE3 digest of the error text.

use std::fmt;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

/// Text used when an error renders to nothing.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Number of hex characters of the message digest kept in a key.
const HASH_HEX_LEN: usize = 32;

/// Characters escaped in the channel and source prefix.
const KEY_COMPONENT: &AsciiSet = &CONTROLS.add(b':').add(b'%').add(b' ');

/// Returns the text used to identify an error.
///
/// Falls back to [`UNKNOWN_ERROR`] when the error displays as blank.
#[must_use]
pub fn error_message(error: &dyn fmt::Display) -> String {
    let message = error.to_string();
    if message.trim().is_empty() {
        UNKNOWN_ERROR.to_string()
    } else {
        message
    }
}

/// Computes the fingerprint for an error occurrence.
#[must_use]
pub fn compute_key(channel: &str, message: &str, source: &str) -> String {
    let digest = blake3::hash(message.as_bytes()).to_hex();
    format!(
        "{}:{}:{}",
        utf8_percent_encode(channel, KEY_COMPONENT),
        utf8_percent_encode(source, KEY_COMPONENT),
        &digest[..HASH_HEX_LEN]
    )
}

/// The decoded parts of a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyParts {
    /// The channel the occurrence was destined for.
    pub channel: String,
    /// The reporting source.
    pub source: String,
    /// Hex digest of the error text.
    pub hash: String,
}

/// Splits a fingerprint back into channel, source and hash.
///
/// Returns `None` if the key was not produced by [`compute_key`].
#[must_use]
pub fn parse_key(key: &str) -> Option<KeyParts> {
    let mut parts = key.split(':');
    let channel = parts.next()?;
    let source = parts.next()?;
    let hash = parts.next()?;
    if parts.next().is_some() || hash.len() != HASH_HEX_LEN {
        return None;
    }

    Some(KeyParts {
        channel: percent_decode_str(channel).decode_utf8().ok()?.into_owned(),
        source: percent_decode_str(source).decode_utf8().ok()?.into_owned(),
        hash: hash.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug)]
    struct Blank;

    impl fmt::Display for Blank {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "   ")
        }
    }

    #[test]
    fn error_message_uses_display() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert_eq!(error_message(&err), "disk full");
        assert_eq!(error_message(&"plain text"), "plain text");
    }

    #[test]
    fn error_message_blank_falls_back() {
        assert_eq!(error_message(&Blank), UNKNOWN_ERROR);
        assert_eq!(error_message(&""), UNKNOWN_ERROR);
    }

    #[test]
    fn key_has_prefix_and_hash() {
        let key = compute_key("test-channel", "Test error", "testFunction");
        assert!(key.starts_with("test-channel:testFunction:"));
        assert_eq!(key.len(), "test-channel:testFunction:".len() + HASH_HEX_LEN);
    }

    #[test]
    fn key_is_repeatable() {
        let a = compute_key("ops", "timeout", "sync");
        let b = compute_key("ops", "timeout", "sync");
        assert_eq!(a, b);
    }

    #[test]
    fn each_input_changes_key() {
        let base = compute_key("ops", "timeout", "sync");
        assert_ne!(base, compute_key("dev", "timeout", "sync"));
        assert_ne!(base, compute_key("ops", "timeout!", "sync"));
        assert_ne!(base, compute_key("ops", "timeout", "fetch"));
    }

    #[test]
    fn separators_in_components_are_escaped() {
        let a = compute_key("a:b", "msg", "c");
        let b = compute_key("a", "msg", "b:c");
        assert_ne!(a, b);

        let parts = parse_key(&a).unwrap();
        assert_eq!(parts.channel, "a:b");
        assert_eq!(parts.source, "c");
    }

    #[test]
    fn parse_key_rejects_foreign_keys() {
        assert!(parse_key("no-separators").is_none());
        assert!(parse_key("a:b:short").is_none());
        assert!(parse_key("a:b:c:d").is_none());
    }

    proptest! {
        #[test]
        fn key_is_deterministic(channel in ".*", message in ".*", source in ".*") {
            prop_assert_eq!(
                compute_key(&channel, &message, &source),
                compute_key(&channel, &message, &source)
            );
        }

        #[test]
        fn key_round_trips_prefix(channel in ".*", message in ".*", source in ".*") {
            let key = compute_key(&channel, &message, &source);
            let parts = parse_key(&key).unwrap();
            prop_assert_eq!(parts.channel, channel);
            prop_assert_eq!(parts.source, source);
        }

        #[test]
        fn different_messages_differ(a in ".+", b in ".+") {
            prop_assume!(a != b);
            prop_assert_ne!(compute_key("c", &a, "s"), compute_key("c", &b, "s"));
        }
    }
}
