//! Trailing signature block.
//!
//! A bundle may carry a plain-text fingerprint block after its last
//! package, delimited by literal marker lines. The block is parsed as
//! structured text only; the fingerprint itself is not verified against a
//! key.

use std::fmt;

use crate::error::{Error, Result};

/// Parsed signature block fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    pub fingerprint_length: u32,
    pub key: String,
    pub hash: String,
    pub digest: String,
}

impl Signature {
    pub const MARKER_START: &'static str = "--=</Begin HP Signed File Fingerprint\\>=--";
    pub const MARKER_END: &'static str = "--=</End HP Signed File Fingerprint\\>=--";

    /// Parse the text between the two fingerprint markers.
    ///
    /// Field names are case-insensitive and trimmed; unrecognized fields
    /// are ignored. A non-empty line without a `:` separator before the
    /// end marker is malformed.
    pub fn parse(input: &str) -> Result<Self> {
        let start = input
            .find(Self::MARKER_START)
            .ok_or_else(|| Error::format("missing signature start marker"))?;
        let body_start = start + Self::MARKER_START.len();

        let body_len = input[body_start..]
            .find(Self::MARKER_END)
            .ok_or_else(|| Error::format("missing signature end marker"))?;
        let body = &input[body_start..body_start + body_len];

        let mut signature = Signature::default();

        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (field, value) = line
                .split_once(':')
                .ok_or_else(|| Error::format("missing field separator in signature"))?;
            let value = value.trim();

            match field.trim().to_ascii_lowercase().as_str() {
                "fingerprint length" => {
                    signature.fingerprint_length = value.parse().map_err(|_| {
                        Error::format(format!("invalid signature fingerprint length: {value:?}"))
                    })?;
                }
                "key" => signature.key = value.to_string(),
                "hash" => signature.hash = value.to_string(),
                "signature" => signature.digest = value.to_string(),
                _ => {}
            }
        }

        Ok(signature)
    }
}

impl fmt::Display for Signature {
    /// Re-emit the block as it appears on disk. The second
    /// `Fingerprint Length` line mirrors the duplicate present in observed
    /// firmware images and is kept for byte-compatibility.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", Self::MARKER_START)?;
        writeln!(f, "Fingerprint Length: {}", self.fingerprint_length)?;
        writeln!(f, "Key: {}", self.key)?;
        writeln!(f, "Hash: {}", self.hash)?;
        writeln!(f, "Signature: {}", self.digest)?;
        writeln!(f, "Fingerprint Length: {}", self.fingerprint_length)?;
        writeln!(f, "{}", Self::MARKER_END)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fields_between_markers() {
        let input = format!(
            "{}\nKey: abc\nHash: sha256\nSignature: deadbeef\nFingerprint Length: 4\n{}\n",
            Signature::MARKER_START,
            Signature::MARKER_END
        );
        let signature = Signature::parse(&input).unwrap();
        assert_eq!(
            signature,
            Signature {
                fingerprint_length: 4,
                key: "abc".to_string(),
                hash: "sha256".to_string(),
                digest: "deadbeef".to_string(),
            }
        );
    }

    #[test]
    fn field_names_are_case_insensitive_and_unknowns_ignored() {
        let input = format!(
            "{}\nKEY:  rsa-2048 \nVendor: HP\nhash: sha1\nSignature: 00ff\nFingerprint Length: 2\n{}\n",
            Signature::MARKER_START,
            Signature::MARKER_END
        );
        let signature = Signature::parse(&input).unwrap();
        assert_eq!(signature.key, "rsa-2048");
        assert_eq!(signature.hash, "sha1");
    }

    #[test]
    fn missing_start_marker_is_an_error() {
        let input = format!("Key: abc\n{}\n", Signature::MARKER_END);
        assert!(matches!(Signature::parse(&input), Err(Error::Format(_))));
    }

    #[test]
    fn missing_end_marker_is_an_error() {
        let input = format!("{}\nKey: abc\n", Signature::MARKER_START);
        assert!(matches!(Signature::parse(&input), Err(Error::Format(_))));
    }

    #[test]
    fn line_without_separator_is_an_error() {
        let input = format!(
            "{}\nKey: abc\nnot a field line\n{}\n",
            Signature::MARKER_START,
            Signature::MARKER_END
        );
        assert!(matches!(Signature::parse(&input), Err(Error::Format(_))));
    }

    #[test]
    fn serialization_keeps_the_duplicate_length_line() {
        let signature = Signature {
            fingerprint_length: 256,
            key: "hp-2017".to_string(),
            hash: "sha256".to_string(),
            digest: "q1w2e3==".to_string(),
        };
        let text = signature.to_string();
        assert_eq!(text.matches("Fingerprint Length: 256").count(), 2);

        // Serialization round-trips through the parser.
        assert_eq!(Signature::parse(&text).unwrap(), signature);
    }
}
