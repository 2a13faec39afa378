//! Pairing payload validation.
//!
//! The transport emits a fresh pairing payload every few seconds while a
//! session waits for its QR code to be scanned. Some of those payloads are
//! junk (truncated, placeholder strings from a half-initialized bridge).
//! [`PairingCode`] is the validated form: if you hold one, it passed the
//! format rule.

use std::fmt;

use crate::ProtocolError;

/// Default minimum payload length. A payload must be strictly longer.
pub const DEFAULT_MIN_PAIRING_LEN: usize = 20;

/// The domain-separator token every real pairing payload contains.
const SEPARATOR: char = '@';

/// A pairing payload that passed format validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingCode(String);

impl PairingCode {
    /// Validates `raw` with the default minimum length.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        Self::parse_with_min_len(raw, DEFAULT_MIN_PAIRING_LEN)
    }

    /// Validates `raw`: it must be longer than `min_len` characters and
    /// contain `@`.
    pub fn parse_with_min_len(raw: &str, min_len: usize) -> Result<Self, ProtocolError> {
        let len = raw.chars().count();
        if len <= min_len {
            return Err(ProtocolError::InvalidPairingPayload(format!(
                "length {len} must exceed {min_len}"
            )));
        }
        if !raw.contains(SEPARATOR) {
            return Err(ProtocolError::InvalidPairingPayload(
                "missing '@' separator".into(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
