//! Base64url conversion for credential material.
//!
//! Everything exchanged with the authenticator (challenges, credential ids,
//! attestation objects, signatures) is raw binary at the platform boundary and
//! base64url on the wire. Encoding never pads; decoding accepts padded input and
//! the standard alphabet because some servers emit either.

use base64ct::{Base64UrlUnpadded, Encoding};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid base64url length")]
    InvalidLength,
}

/// Encodes bytes as unpadded base64url.
#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(bytes)
}

/// Decodes base64url (padded or not) into bytes.
///
/// # Errors
/// Returns an error if the input contains characters outside the base64 alphabets
/// or has an impossible length.
pub fn decode(input: &str) -> Result<Vec<u8>, DecodeError> {
    let trimmed = input.trim().trim_end_matches('=');
    if trimmed.len() % 4 == 1 {
        return Err(DecodeError::InvalidLength);
    }

    if trimmed.contains(['+', '/']) {
        let normalized: String = trimmed
            .chars()
            .map(|c| match c {
                '+' => '-',
                '/' => '_',
                other => other,
            })
            .collect();
        return Base64UrlUnpadded::decode_vec(&normalized).map_err(|_| DecodeError::Base64);
    }

    Base64UrlUnpadded::decode_vec(trimmed).map_err(|_| DecodeError::Base64)
}
