//! URL-safe base64 helpers.
//!
//! Every key, signature, nonce and ciphertext crossing the wire or the
//! vault boundary uses padded URL-safe base64.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;

use crate::{CryptoError, Result};

/// Encode bytes as padded URL-safe base64.
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE.encode(bytes)
}

/// Decode padded URL-safe base64.
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    URL_SAFE
        .decode(encoded)
        .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let data = b"courier wire bytes \x00\xff\x7f";
        let encoded = encode(data);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(data.as_slice(), decoded.as_slice());
    }

    #[test]
    fn test_url_safe_alphabet() {
        // 0xfb 0xff encodes to characters outside the standard alphabet
        let encoded = encode(&[0xfb, 0xff, 0xbf]);
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
    }

    #[test]
    fn test_invalid_input_rejected() {
        let result = decode("not!base64@@");
        assert!(matches!(result, Err(CryptoError::InvalidEncoding(_))));
    }
}
