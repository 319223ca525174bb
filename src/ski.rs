// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subject Key Identifier computation and its XML-carried Base64 form.
//!
//! The up-down protocol identifies public keys by the SHA-1 digest of their
//! DER-encoded `SubjectPublicKeyInfo`, the same identifier X.509 carries as
//! the Subject Key Identifier extension. The XML wire form is that digest
//! URL-safe Base64 encoded without padding.

use {crate::error::Error, base64::URL_SAFE_NO_PAD, ring::digest};

/// Compute the 20-byte SHA-1 SKI over a DER-encoded `SubjectPublicKeyInfo`.
pub fn compute_ski(spki_der: &[u8]) -> [u8; 20] {
    let digest = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, spki_der);
    let mut out = [0u8; 20];
    out.copy_from_slice(digest.as_ref());
    out
}

/// Encode an SKI using the URL-safe, unpadded Base64 alphabet the wire format uses.
pub fn to_base64url(ski: &[u8]) -> String {
    base64::encode_config(ski, URL_SAFE_NO_PAD)
}

/// Decode an SKI previously produced by [`to_base64url`].
pub fn from_base64url(s: &str) -> Result<[u8; 20], Error> {
    let bytes = base64::decode_config(s, URL_SAFE_NO_PAD)
        .map_err(|e| Error::Asn1Parse(format!("invalid base64 SKI: {}", e)))?;

    if bytes.len() != 20 {
        return Err(Error::Asn1Parse(format!(
            "SKI must be 20 bytes, got {}",
            bytes.len()
        )));
    }

    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips() {
        let ski = [0x11u8; 20];
        let encoded = to_base64url(&ski);
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.ends_with('='));
        assert_eq!(from_base64url(&encoded).unwrap(), ski);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(from_base64url("AA").is_err());
    }
}
