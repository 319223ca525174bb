// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types.

use {
    crate::algorithm::{KeyAlgorithm, SignatureAlgorithm},
    thiserror::Error as ThisError,
};

/// Errors that can occur when parsing or constructing X.509/CMS ASN.1 structures.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("error decoding PEM data: {0}")]
    PemDecode(pem::PemError),

    #[error("ASN.1 parse error: {0}")]
    Asn1Parse(String),

    #[error("unknown digest algorithm: {0}")]
    UnknownDigestAlgorithm(String),

    #[error("unknown signature algorithm: {0}")]
    UnknownSignatureAlgorithm(String),

    #[error("unknown key algorithm: {0}")]
    UnknownKeyAlgorithm(String),

    #[error("unknown elliptic curve: {0}")]
    UnknownEllipticCurve(String),

    #[error("unhandled key algorithm parameters {0}")]
    UnhandledKeyAlgorithmParameters(&'static str),

    #[error("cannot verify {1} signature with a {0} key")]
    UnsupportedSignatureVerification(KeyAlgorithm, SignatureAlgorithm),

    #[error("certificate signature verification failed")]
    CertificateSignatureVerificationFailed,

    #[error("key pair generation error")]
    KeyPairGenerationError,

    #[error("RSA key generation is not supported")]
    RsaKeyGenerationNotSupported,

    #[error("key rejected by cryptography provider: {0}")]
    KeyRejected(String),

    #[error("RSA keys used for CMS signing must be at least 2048 bits")]
    WeakRsaKey,

    #[error("XML encoding error: {0}")]
    XmlWrite(String),

    #[error("XML parse error: {0}")]
    XmlRead(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl<E: std::fmt::Display> From<bcder::decode::DecodeError<E>> for Error {
    fn from(e: bcder::decode::DecodeError<E>) -> Self {
        Self::Asn1Parse(e.to_string())
    }
}

impl From<ring::error::KeyRejected> for Error {
    fn from(e: ring::error::KeyRejected) -> Self {
        Self::KeyRejected(e.to_string())
    }
}
