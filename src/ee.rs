// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Accessors for the two X.509 extensions the CMS profile cares about:
//! Basic Constraints and Subject Key Identifier.
//!
//! This deliberately does not attempt to be a general extension-semantics
//! layer; it extracts exactly the two facts the provisioning CMS profile
//! needs to tell an EE certificate from a CA certificate and to match a
//! `SignerInfo`'s `subjectKeyIdentifier` to the certificate that signed it.

use {
    crate::rfc5280::Certificate,
    bcder::{decode::Constructed, ConstOid, Mode, Oid, OctetString},
};

const OID_BASIC_CONSTRAINTS: ConstOid = Oid(&[85, 29, 19]);
const OID_SUBJECT_KEY_IDENTIFIER: ConstOid = Oid(&[85, 29, 14]);

/// The subset of extensions relevant to EE-vs-CA classification.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EeCertificateExtensions {
    pub basic_constraints_ca: Option<bool>,
    pub subject_key_identifier: Option<Vec<u8>>,
}

impl EeCertificateExtensions {
    /// A certificate qualifies as an EE certificate when Basic Constraints is
    /// absent, or present with `cA = false`.
    pub fn is_ee_certificate(&self) -> bool {
        !self.basic_constraints_ca.unwrap_or(false)
    }
}

/// Extract the Basic Constraints `cA` flag and Subject Key Identifier from a certificate.
pub fn extensions(cert: &Certificate) -> EeCertificateExtensions {
    let mut out = EeCertificateExtensions::default();

    for extension in cert.tbs_certificate.iter_extensions() {
        let der = extension.value.clone().into_bytes();

        if extension.id == OID_BASIC_CONSTRAINTS {
            out.basic_constraints_ca = parse_basic_constraints_ca(der.as_ref());
        } else if extension.id == OID_SUBJECT_KEY_IDENTIFIER {
            out.subject_key_identifier = parse_ski(der.as_ref());
        }
    }

    out
}

/// `BasicConstraints ::= SEQUENCE { cA BOOLEAN DEFAULT FALSE, ... }`
fn parse_basic_constraints_ca(der: &[u8]) -> Option<bool> {
    Constructed::decode(der, Mode::Der, |cons| {
        cons.take_sequence(|cons| {
            let ca = cons.take_opt_bool()?;
            // pathLenConstraint, if present, is irrelevant here.
            cons.capture_all()?;
            Ok(ca.unwrap_or(false))
        })
    })
    .ok()
}

/// `SubjectKeyIdentifier ::= OCTET STRING`
fn parse_ski(der: &[u8]) -> Option<Vec<u8>> {
    Constructed::decode(der, Mode::Der, |cons| OctetString::take_from(cons))
        .ok()
        .map(|os| os.into_bytes().to_vec())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn absent_basic_constraints_is_ee() {
        let exts = EeCertificateExtensions {
            basic_constraints_ca: None,
            subject_key_identifier: Some(vec![1, 2, 3]),
        };
        assert!(exts.is_ee_certificate());
    }

    #[test]
    fn ca_true_is_not_ee() {
        let exts = EeCertificateExtensions {
            basic_constraints_ca: Some(true),
            subject_key_identifier: None,
        };
        assert!(!exts.is_ee_certificate());
    }
}
