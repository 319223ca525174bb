// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Construction of up-down provisioning CMS objects.
//!
//! [`ProvisioningCmsObjectBuilder`] is the inverse of [`crate::parser`]: it
//! takes a [`Payload`], an EE certificate/key pair, the issuing CA's
//! certificates, and a CRL, and emits a DER-encoded `SignedData` object that
//! satisfies the profile [`crate::parser::ProvisioningCmsObjectParser`]
//! checks for.

use {
    crate::{
        algorithm::DigestAlgorithm,
        asn1time::Time,
        certificate::CapturedX509Certificate,
        ee,
        payload::{self, Payload},
        rfc5280::{AlgorithmIdentifier, Certificate, CertificateList},
        rfc5652::{
            Attribute, AttributeValue, CmsVersion, ContentInfo, EncapsulatedContentInfo,
            SignedAttributes, SignedData, SignerIdentifier, SignerInfo, OID_CONTENT_TYPE,
            OID_CT_XML, OID_MESSAGE_DIGEST, OID_SIGNED_DATA, OID_SIGNING_TIME,
        },
        signing::{InMemorySigningKeyPair, Sign},
    },
    bcder::{
        encode::{PrimitiveContent, Values},
        Captured, Mode, Oid, OctetString, Tag,
    },
    bytes::Bytes,
    signature::Signer,
    thiserror::Error as ThisError,
};

/// Errors that can occur while assembling a provisioning CMS object.
///
/// Unlike [`crate::parser::ProvisioningCmsObjectParserError`], this surfaces
/// the first problem encountered rather than accumulating a checklist: a
/// caller building an object controls its own inputs, so there is nothing to
/// report back to beyond the first defect.
#[derive(Debug, ThisError)]
pub enum CmsBuildError {
    #[error("signing operation failed")]
    SigningFailed,

    #[error("EE certificate has no Subject Key Identifier extension")]
    MissingEeCert,

    #[error("signer key is not an RSA key")]
    KeyAlgorithmMismatch,

    #[error("RSA keys used for CMS signing must be at least 2048 bits")]
    WeakRsaKey,
}

/// A 2048-bit RSA modulus is 256 bytes.
const MIN_RSA_MODULUS_LEN: usize = 256;

fn oid(src: bcder::ConstOid) -> Oid {
    Oid(Bytes::copy_from_slice(src.as_ref()))
}

/// Collects the inputs needed to sign a [Payload] into a wire-ready CMS object.
pub struct ProvisioningCmsObjectBuilder {
    payload: Payload,
    signing_time: chrono::DateTime<chrono::Utc>,
    ee_certificate: CapturedX509Certificate,
    ca_certificates: Vec<CapturedX509Certificate>,
    crl: CertificateList,
    signer: InMemorySigningKeyPair,
}

impl ProvisioningCmsObjectBuilder {
    /// Construct a new builder.
    ///
    /// `signing_time` is always supplied by the caller, never sampled from
    /// the system clock, so builds are reproducible.
    pub fn new(
        payload: Payload,
        signing_time: chrono::DateTime<chrono::Utc>,
        ee_certificate: CapturedX509Certificate,
        ca_certificates: Vec<CapturedX509Certificate>,
        crl: CertificateList,
        signer: InMemorySigningKeyPair,
    ) -> Self {
        Self {
            payload,
            signing_time,
            ee_certificate,
            ca_certificates,
            crl,
            signer,
        }
    }

    /// Emit the payload, sign it, and encode a complete DER `SignedData` object.
    pub fn build(&self) -> Result<Vec<u8>, CmsBuildError> {
        let rsa_key = match &self.signer {
            InMemorySigningKeyPair::Rsa(key, _) => key,
            _ => return Err(CmsBuildError::KeyAlgorithmMismatch),
        };

        if rsa_key.public_modulus_len() < MIN_RSA_MODULUS_LEN {
            return Err(CmsBuildError::WeakRsaKey);
        }

        let ee_x509: &crate::certificate::X509Certificate = self.ee_certificate.as_ref();
        let ee_raw: &Certificate = ee_x509.as_ref();

        let ski = ee::extensions(ee_raw)
            .subject_key_identifier
            .ok_or(CmsBuildError::MissingEeCert)?;

        let content = payload::emit(&self.payload).map_err(|_| CmsBuildError::SigningFailed)?;

        let mut hasher = DigestAlgorithm::Sha256.digester();
        hasher.update(content.as_bytes());
        let message_digest = hasher.finish();

        let signed_attrs = SignedAttributes::new(vec![
            Attribute {
                typ: oid(OID_CONTENT_TYPE),
                values: vec![AttributeValue::new(Captured::from_values(
                    Mode::Der,
                    oid(OID_CT_XML).encode_ref(),
                ))],
            },
            Attribute {
                typ: oid(OID_MESSAGE_DIGEST),
                values: vec![AttributeValue::new(Captured::from_values(
                    Mode::Der,
                    message_digest.as_ref().encode(),
                ))],
            },
            Attribute {
                typ: oid(OID_SIGNING_TIME),
                values: vec![AttributeValue::new(Captured::from_values(
                    Mode::Der,
                    Time::from(self.signing_time).encode_ref(),
                ))],
            },
        ]);

        let mut signed_attrs_der = Vec::new();
        signed_attrs
            .encode_ref_as(Tag::SET)
            .write_encoded(Mode::Der, &mut signed_attrs_der)
            .expect("encoding to an in-memory buffer cannot fail");

        let signature: Vec<u8> = Signer::try_sign(&self.signer, &signed_attrs_der)
            .map_err(|_| CmsBuildError::SigningFailed)?
            .into();
        let signature_algorithm = self
            .signer
            .signature_algorithm()
            .map_err(|_| CmsBuildError::SigningFailed)?;

        let mut certificates = vec![Certificate::from(self.ee_certificate.clone())];
        certificates.extend(
            self.ca_certificates
                .iter()
                .cloned()
                .map(Certificate::from),
        );

        let signer_info = SignerInfo {
            version: CmsVersion::from(3u8),
            sid: SignerIdentifier::SubjectKeyIdentifier(OctetString::new(Bytes::from(ski))),
            digest_algorithm: AlgorithmIdentifier::from(DigestAlgorithm::Sha256),
            signed_attrs: Some(signed_attrs),
            signature_algorithm: AlgorithmIdentifier::from(signature_algorithm),
            signature: OctetString::new(Bytes::from(signature)),
            unsigned_attrs: None,
        };

        let signed_data = SignedData {
            version: CmsVersion::from(3u8),
            digest_algorithms: vec![AlgorithmIdentifier::from(DigestAlgorithm::Sha256)],
            content_info: EncapsulatedContentInfo {
                content_type: oid(OID_CT_XML),
                content: Some(OctetString::new(Bytes::copy_from_slice(content.as_bytes()))),
            },
            certificates,
            crls: vec![self.crl.clone()],
            signer_infos: vec![signer_info],
        };

        let content_info = ContentInfo {
            content_type: oid(OID_SIGNED_DATA),
            content: Captured::from_values(Mode::Der, signed_data.encode_ref()),
        };

        let mut out = Vec::new();
        content_info
            .encode_ref()
            .write_encoded(Mode::Der, &mut out)
            .expect("encoding to an in-memory buffer cannot fail");

        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::parser::ProvisioningCmsObjectParser, crate::testutil};

    fn list_payload() -> Payload {
        Payload::List {
            sender: "child".to_string(),
            recipient: "parent".to_string(),
        }
    }

    #[test]
    fn round_trips_through_the_parser() {
        let builder = ProvisioningCmsObjectBuilder::new(
            list_payload(),
            chrono::Utc::now(),
            testutil::ee_certificate(),
            vec![testutil::ca_certificate()],
            testutil::crl(),
            testutil::ee_signing_key(),
        );

        let der = builder.build().unwrap();

        let (object, result) = ProvisioningCmsObjectParser::parse("test", &der).unwrap();
        assert!(!result.has_failures());
        assert!(matches!(object.payload(), Payload::List { .. }));
    }

    #[test]
    fn rejects_non_rsa_signer() {
        let (_, ecdsa_key) = testutil::self_signed_ecdsa_key_pair(None);

        let builder = ProvisioningCmsObjectBuilder::new(
            list_payload(),
            chrono::Utc::now(),
            testutil::ee_certificate(),
            vec![testutil::ca_certificate()],
            testutil::crl(),
            ecdsa_key,
        );

        assert!(matches!(
            builder.build(),
            Err(CmsBuildError::KeyAlgorithmMismatch)
        ));
    }
}
