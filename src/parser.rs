// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The CMS object parser: enforces the exact profile the up-down
//! provisioning protocol requires of a signed object and, on success,
//! yields a [`ProvisioningCmsObject`].

use {
    crate::{
        algorithm::{DigestAlgorithm, KeyAlgorithm, SignatureAlgorithm},
        certificate::{CapturedX509Certificate, X509Certificate},
        ee,
        payload::{self, Payload},
        rfc5652::{ContentInfo, OID_CT_XML, OID_RSA_ENCRYPTION},
        validation::{ValidationContext, ValidationLocation, ValidationResult},
    },
    bcder::{decode::Constructed, Mode, Oid, OctetString, Tag},
    bytes::Bytes,
    ring::signature,
    std::convert::TryFrom,
    thiserror::Error as ThisError,
};

/// The fully validated result of parsing a CMS provisioning object.
///
/// Fields are private; this type is only constructible via a successful
/// [`ProvisioningCmsObjectParser::parse`].
#[derive(Clone, Debug)]
pub struct ProvisioningCmsObject {
    encoded: Bytes,
    ee_certificate: CapturedX509Certificate,
    ca_certificates: Vec<CapturedX509Certificate>,
    crl: crate::rfc5280::CertificateList,
    payload: Payload,
}

impl ProvisioningCmsObject {
    /// The original encoded bytes, suitable for re-transmission without re-signing.
    pub fn encoded(&self) -> &Bytes {
        &self.encoded
    }

    pub fn ee_certificate(&self) -> &CapturedX509Certificate {
        &self.ee_certificate
    }

    pub fn ca_certificates(&self) -> &[CapturedX509Certificate] {
        &self.ca_certificates
    }

    pub fn crl(&self) -> &crate::rfc5280::CertificateList {
        &self.crl
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

/// Raised when a CMS object fails profile validation, or an internal error
/// prevents validation from completing at all.
#[derive(Debug, ThisError)]
#[error("CMS object failed validation at {location}")]
pub struct ProvisioningCmsObjectParserError {
    pub location: ValidationLocation,
    pub failures: Vec<crate::validation::ValidationCheck>,
}

/// Parses and validates CMS provisioning objects against the up-down profile.
pub struct ProvisioningCmsObjectParser;

impl ProvisioningCmsObjectParser {
    /// Parse and validate `der`, running every profile check in order and
    /// returning either the validated object (with the full accumulated
    /// result, including any warnings) or a composite error describing every
    /// failure recorded at `location`.
    pub fn parse(
        location: impl Into<ValidationLocation>,
        der: &[u8],
    ) -> Result<(ProvisioningCmsObject, ValidationResult), ProvisioningCmsObjectParserError> {
        let location = location.into();
        let mut ctx = ValidationContext::new();
        ctx.set_location(location.clone());

        let encoded = Bytes::copy_from_slice(der);

        // 1. Outer parse.
        let content_info = match Constructed::decode(der, Mode::Der, |cons| ContentInfo::take_from(cons))
        {
            Ok(v) => {
                ctx.reject_if_false(true, "cms.data.parsing", &[]);
                v
            }
            Err(e) => {
                ctx.reject_if_false(false, "cms.data.parsing", &[&e.to_string()]);
                return Err(abort(location, ctx));
            }
        };

        let signed_data = match content_info.into_signed_data() {
            Ok(v) => v,
            Err(e) => {
                ctx.reject_if_false(false, "cms.data.parsing", &[&e.to_string()]);
                return Err(abort(location, ctx));
            }
        };

        // 2. SignedData version.
        ctx.reject_if_false(
            u32::from(signed_data.version) == 3,
            "cms.signeddata.version",
            &[],
        );

        // 3. Digest algorithm.
        let digest_ok = signed_data.digest_algorithms.len() == 1
            && DigestAlgorithm::try_from(&signed_data.digest_algorithms[0])
                .map(|alg| alg == DigestAlgorithm::Sha256)
                .unwrap_or(false);
        ctx.reject_if_false(digest_ok, "cms.signeddata.digest.algorithm", &[]);

        // 4. Content type.
        ctx.reject_if_false(
            signed_data.content_info.content_type == OID_CT_XML,
            "cms.content.type",
            &[],
        );

        // 5. Content parse.
        let content_bytes = signed_data.content_info.content.clone().map(|c| c.into_bytes());
        let payload = match &content_bytes {
            Some(bytes) => match std::str::from_utf8(bytes.as_ref()) {
                Ok(xml) => {
                    ctx.reject_if_false(true, "cms.content.parsing", &[]);
                    payload::parse(xml, &mut ctx)
                }
                Err(e) => {
                    ctx.reject_if_false(false, "cms.content.parsing", &[&e.to_string()]);
                    None
                }
            },
            None => {
                ctx.reject_if_false(false, "cms.content.parsing", &[]);
                None
            }
        };

        // 6. Certificates.
        ctx.reject_if_false(true, "get.certs.and.crls", &[]);
        let mut ee_candidates = Vec::new();
        let mut ca_certificates = Vec::new();

        for cert in &signed_data.certificates {
            ctx.reject_if_false(true, "cert.is.x509cert", &[]);
            let extensions = ee::extensions(cert);
            let has_ski = extensions.subject_key_identifier.is_some();

            if extensions.is_ee_certificate() {
                ctx.reject_if_false(has_ski, "cert.has.ski", &[]);
                if has_ski {
                    ee_candidates.push((cert.clone(), extensions));
                }
            } else {
                ca_certificates.push(cert.clone());
            }
        }
        ctx.reject_if_false(!ee_candidates.is_empty(), "cert.is.ee.cert", &[]);
        ctx.reject_if_false(ee_candidates.len() == 1, "only.one.ee.cert.allowed", &[]);

        let ee_entry = ee_candidates.into_iter().next();

        // 7. CRL.
        ctx.reject_if_false(signed_data.crls.len() == 1, "only.one.crl.allowed", &[]);
        let crl = signed_data.crls.get(0).cloned();
        ctx.reject_if_false(crl.is_some(), "crl.is.x509crl", &[]);

        // 8. Signer infos.
        ctx.reject_if_false(!signed_data.signer_infos.is_empty(), "get.signer.info", &[]);
        ctx.reject_if_false(
            signed_data.signer_infos.len() == 1,
            "only.one.signer",
            &[],
        );
        let signer_info = signed_data.signer_infos.get(0);

        if let Some(signer_info) = signer_info {
            // 9. Signer version.
            ctx.reject_if_false(
                u32::from(signer_info.version) == 3,
                "cms.signer.info.version",
                &[],
            );

            // 10. Signer SID.
            let sid_ski = signer_info.sid.subject_key_identifier();
            ctx.reject_if_false(sid_ski.is_some(), "cms.signer.info.ski", &[]);

            if let (Some(sid_ski), Some((_, ee_extensions))) = (sid_ski, &ee_entry) {
                ctx.reject_if_false(
                    Some(sid_ski) == ee_extensions.subject_key_identifier.as_deref(),
                    "cms.signer.info.ski.only",
                    &[],
                );
            }

            // 11. Signer digest.
            let signer_digest_ok = DigestAlgorithm::try_from(&signer_info.digest_algorithm)
                .map(|alg| alg == DigestAlgorithm::Sha256)
                .unwrap_or(false);
            ctx.reject_if_false(signer_digest_ok, "cms.signer.info.digest.algorithm", &[]);

            // 12. Signed attributes present.
            let signed_attrs_present = ctx.reject_if_false(
                signer_info.signed_attrs.is_some(),
                "signed.attrs.present",
                &[],
            );

            if signed_attrs_present {
                let signed_attrs = signer_info.signed_attrs.as_ref().unwrap();

                // 13. ContentType attribute.
                let content_type_attr = signed_attrs
                    .iter()
                    .find(|attr| attr.typ == crate::rfc5652::OID_CONTENT_TYPE);
                let content_type_present =
                    ctx.reject_if_false(content_type_attr.is_some(), "content.type.attr.present", &[]);
                if content_type_present {
                    let attr = content_type_attr.unwrap();
                    ctx.reject_if_false(attr.values.len() == 1, "content.type.value.count", &[]);
                    let matches_ct_xml = attr
                        .values
                        .get(0)
                        .and_then(|v| {
                            Constructed::decode(v.as_slice(), Mode::Der, |cons| Oid::take_from(cons)).ok()
                        })
                        .map(|oid| oid == OID_CT_XML)
                        .unwrap_or(false);
                    ctx.reject_if_false(matches_ct_xml, "content.type.value", &[]);
                }

                // 14. MessageDigest attribute.
                let msg_digest_attr = signed_attrs
                    .iter()
                    .find(|attr| attr.typ == crate::rfc5652::OID_MESSAGE_DIGEST);
                let msg_digest_present =
                    ctx.reject_if_false(msg_digest_attr.is_some(), "msg.digest.attr.present", &[]);
                if msg_digest_present {
                    let attr = msg_digest_attr.unwrap();
                    let count_ok = ctx.reject_if_false(
                        attr.values.len() == 1,
                        "msg.digest.value.count",
                        &[],
                    );

                    // RFC 5652 binds the signature to signedAttrs, not to the
                    // eContent directly, so the signature alone cannot detect
                    // a substituted eContent. The messageDigest attribute is
                    // what ties the two together and must be checked
                    // independently of signature verification.
                    if count_ok {
                        let digest_matches = attr
                            .values
                            .get(0)
                            .and_then(|v| {
                                Constructed::decode(v.as_slice(), Mode::Der, |cons| {
                                    OctetString::take_from(cons)
                                })
                                .ok()
                            })
                            .zip(content_bytes.as_ref())
                            .map(|(claimed, content)| {
                                let mut hasher = DigestAlgorithm::Sha256.digester();
                                hasher.update(content.as_ref());
                                hasher.finish().as_ref() == claimed.into_bytes().as_ref()
                            })
                            .unwrap_or(false);
                        ctx.reject_if_false(digest_matches, "msg.digest.value.matches.content", &[]);
                    }
                }

                // 15. SigningTime attribute.
                let signing_time_attr = signed_attrs
                    .iter()
                    .find(|attr| attr.typ == crate::rfc5652::OID_SIGNING_TIME);
                let signing_time_present =
                    ctx.reject_if_false(signing_time_attr.is_some(), "signing.time.attr.present", &[]);
                if signing_time_present {
                    ctx.reject_if_false(
                        signing_time_attr.unwrap().values.len() == 1,
                        "only.one.signing.time.attr",
                        &[],
                    );
                }

                // 16. Encryption algorithm.
                ctx.reject_if_false(
                    signer_info.signature_algorithm.algorithm == OID_RSA_ENCRYPTION,
                    "encryption.algorithm",
                    &[],
                );

                // 17. Signature verification.
                if let Some((ee_cert, _)) = &ee_entry {
                    let verified = verify_signature(ee_cert, signer_info);
                    ctx.reject_if_false(verified, "signature.verification", &[]);
                } else {
                    ctx.reject_if_false(false, "signature.verification", &[]);
                }
            }

            // 18. Unsigned attributes.
            ctx.reject_if_false(signer_info.unsigned_attrs.is_none(), "unsigned.attrs.omitted", &[]);
        }

        ctx.set_location(location.clone());

        if ctx.has_failures() {
            let failures = ctx.failures_for_current_location().into_iter().cloned().collect();
            return Err(ProvisioningCmsObjectParserError { location, failures });
        }

        let (ee_cert, _) = ee_entry.expect("ee certificate presence already validated");
        let ee_der = X509Certificate::from(ee_cert)
            .encode_der()
            .expect("DER re-encoding of parsed certificate");
        let ee_certificate =
            CapturedX509Certificate::from_der(ee_der).expect("re-decoding just-encoded DER");

        let ca_certificates = ca_certificates
            .into_iter()
            .map(|cert| {
                let der = X509Certificate::from(cert)
                    .encode_der()
                    .expect("DER re-encoding of parsed certificate");
                CapturedX509Certificate::from_der(der).expect("re-decoding just-encoded DER")
            })
            .collect();

        let object = ProvisioningCmsObject {
            encoded,
            ee_certificate,
            ca_certificates,
            crl: crl.expect("crl presence already validated"),
            payload: payload.expect("payload presence already validated"),
        };

        Ok((object, ctx.into_result()))
    }
}

fn verify_signature(
    ee_cert: &crate::rfc5280::Certificate,
    signer_info: &crate::rfc5652::SignerInfo,
) -> bool {
    let signed_attrs = match &signer_info.signed_attrs {
        Some(v) => v,
        None => return false,
    };

    let mut signed_attrs_der = Vec::new();
    if signed_attrs
        .encode_ref_as(Tag::SET)
        .write_encoded(Mode::Der, &mut signed_attrs_der)
        .is_err()
    {
        return false;
    }

    let sig_alg = match SignatureAlgorithm::from_oid_and_digest_algorithm(
        &signer_info.signature_algorithm.algorithm,
        DigestAlgorithm::Sha256,
    ) {
        Ok(v) => v,
        Err(_) => return false,
    };

    let verify_alg = match sig_alg.resolve_verification_algorithm(KeyAlgorithm::Rsa) {
        Ok(v) => v,
        Err(_) => return false,
    };

    let public_key_data = ee_cert.tbs_certificate.subject_public_key_info.subject_public_key.octet_bytes();
    let public_key = signature::UnparsedPublicKey::new(verify_alg, public_key_data);

    let signature_bytes = signer_info.signature.clone().into_bytes();

    public_key.verify(&signed_attrs_der, signature_bytes.as_ref()).is_ok()
}

fn abort(
    location: ValidationLocation,
    ctx: ValidationContext,
) -> ProvisioningCmsObjectParserError {
    let failures = ctx.failures_for_current_location().into_iter().cloned().collect();
    ProvisioningCmsObjectParserError { location, failures }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn malformed_der_is_rejected() {
        let err = ProvisioningCmsObjectParser::parse("test", &[0xde, 0xad, 0xbe, 0xef])
            .expect_err("malformed input must fail");
        assert!(err.failures.iter().any(|c| c.key == "cms.data.parsing"));
    }
}
