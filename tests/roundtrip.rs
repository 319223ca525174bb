//! End-to-end scenarios exercising the builder and parser together.

use rpki_provisioning_cms::{
    algorithm::DigestAlgorithm,
    asn1time::Time,
    builder::ProvisioningCmsObjectBuilder,
    certificate::{CapturedX509Certificate, X509Certificate},
    ee,
    parser::ProvisioningCmsObjectParser,
    payload::{self, Payload, RevokeKey, RevokeRole},
    rfc5280::{AlgorithmIdentifier, Certificate, CertificateList},
    rfc5652::{
        Attribute, AttributeValue, CmsVersion, ContentInfo, EncapsulatedContentInfo,
        SignedAttributes, SignedData, SignerIdentifier, SignerInfo, OID_CONTENT_TYPE, OID_CT_XML,
        OID_MESSAGE_DIGEST, OID_SIGNED_DATA, OID_SIGNING_TIME,
    },
    signing::{InMemorySigningKeyPair, Sign},
    testutil,
};

use bcder::{
    encode::{PrimitiveContent, Values},
    Captured, Mode, Oid, OctetString, Tag,
};
use bytes::Bytes;

fn oid(src: bcder::ConstOid) -> Oid {
    Oid(Bytes::copy_from_slice(src.as_ref()))
}

/// A bare-bones reimplementation of [ProvisioningCmsObjectBuilder::build] that
/// signs arbitrary eContent and lets the caller omit the signing-time
/// attribute or inject extra CRLs, so the parser's profile checks can be
/// exercised against inputs the public builder refuses to produce.
struct RawCmsObject {
    content: String,
    signing_time: Option<chrono::DateTime<chrono::Utc>>,
    crls: Vec<CertificateList>,
}

impl RawCmsObject {
    fn sign(
        &self,
        ee_certificate: &CapturedX509Certificate,
        ca_certificate: &CapturedX509Certificate,
        signer: &InMemorySigningKeyPair,
    ) -> Vec<u8> {
        let ee_x509: &X509Certificate = ee_certificate.as_ref();
        let ee_raw: &Certificate = ee_x509.as_ref();
        let ski = ee::extensions(ee_raw).subject_key_identifier.unwrap();

        let mut hasher = DigestAlgorithm::Sha256.digester();
        hasher.update(self.content.as_bytes());
        let message_digest = hasher.finish();

        let mut attrs = vec![
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
        ];

        if let Some(signing_time) = self.signing_time {
            attrs.push(Attribute {
                typ: oid(OID_SIGNING_TIME),
                values: vec![AttributeValue::new(Captured::from_values(
                    Mode::Der,
                    Time::from(signing_time).encode_ref(),
                ))],
            });
        }

        let signed_attrs = SignedAttributes::new(attrs);

        let mut signed_attrs_der = Vec::new();
        signed_attrs
            .encode_ref_as(Tag::SET)
            .write_encoded(Mode::Der, &mut signed_attrs_der)
            .unwrap();

        let signature: Vec<u8> = signature::Signer::try_sign(signer, &signed_attrs_der)
            .unwrap()
            .into();
        let signature_algorithm = signer.signature_algorithm().unwrap();

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
                content: Some(OctetString::new(Bytes::copy_from_slice(
                    self.content.as_bytes(),
                ))),
            },
            certificates: vec![
                Certificate::from(ee_certificate.clone()),
                Certificate::from(ca_certificate.clone()),
            ],
            crls: self.crls.clone(),
            signer_infos: vec![signer_info],
        };

        let content_info = ContentInfo {
            content_type: oid(OID_SIGNED_DATA),
            content: Captured::from_values(Mode::Der, signed_data.encode_ref()),
        };

        let mut out = Vec::new();
        content_info.encode_ref().write_encoded(Mode::Der, &mut out).unwrap();
        out
    }
}

fn list_payload() -> Payload {
    Payload::List {
        sender: "sender".to_string(),
        recipient: "recipient".to_string(),
    }
}

#[test]
fn list_request_round_trips() {
    let builder = ProvisioningCmsObjectBuilder::new(
        list_payload(),
        chrono::Utc::now(),
        testutil::ee_certificate(),
        vec![testutil::ca_certificate()],
        testutil::crl(),
        testutil::ee_signing_key(),
    );

    let der = builder.build().unwrap();

    let (object, result) = ProvisioningCmsObjectParser::parse("list-request", &der).unwrap();
    assert!(!result.has_failures());
    assert_eq!(object.payload(), &list_payload());
}

#[test]
fn revoke_request_matches_canonical_xml_and_round_trips() {
    let payload = Payload::Revoke {
        sender: "sender".to_string(),
        recipient: "recipient".to_string(),
        role: RevokeRole::Request,
        key: RevokeKey {
            class_name: "a classname".to_string(),
            ski: testutil::EE_SKI_BASE64URL.to_string(),
        },
    };

    let xml = payload::emit(&payload).unwrap();
    let expected = format!(
        r#"<key class_name="a classname" ski="{}" />"#,
        testutil::EE_SKI_BASE64URL
    );
    assert!(xml.contains(&expected), "unexpected XML: {xml}");

    let builder = ProvisioningCmsObjectBuilder::new(
        payload.clone(),
        chrono::Utc::now(),
        testutil::ee_certificate(),
        vec![testutil::ca_certificate()],
        testutil::crl(),
        testutil::ee_signing_key(),
    );
    let der = builder.build().unwrap();

    let (object, result) = ProvisioningCmsObjectParser::parse("revoke-request", &der).unwrap();
    assert!(!result.has_failures());
    assert_eq!(object.payload(), &payload);
}

#[test]
fn tampered_signature_is_rejected() {
    let builder = ProvisioningCmsObjectBuilder::new(
        list_payload(),
        chrono::Utc::now(),
        testutil::ee_certificate(),
        vec![testutil::ca_certificate()],
        testutil::crl(),
        testutil::ee_signing_key(),
    );
    let mut der = builder.build().unwrap();
    *der.last_mut().unwrap() ^= 0xff;

    let err = ProvisioningCmsObjectParser::parse("tampered", &der).unwrap_err();
    assert!(err.failures.iter().any(|c| c.key == "signature.verification"));
}

#[test]
fn missing_signing_time_is_rejected() {
    let content = payload::emit(&list_payload()).unwrap();
    let raw = RawCmsObject {
        content,
        signing_time: None,
        crls: vec![testutil::crl()],
    };
    let der = raw.sign(
        &testutil::ee_certificate(),
        &testutil::ca_certificate(),
        &testutil::ee_signing_key(),
    );

    let err = ProvisioningCmsObjectParser::parse("missing-signing-time", &der).unwrap_err();
    assert!(err
        .failures
        .iter()
        .any(|c| c.key == "signing.time.attr.present"));
}

#[test]
fn unknown_payload_type_is_rejected() {
    let content = payload::emit(&list_payload()).unwrap().replace("type=\"list\"", "type=\"bogus\"");
    let raw = RawCmsObject {
        content,
        signing_time: Some(chrono::Utc::now()),
        crls: vec![testutil::crl()],
    };
    let der = raw.sign(
        &testutil::ee_certificate(),
        &testutil::ca_certificate(),
        &testutil::ee_signing_key(),
    );

    let err = ProvisioningCmsObjectParser::parse("unknown-type", &der).unwrap_err();
    assert!(err.failures.iter().any(|c| c.key == "payload.type.unknown"));
}

#[test]
fn two_crls_is_rejected_but_signature_still_checked() {
    let content = payload::emit(&list_payload()).unwrap();
    let raw = RawCmsObject {
        content,
        signing_time: Some(chrono::Utc::now()),
        crls: vec![testutil::crl(), testutil::crl()],
    };
    let der = raw.sign(
        &testutil::ee_certificate(),
        &testutil::ca_certificate(),
        &testutil::ee_signing_key(),
    );

    let err = ProvisioningCmsObjectParser::parse("two-crls", &der).unwrap_err();
    assert!(err.failures.iter().any(|c| c.key == "only.one.crl.allowed"));
    assert!(!err.failures.iter().any(|c| c.key == "signature.verification"));
}
