// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ASN.1 types defined in RFC 5652.
//!
//! This covers the subset of the Cryptographic Message Syntax needed to
//! represent a `SignedData` object carrying a single signed payload and
//! no counter-signatures: `ContentInfo`, `SignedData`,
//! `EncapsulatedContentInfo`, `SignerInfo` and its identifier choice, and
//! the handful of signed attributes the profile requires.

use {
    crate::rfc5280::{AlgorithmIdentifier, Certificate, CertificateList, CertificateSerialNumber},
    crate::rfc3280::Name,
    crate::asn1time::Time,
    bcder::{
        decode::{Constructed, DecodeError, IntoSource, Source},
        encode::{self, PrimitiveContent, Values},
        Captured, ConstOid, Mode, Oid, OctetString, Tag, Unsigned,
    },
    std::{
        fmt::{Debug, Formatter},
        io::Write,
        ops::{Deref, DerefMut},
    },
};

/// id-signedData (1.2.840.113549.1.7.2)
pub const OID_SIGNED_DATA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 7, 2]);

/// id-contentType (1.2.840.113549.1.9.3)
pub const OID_CONTENT_TYPE: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 3]);

/// id-messageDigest (1.2.840.113549.1.9.4)
pub const OID_MESSAGE_DIGEST: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 4]);

/// id-signingTime (1.2.840.113549.1.9.5)
pub const OID_SIGNING_TIME: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 5]);

/// id-ct-xml (1.2.840.113549.1.9.16.1.28), the up-down provisioning eContentType.
pub const OID_CT_XML: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 16, 1, 28]);

/// id-rsadsi rsaEncryption (1.2.840.113549.1.1.1)
pub const OID_RSA_ENCRYPTION: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 1]);

/// id-sha256 (2.16.840.1.101.3.4.2.1)
pub const OID_SHA256: ConstOid = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 1]);

/// A single attribute.
///
/// ```ASN.1
/// Attribute ::= SEQUENCE {
///   attrType OBJECT IDENTIFIER,
///   attrValues SET OF AttributeValue }
/// ```
#[derive(Clone, Eq, PartialEq)]
pub struct Attribute {
    pub typ: Oid,
    pub values: Vec<AttributeValue>,
}

impl Debug for Attribute {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Attribute");
        s.field("type", &format_args!("{}", self.typ));
        s.field("values", &self.values);
        s.finish()
    }
}

impl Attribute {
    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| {
            let typ = Oid::take_from(cons)?;

            let values = cons.take_set(|cons| {
                let mut values = Vec::new();

                while let Some(value) = AttributeValue::take_opt_from(cons)? {
                    values.push(value);
                }

                Ok(values)
            })?;

            Ok(Self { typ, values })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((self.typ.encode_ref(), encode::set(&self.values)))
    }

    pub fn encode(self) -> impl Values {
        encode::sequence((self.typ.encode(), encode::set(self.values)))
    }
}

#[derive(Clone)]
pub struct AttributeValue(Captured);

impl Debug for AttributeValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "{}",
            hex::encode(self.0.clone().into_bytes().as_ref())
        ))
    }
}

impl AttributeValue {
    /// Construct a new instance from captured data.
    pub fn new(captured: Captured) -> Self {
        Self(captured)
    }

    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        let captured = cons.capture_all()?;

        if captured.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Self(captured)))
        }
    }
}

impl Values for AttributeValue {
    fn encoded_len(&self, mode: Mode) -> usize {
        self.0.encoded_len(mode)
    }

    fn write_encoded<W: Write>(&self, mode: Mode, target: &mut W) -> Result<(), std::io::Error> {
        self.0.write_encoded(mode, target)
    }
}

impl Deref for AttributeValue {
    type Target = Captured;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for AttributeValue {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice() == other.0.as_slice()
    }
}

impl Eq for AttributeValue {}

/// CMS version number.
///
/// ```ASN.1
/// CMSVersion ::= INTEGER { v0(0), v1(1), v2(2), v3(3), v4(4), v5(5) }
/// ```
pub type CmsVersion = Unsigned;

/// Top-level CMS container.
///
/// ```ASN.1
/// ContentInfo ::= SEQUENCE {
///   contentType ContentType,
///   content [0] EXPLICIT ANY DEFINED BY contentType }
/// ```
#[derive(Clone, Debug)]
pub struct ContentInfo {
    pub content_type: Oid,
    pub content: Captured,
}

impl ContentInfo {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let content_type = Oid::take_from(cons)?;
            let content = cons.take_constructed_if(Tag::CTX_0, |cons| cons.capture_all())?;

            Ok(Self {
                content_type,
                content,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.content_type.encode_ref(),
            encode::Constructed::new(Tag::CTX_0, &self.content),
        ))
    }

    /// Parse the embedded content as a [SignedData] object.
    ///
    /// Fails if `content_type` isn't [OID_SIGNED_DATA].
    pub fn into_signed_data(self) -> Result<SignedData, DecodeError<std::convert::Infallible>> {
        let error_source = self.content.clone().into_source();

        if self.content_type != OID_SIGNED_DATA {
            return Err(error_source.content_err("contentType is not id-signedData"));
        }

        Constructed::decode(self.content.into_source(), Mode::Der, |cons| {
            SignedData::take_from(cons)
        })
    }
}

/// A CMS SignedData object.
///
/// ```ASN.1
/// SignedData ::= SEQUENCE {
///   version CMSVersion,
///   digestAlgorithms DigestAlgorithmIdentifiers,
///   encapContentInfo EncapsulatedContentInfo,
///   certificates [0] IMPLICIT CertificateSet OPTIONAL,
///   crls [1] IMPLICIT RevocationInfoChoices OPTIONAL,
///   signerInfos SignerInfos }
/// ```
#[derive(Clone, Debug)]
pub struct SignedData {
    pub version: CmsVersion,
    pub digest_algorithms: Vec<AlgorithmIdentifier>,
    pub content_info: EncapsulatedContentInfo,
    pub certificates: Vec<Certificate>,
    pub crls: Vec<CertificateList>,
    pub signer_infos: Vec<SignerInfo>,
}

impl SignedData {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let version = CmsVersion::take_from(cons)?;

            let digest_algorithms = cons.take_set(|cons| {
                let mut algorithms = Vec::new();

                while let Some(alg) = AlgorithmIdentifier::take_opt_from(cons)? {
                    algorithms.push(alg);
                }

                Ok(algorithms)
            })?;

            let content_info = EncapsulatedContentInfo::take_from(cons)?;

            let certificates = cons
                .take_opt_constructed_if(Tag::CTX_0, |cons| {
                    let mut certs = Vec::new();

                    while let Some(cert) = Certificate::take_opt_from(cons)? {
                        certs.push(cert);
                    }

                    Ok(certs)
                })?
                .unwrap_or_default();

            let crls = cons
                .take_opt_constructed_if(Tag::CTX_1, |cons| {
                    let mut crls = Vec::new();

                    while let Some(crl) =
                        cons.take_opt_sequence(|cons| CertificateList::from_sequence(cons))?
                    {
                        crls.push(crl);
                    }

                    Ok(crls)
                })?
                .unwrap_or_default();

            let signer_infos = cons.take_set(|cons| {
                let mut infos = Vec::new();

                while let Some(info) = SignerInfo::take_opt_from(cons)? {
                    infos.push(info);
                }

                Ok(infos)
            })?;

            Ok(Self {
                version,
                digest_algorithms,
                content_info,
                certificates,
                crls,
                signer_infos,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.version.encode(),
            encode::set(encode::slice(&self.digest_algorithms, |alg| alg.clone())),
            self.content_info.encode_ref(),
            if self.certificates.is_empty() {
                None
            } else {
                Some(encode::Constructed::new(
                    Tag::CTX_0,
                    encode::slice(&self.certificates, |cert| cert.encode_ref()),
                ))
            },
            if self.crls.is_empty() {
                None
            } else {
                Some(encode::Constructed::new(
                    Tag::CTX_1,
                    encode::slice(&self.crls, |crl| crl.encode_ref()),
                ))
            },
            encode::set(encode::slice(&self.signer_infos, |info| info.encode_ref())),
        ))
    }
}

impl Certificate {
    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(Self::from_sequence)
    }
}

/// The content wrapped by a [SignedData] object.
///
/// ```ASN.1
/// EncapsulatedContentInfo ::= SEQUENCE {
///   eContentType ContentType,
///   eContent [0] EXPLICIT OCTET STRING OPTIONAL }
/// ```
#[derive(Clone, Debug)]
pub struct EncapsulatedContentInfo {
    pub content_type: Oid,
    pub content: Option<OctetString>,
}

impl EncapsulatedContentInfo {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let content_type = Oid::take_from(cons)?;
            let content = cons
                .take_opt_constructed_if(Tag::CTX_0, |cons| OctetString::take_from(cons))?;

            Ok(Self {
                content_type,
                content,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.content_type.encode_ref(),
            self.content
                .as_ref()
                .map(|c| encode::Constructed::new(Tag::CTX_0, c.encode_ref())),
        ))
    }
}

/// Identifies the signer's certificate, by subject key identifier.
///
/// The up-down provisioning profile mandates the `subjectKeyIdentifier`
/// form; `issuerAndSerialNumber` is still decoded so malformed input can be
/// rejected with a specific error rather than a generic parse failure.
///
/// ```ASN.1
/// SignerIdentifier ::= CHOICE {
///   issuerAndSerialNumber IssuerAndSerialNumber,
///   subjectKeyIdentifier [0] SubjectKeyIdentifier }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SignerIdentifier {
    IssuerAndSerialNumber(IssuerAndSerialNumber),
    SubjectKeyIdentifier(OctetString),
}

impl SignerIdentifier {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        if let Some(ski) =
            cons.take_opt_constructed_if(Tag::CTX_0, |cons| OctetString::take_from(cons))?
        {
            Ok(Self::SubjectKeyIdentifier(ski))
        } else {
            Ok(Self::IssuerAndSerialNumber(IssuerAndSerialNumber::take_from(
                cons,
            )?))
        }
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        match self {
            Self::IssuerAndSerialNumber(v) => (Some(v.encode_ref()), None),
            Self::SubjectKeyIdentifier(v) => {
                (None, Some(v.encode_ref_as(Tag::CTX_0)))
            }
        }
    }

    /// The subject key identifier bytes, if this is that variant.
    pub fn subject_key_identifier(&self) -> Option<&[u8]> {
        match self {
            Self::SubjectKeyIdentifier(v) => v.as_slice(),
            Self::IssuerAndSerialNumber(_) => None,
        }
    }
}

/// ```ASN.1
/// IssuerAndSerialNumber ::= SEQUENCE {
///   issuer Name,
///   serialNumber CertificateSerialNumber }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IssuerAndSerialNumber {
    pub issuer: Name,
    pub serial_number: CertificateSerialNumber,
}

impl IssuerAndSerialNumber {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let issuer = Name::take_from(cons)?;
            let serial_number = CertificateSerialNumber::take_from(cons)?;

            Ok(Self {
                issuer,
                serial_number,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((self.issuer.encode_ref(), self.serial_number.encode()))
    }
}

/// Signed attributes, re-taggable between their wire form (`[0] IMPLICIT`)
/// and the `SET OF` encoding used as the input to signature computation
/// (RFC 5652 §5.4).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SignedAttributes(Vec<Attribute>);

impl Deref for SignedAttributes {
    type Target = Vec<Attribute>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl SignedAttributes {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        Self(attributes)
    }

    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        let mut attributes = Vec::new();

        while let Some(attribute) = Attribute::take_opt_from(cons)? {
            attributes.push(attribute);
        }

        Ok(Self(attributes))
    }

    pub fn encode_ref_as(&self, tag: Tag) -> impl Values + '_ {
        encode::set_as(tag, encode::slice(&self.0, |attr| attr.clone().encode()))
    }

    /// Find the single value of an attribute with the given OID.
    ///
    /// Returns `None` if the attribute is absent; does not distinguish
    /// between "absent" and "present with zero or multiple values" beyond
    /// what the caller inspects on the returned slice.
    pub fn find(&self, oid: &Oid) -> Option<&Attribute> {
        self.0.iter().find(|attr| &attr.typ == oid)
    }
}

/// A single signature over the encapsulated content.
///
/// ```ASN.1
/// SignerInfo ::= SEQUENCE {
///   version CMSVersion,
///   sid SignerIdentifier,
///   digestAlgorithm DigestAlgorithmIdentifier,
///   signedAttrs [0] IMPLICIT SignedAttributes OPTIONAL,
///   signatureAlgorithm SignatureAlgorithmIdentifier,
///   signature SignatureValue,
///   unsignedAttrs [1] IMPLICIT UnsignedAttributes OPTIONAL }
/// ```
#[derive(Clone, Debug)]
pub struct SignerInfo {
    pub version: CmsVersion,
    pub sid: SignerIdentifier,
    pub digest_algorithm: AlgorithmIdentifier,
    pub signed_attrs: Option<SignedAttributes>,
    pub signature_algorithm: AlgorithmIdentifier,
    pub signature: OctetString,
    pub unsigned_attrs: Option<SignedAttributes>,
}

impl SignerInfo {
    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| {
            let version = CmsVersion::take_from(cons)?;
            let sid = SignerIdentifier::take_from(cons)?;
            let digest_algorithm = AlgorithmIdentifier::take_from(cons)?;
            let signed_attrs = cons
                .take_opt_constructed_if(Tag::CTX_0, |cons| SignedAttributes::take_from(cons))?;
            let signature_algorithm = AlgorithmIdentifier::take_from(cons)?;
            let signature = OctetString::take_from(cons)?;
            let unsigned_attrs = cons
                .take_opt_constructed_if(Tag::CTX_1, |cons| SignedAttributes::take_from(cons))?;

            Ok(Self {
                version,
                sid,
                digest_algorithm,
                signed_attrs,
                signature_algorithm,
                signature,
                unsigned_attrs,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.version.encode(),
            self.sid.encode_ref(),
            &self.digest_algorithm,
            self.signed_attrs
                .as_ref()
                .map(|attrs| attrs.encode_ref_as(Tag::CTX_0)),
            &self.signature_algorithm,
            self.signature.encode_ref(),
            self.unsigned_attrs
                .as_ref()
                .map(|attrs| attrs.encode_ref_as(Tag::CTX_1)),
        ))
    }
}
