// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bidirectional mapping between the seven up-down payload variants and
//! their canonical XML representation under the
//! `http://www.apnic.net/specs/rescerts/up-down/` namespace.

use {
    crate::validation::ValidationContext,
    std::io::Cursor,
    xml::{
        reader::XmlEvent as ReaderEvent,
        writer::{EmitterConfig, XmlEvent as WriterEvent},
        EventReader, EventWriter,
    },
};

/// The up-down namespace every element and attribute must belong to.
pub const NAMESPACE: &str = "http://www.apnic.net/specs/rescerts/up-down/";

/// A copy of the up-down RELAX NG schema, carried for reference. Structural
/// checks in this module approximate it; this crate does not embed a general
/// RELAX NG validation engine.
pub const RELAX_NG_SCHEMA: &str = include_str!("up-down-schema.rnc");

/// The closed set of wire `type` attribute values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PayloadMessageType {
    List,
    ListResponse,
    Issue,
    IssueResponse,
    Revoke,
    RevokeResponse,
    ErrorResponse,
}

impl PayloadMessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::ListResponse => "list_response",
            Self::Issue => "issue",
            Self::IssueResponse => "issue_response",
            Self::Revoke => "revoke",
            Self::RevokeResponse => "revoke_response",
            Self::ErrorResponse => "error_response",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "list" => Self::List,
            "list_response" => Self::ListResponse,
            "issue" => Self::Issue,
            "issue_response" => Self::IssueResponse,
            "revoke" => Self::Revoke,
            "revoke_response" => Self::RevokeResponse,
            "error_response" => Self::ErrorResponse,
            _ => return None,
        })
    }
}

/// Whether a revoke payload is the child's request or the parent's response.
///
/// The wire XML for `revoke` and `revoke_response` is identical apart from
/// the `type` attribute; this field carries the direction the attribute
/// already encodes rather than splitting `Payload` into two constructors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RevokeRole {
    Request,
    Response,
}

/// A single issued certificate embedded in a resource class.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IssuedCertificate {
    pub cert_url: String,
    pub req_resource_set_as: Option<String>,
    pub req_resource_set_ipv4: Option<String>,
    pub req_resource_set_ipv6: Option<String>,
    /// DER-encoded certificate.
    pub cert: Vec<u8>,
}

/// A resource class offered by the parent, carried in `list_response` and `issue_response`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceClass {
    pub class_name: String,
    /// One or more comma-separated URIs.
    pub cert_url: String,
    pub resource_set_as: Option<String>,
    pub resource_set_ipv4: Option<String>,
    pub resource_set_ipv6: Option<String>,
    pub resource_set_notafter: String,
    pub suggested_sia_head: Option<String>,
    pub certificates: Vec<IssuedCertificate>,
}

/// The body of an `issue` request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IssueRequest {
    pub class_name: String,
    pub resource_set_as: Option<String>,
    pub resource_set_ipv4: Option<String>,
    pub resource_set_ipv6: Option<String>,
    /// DER-encoded PKCS#10 `CertificationRequest`.
    pub pkcs10: Vec<u8>,
}

/// The body of `revoke`/`revoke_response`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RevokeKey {
    pub class_name: String,
    /// URL-safe, unpadded Base64 SHA-1 of the DER `SubjectPublicKeyInfo`.
    pub ski: String,
}

/// RFC 6492 error codes, 1101 through 1204.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorStatus {
    AlreadyProcessing,
    VersionNumberError,
    UnrecognizedRequestType,
    BadlyFormedCertificateRequest,
    UnrecognizedClass,
    NoResourcesAllottedInClass,
    ResourceNotInClass,
    RequestCannotBeCompleted,
    PermanentError,
    BySubjectKeyIdentifierNotFound,
    RevocationRequestNotFound,
    NoReplayNonceMatch,
    /// An unrecognized but syntactically valid code, preserved verbatim.
    Other(u16),
}

impl From<u16> for ErrorStatus {
    fn from(code: u16) -> Self {
        match code {
            1101 => Self::AlreadyProcessing,
            1102 => Self::VersionNumberError,
            1103 => Self::UnrecognizedRequestType,
            1104 => Self::BadlyFormedCertificateRequest,
            1105 => Self::UnrecognizedClass,
            1106 => Self::NoResourcesAllottedInClass,
            1107 => Self::ResourceNotInClass,
            1108 => Self::RequestCannotBeCompleted,
            1201 => Self::PermanentError,
            1202 => Self::BySubjectKeyIdentifierNotFound,
            1203 => Self::RevocationRequestNotFound,
            1204 => Self::NoReplayNonceMatch,
            other => Self::Other(other),
        }
    }
}

impl From<ErrorStatus> for u16 {
    fn from(status: ErrorStatus) -> Self {
        match status {
            ErrorStatus::AlreadyProcessing => 1101,
            ErrorStatus::VersionNumberError => 1102,
            ErrorStatus::UnrecognizedRequestType => 1103,
            ErrorStatus::BadlyFormedCertificateRequest => 1104,
            ErrorStatus::UnrecognizedClass => 1105,
            ErrorStatus::NoResourcesAllottedInClass => 1106,
            ErrorStatus::ResourceNotInClass => 1107,
            ErrorStatus::RequestCannotBeCompleted => 1108,
            ErrorStatus::PermanentError => 1201,
            ErrorStatus::BySubjectKeyIdentifierNotFound => 1202,
            ErrorStatus::RevocationRequestNotFound => 1203,
            ErrorStatus::NoReplayNonceMatch => 1204,
            ErrorStatus::Other(code) => code,
        }
    }
}

/// A free-form error description, optionally tagged with a language.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalizedDescription {
    pub lang: Option<String>,
    pub text: String,
}

/// The seven up-down payload variants, each carrying the common `sender`/`recipient` header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Payload {
    List {
        sender: String,
        recipient: String,
    },
    ListResponse {
        sender: String,
        recipient: String,
        resource_class: ResourceClass,
    },
    Issue {
        sender: String,
        recipient: String,
        request: IssueRequest,
    },
    IssueResponse {
        sender: String,
        recipient: String,
        resource_class: ResourceClass,
    },
    Revoke {
        sender: String,
        recipient: String,
        role: RevokeRole,
        key: RevokeKey,
    },
    ErrorResponse {
        sender: String,
        recipient: String,
        status: ErrorStatus,
        description: Option<LocalizedDescription>,
    },
}

impl Payload {
    pub fn sender(&self) -> &str {
        match self {
            Self::List { sender, .. }
            | Self::ListResponse { sender, .. }
            | Self::Issue { sender, .. }
            | Self::IssueResponse { sender, .. }
            | Self::Revoke { sender, .. }
            | Self::ErrorResponse { sender, .. } => sender,
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            Self::List { recipient, .. }
            | Self::ListResponse { recipient, .. }
            | Self::Issue { recipient, .. }
            | Self::IssueResponse { recipient, .. }
            | Self::Revoke { recipient, .. }
            | Self::ErrorResponse { recipient, .. } => recipient,
        }
    }

    pub fn message_type(&self) -> PayloadMessageType {
        match self {
            Self::List { .. } => PayloadMessageType::List,
            Self::ListResponse { .. } => PayloadMessageType::ListResponse,
            Self::Issue { .. } => PayloadMessageType::Issue,
            Self::IssueResponse { .. } => PayloadMessageType::IssueResponse,
            Self::Revoke { role, .. } => match role {
                RevokeRole::Request => PayloadMessageType::Revoke,
                RevokeRole::Response => PayloadMessageType::RevokeResponse,
            },
            Self::ErrorResponse { .. } => PayloadMessageType::ErrorResponse,
        }
    }
}

/// Comma-join a resource set, rejecting internal whitespace and sorting lexicographically.
fn canonical_resource_set(raw: &str) -> String {
    let mut parts: Vec<&str> = raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    parts.sort_unstable();
    parts.join(",")
}

/// Serialize a payload to its canonical wire XML.
///
/// Root attributes appear in alphabetical order (`recipient`, `sender`,
/// `type`, `version`); resource sets are emitted sorted and comma-separated;
/// binary bodies are standard Base64 without line wrapping. Indentation is
/// written by hand (three spaces per level) rather than left to the
/// emitter's automatic indenter, which would otherwise insert whitespace
/// around text-bearing leaf elements like `<status>` and `<certificate>`.
pub fn emit(payload: &Payload) -> Result<String, crate::error::Error> {
    let mut buffer = Vec::new();
    {
        let config = EmitterConfig::new()
            .perform_indent(false)
            .write_document_declaration(true);
        let mut writer = EventWriter::new_with_config(Cursor::new(&mut buffer), config);

        let message_type = payload.message_type();

        writer
            .write(
                WriterEvent::start_element("message")
                    .default_ns(NAMESPACE)
                    .attr("recipient", payload.recipient())
                    .attr("sender", payload.sender())
                    .attr("type", message_type.as_str())
                    .attr("version", "1"),
            )
            .map_err(|e| crate::error::Error::XmlWrite(e.to_string()))?;

        write_body(&mut writer, payload).map_err(|e| crate::error::Error::XmlWrite(e.to_string()))?;

        writer
            .write(WriterEvent::end_element())
            .map_err(|e| crate::error::Error::XmlWrite(e.to_string()))?;
    }

    let mut xml = String::from_utf8(buffer)
        .map_err(|e| crate::error::Error::XmlWrite(format!("non-UTF-8 output: {}", e)))?;
    if !xml.ends_with('\n') {
        xml.push('\n');
    }
    Ok(xml)
}

fn newline_indent<W: std::io::Write>(
    writer: &mut EventWriter<W>,
    depth: usize,
) -> Result<(), xml::writer::Error> {
    let mut text = String::with_capacity(1 + depth * 3);
    text.push('\n');
    for _ in 0..depth {
        text.push_str("   ");
    }
    writer.write(WriterEvent::characters(&text))
}

fn write_body<W: std::io::Write>(
    writer: &mut EventWriter<W>,
    payload: &Payload,
) -> Result<(), xml::writer::Error> {
    match payload {
        Payload::List { .. } => Ok(()),
        Payload::ListResponse { resource_class, .. }
        | Payload::IssueResponse { resource_class, .. } => {
            newline_indent(writer, 1)?;
            write_resource_class(writer, resource_class)?;
            newline_indent(writer, 0)
        }
        Payload::Issue { request, .. } => {
            newline_indent(writer, 1)?;
            write_issue_request(writer, request)?;
            newline_indent(writer, 0)
        }
        Payload::Revoke { key, .. } => {
            newline_indent(writer, 1)?;
            write_revoke_key(writer, key)?;
            newline_indent(writer, 0)
        }
        Payload::ErrorResponse {
            status, description, ..
        } => {
            newline_indent(writer, 1)?;
            write_error_response(writer, *status, description.as_ref())?;
            newline_indent(writer, 0)
        }
    }
}

fn write_resource_class<W: std::io::Write>(
    writer: &mut EventWriter<W>,
    class: &ResourceClass,
) -> Result<(), xml::writer::Error> {
    let mut start = WriterEvent::start_element("class")
        .attr("class_name", class.class_name.as_str())
        .attr("cert_url", class.cert_url.as_str());
    if let Some(v) = &class.resource_set_as {
        start = start.attr("resource_set_as", v);
    }
    if let Some(v) = &class.resource_set_ipv4 {
        start = start.attr("resource_set_ipv4", v);
    }
    if let Some(v) = &class.resource_set_ipv6 {
        start = start.attr("resource_set_ipv6", v);
    }
    start = start.attr("resource_set_notafter", class.resource_set_notafter.as_str());
    if let Some(sia) = &class.suggested_sia_head {
        start = start.attr("suggested_sia_head", sia);
    }

    if class.certificates.is_empty() {
        return writer.write(start);
    }

    writer.write(start)?;
    for cert in &class.certificates {
        newline_indent(writer, 2)?;

        let mut start =
            WriterEvent::start_element("certificate").attr("cert_url", cert.cert_url.as_str());
        if let Some(v) = &cert.req_resource_set_as {
            start = start.attr("req_resource_set_as", v);
        }
        if let Some(v) = &cert.req_resource_set_ipv4 {
            start = start.attr("req_resource_set_ipv4", v);
        }
        if let Some(v) = &cert.req_resource_set_ipv6 {
            start = start.attr("req_resource_set_ipv6", v);
        }
        writer.write(start)?;
        writer.write(WriterEvent::characters(&base64::encode(&cert.cert)))?;
        writer.write(WriterEvent::end_element())?;
    }
    newline_indent(writer, 1)?;

    writer.write(WriterEvent::end_element())
}

fn write_issue_request<W: std::io::Write>(
    writer: &mut EventWriter<W>,
    request: &IssueRequest,
) -> Result<(), xml::writer::Error> {
    let mut start =
        WriterEvent::start_element("request").attr("class_name", request.class_name.as_str());
    if let Some(v) = &request.resource_set_as {
        start = start.attr("resource_set_as", v);
    }
    if let Some(v) = &request.resource_set_ipv4 {
        start = start.attr("resource_set_ipv4", v);
    }
    if let Some(v) = &request.resource_set_ipv6 {
        start = start.attr("resource_set_ipv6", v);
    }
    writer.write(start)?;
    writer.write(WriterEvent::characters(&base64::encode(&request.pkcs10)))?;
    writer.write(WriterEvent::end_element())
}

fn write_revoke_key<W: std::io::Write>(
    writer: &mut EventWriter<W>,
    key: &RevokeKey,
) -> Result<(), xml::writer::Error> {
    writer.write(
        WriterEvent::start_element("key")
            .attr("class_name", key.class_name.as_str())
            .attr("ski", key.ski.as_str()),
    )?;
    writer.write(WriterEvent::end_element())
}

fn write_error_response<W: std::io::Write>(
    writer: &mut EventWriter<W>,
    status: ErrorStatus,
    description: Option<&LocalizedDescription>,
) -> Result<(), xml::writer::Error> {
    let code: u16 = status.into();
    writer.write(WriterEvent::start_element("status"))?;
    writer.write(WriterEvent::characters(&code.to_string()))?;
    writer.write(WriterEvent::end_element())?;

    if let Some(description) = description {
        newline_indent(writer, 1)?;

        let mut start = WriterEvent::start_element("description");
        if let Some(lang) = &description.lang {
            start = start.attr("xml:lang", lang);
        }
        writer.write(start)?;
        writer.write(WriterEvent::characters(&description.text))?;
        writer.write(WriterEvent::end_element())?;
    }

    Ok(())
}

/// Parse a wire XML document into a [`Payload`], recording every conformance
/// deviation against `ctx` instead of panicking. Returns `None` if the
/// document is too malformed to recover a payload at all.
pub fn parse(xml: &str, ctx: &mut ValidationContext) -> Option<Payload> {
    let parser = EventReader::new(Cursor::new(xml.as_bytes()));

    let mut sender = None;
    let mut recipient = None;
    let mut message_type = None;
    let mut version_ok = false;

    // Current child element under construction, keyed by local name.
    let mut class: Option<ResourceClass> = None;
    let mut current_certificate: Option<IssuedCertificate> = None;
    let mut request: Option<IssueRequest> = None;
    let mut key: Option<RevokeKey> = None;
    let mut status: Option<u16> = None;
    let mut description: Option<LocalizedDescription> = None;
    let mut text_buffer = String::new();
    let mut seen_root = false;

    for event in parser {
        let event = match event {
            Ok(e) => e,
            Err(e) => {
                ctx.reject_if_false(false, "cms.content.parsing", &[&e.to_string()]);
                return None;
            }
        };

        match event {
            ReaderEvent::StartElement {
                name, attributes, ..
            } => {
                if name.local_name == "message" {
                    seen_root = true;
                    if name.namespace.as_deref() != Some(NAMESPACE) {
                        ctx.reject_if_false(false, "payload.namespace.unknown", &[]);
                    }
                    for attr in &attributes {
                        match attr.name.local_name.as_str() {
                            "sender" => sender = Some(attr.value.clone()),
                            "recipient" => recipient = Some(attr.value.clone()),
                            "version" => version_ok = attr.value == "1",
                            "type" => message_type = PayloadMessageType::from_str(&attr.value),
                            _ => {}
                        }
                    }
                } else {
                    text_buffer.clear();
                    match name.local_name.as_str() {
                        "class" => {
                            class = Some(parse_resource_class_start(&attributes));
                        }
                        "certificate" => {
                            current_certificate = Some(parse_certificate_start(&attributes));
                        }
                        "request" => {
                            request = Some(parse_request_start(&attributes));
                        }
                        "key" => {
                            key = Some(parse_key(&attributes));
                        }
                        "description" => {
                            let lang = attributes
                                .iter()
                                .find(|a| a.name.local_name == "lang")
                                .map(|a| a.value.clone());
                            description = Some(LocalizedDescription {
                                lang,
                                text: String::new(),
                            });
                        }
                        _ => {}
                    }
                }
            }
            ReaderEvent::Characters(text) => {
                text_buffer.push_str(&text);
            }
            ReaderEvent::EndElement { name } => match name.local_name.as_str() {
                "certificate" => {
                    if let Some(mut cert) = current_certificate.take() {
                        match base64::decode(text_buffer.trim()) {
                            Ok(der) => {
                                cert.cert = der;
                                if let Some(class) = class.as_mut() {
                                    class.certificates.push(cert);
                                }
                            }
                            Err(e) => {
                                ctx.reject_if_false(false, "payload.base64.malformed", &[&e.to_string()]);
                            }
                        }
                    }
                }
                "request" => {
                    if let Some(mut r) = request.take() {
                        match base64::decode(text_buffer.trim()) {
                            Ok(der) => {
                                r.pkcs10 = der;
                                request = Some(r);
                            }
                            Err(e) => {
                                ctx.reject_if_false(false, "payload.base64.malformed", &[&e.to_string()]);
                            }
                        }
                    }
                }
                "status" => {
                    status = text_buffer.trim().parse::<u16>().ok();
                }
                "description" => {
                    if let Some(d) = description.as_mut() {
                        d.text = text_buffer.trim().to_string();
                    }
                }
                _ => {}
            },
            ReaderEvent::EndDocument => break,
            _ => {}
        }
    }

    if !ctx.reject_if_false(seen_root, "cms.content.parsing", &[]) {
        return None;
    }
    ctx.reject_if_false(version_ok, "payload.version", &[]);
    let message_type = ctx.reject_if_none(message_type, "payload.type.unknown")?;
    let sender = ctx.reject_if_none(sender, "payload.sender.missing")?;
    let recipient = ctx.reject_if_none(recipient, "payload.recipient.missing")?;

    Some(match message_type {
        PayloadMessageType::List => Payload::List { sender, recipient },
        PayloadMessageType::ListResponse => Payload::ListResponse {
            sender,
            recipient,
            resource_class: class?,
        },
        PayloadMessageType::IssueResponse => Payload::IssueResponse {
            sender,
            recipient,
            resource_class: class?,
        },
        PayloadMessageType::Issue => Payload::Issue {
            sender,
            recipient,
            request: request?,
        },
        PayloadMessageType::Revoke => Payload::Revoke {
            sender,
            recipient,
            role: RevokeRole::Request,
            key: key?,
        },
        PayloadMessageType::RevokeResponse => Payload::Revoke {
            sender,
            recipient,
            role: RevokeRole::Response,
            key: key?,
        },
        PayloadMessageType::ErrorResponse => Payload::ErrorResponse {
            sender,
            recipient,
            status: ErrorStatus::from(status?),
            description,
        },
    })
}

fn attr<'a>(attributes: &'a [xml::attribute::OwnedAttribute], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|a| a.name.local_name == name)
        .map(|a| a.value.as_str())
}

fn parse_resource_class_start(attributes: &[xml::attribute::OwnedAttribute]) -> ResourceClass {
    ResourceClass {
        class_name: attr(attributes, "class_name").unwrap_or_default().to_string(),
        cert_url: attr(attributes, "cert_url").unwrap_or_default().to_string(),
        resource_set_as: attr(attributes, "resource_set_as").map(canonical_resource_set),
        resource_set_ipv4: attr(attributes, "resource_set_ipv4").map(canonical_resource_set),
        resource_set_ipv6: attr(attributes, "resource_set_ipv6").map(canonical_resource_set),
        resource_set_notafter: attr(attributes, "resource_set_notafter")
            .unwrap_or_default()
            .to_string(),
        suggested_sia_head: attr(attributes, "suggested_sia_head").map(str::to_string),
        certificates: Vec::new(),
    }
}

fn parse_certificate_start(attributes: &[xml::attribute::OwnedAttribute]) -> IssuedCertificate {
    IssuedCertificate {
        cert_url: attr(attributes, "cert_url").unwrap_or_default().to_string(),
        req_resource_set_as: attr(attributes, "req_resource_set_as").map(canonical_resource_set),
        req_resource_set_ipv4: attr(attributes, "req_resource_set_ipv4").map(canonical_resource_set),
        req_resource_set_ipv6: attr(attributes, "req_resource_set_ipv6").map(canonical_resource_set),
        cert: Vec::new(),
    }
}

fn parse_request_start(attributes: &[xml::attribute::OwnedAttribute]) -> IssueRequest {
    IssueRequest {
        class_name: attr(attributes, "class_name").unwrap_or_default().to_string(),
        resource_set_as: attr(attributes, "resource_set_as").map(canonical_resource_set),
        resource_set_ipv4: attr(attributes, "resource_set_ipv4").map(canonical_resource_set),
        resource_set_ipv6: attr(attributes, "resource_set_ipv6").map(canonical_resource_set),
        pkcs10: Vec::new(),
    }
}

fn parse_key(attributes: &[xml::attribute::OwnedAttribute]) -> RevokeKey {
    RevokeKey {
        class_name: attr(attributes, "class_name").unwrap_or_default().to_string(),
        ski: attr(attributes, "ski").unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn list_request_round_trips() {
        let payload = Payload::List {
            sender: "sender".to_string(),
            recipient: "recipient".to_string(),
        };
        let xml = emit(&payload).unwrap();
        assert!(xml.contains(r#"type="list""#));

        let mut ctx = ValidationContext::new();
        ctx.set_location("test");
        let parsed = parse(&xml, &mut ctx).unwrap();
        assert_eq!(parsed, payload);
        assert!(!ctx.has_failures());
    }

    #[test]
    fn revoke_payload_emits_expected_attributes() {
        let payload = Payload::Revoke {
            sender: "sender".to_string(),
            recipient: "recipient".to_string(),
            role: RevokeRole::Request,
            key: RevokeKey {
                class_name: "a classname".to_string(),
                ski: "abc123".to_string(),
            },
        };
        let xml = emit(&payload).unwrap();
        assert!(xml.contains(r#"<key class_name="a classname" ski="abc123" />"#));
    }

    #[test]
    fn unknown_type_is_reported() {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<message xmlns="{}" recipient="r" sender="s" type="bogus" version="1" />"#,
            NAMESPACE
        );
        let mut ctx = ValidationContext::new();
        ctx.set_location("test");
        assert!(parse(&xml, &mut ctx).is_none());
        assert!(ctx
            .failures_for_current_location()
            .iter()
            .any(|c| c.key == "payload.type.unknown"));
    }

    #[test]
    fn resource_sets_are_sorted_and_deduped_whitespace() {
        let raw = " 10.0.0.0/8, 192.168.0.0/16 ,1.0.0.0/8";
        assert_eq!(canonical_resource_set(raw), "1.0.0.0/8,10.0.0.0/8,192.168.0.0/16");
    }
}
