// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RPKI up-down provisioning protocol objects.
//!
//! This crate parses and builds the CMS-signed payloads exchanged between a
//! parent and child CA in the RPKI provisioning protocol (RFC 6492): list,
//! issue, revoke, and their responses, carried inside an RFC 5652 SignedData
//! object and validated against the provisioning profile.
//!
//! [`parser::ProvisioningCmsObjectParser`] turns a DER-encoded CMS object
//! into a validated [`parser::ProvisioningCmsObject`], recording every check
//! performed along the way in a [`validation::ValidationResult`].
//! [`builder::ProvisioningCmsObjectBuilder`] does the reverse: it signs a
//! [`payload::Payload`] into a wire-ready CMS object.
//!
//! Low-level ASN.1 primitives are defined in modules having the name of the
//! RFC in which they are defined.

pub mod algorithm;
pub mod asn1time;
pub mod builder;
pub mod certificate;
pub mod ee;
pub mod error;
pub mod parser;
pub mod payload;
pub mod rfc3280;
pub mod rfc3447;
pub mod rfc4519;
pub mod rfc5280;
pub mod rfc5480;
pub mod rfc5652;
pub mod rfc5915;
pub mod rfc5958;
pub mod signing;
pub mod ski;
pub mod validation;

/// Test fixtures (a CA/EE certificate pair, a CRL, and matching keys),
/// exposed under the `test` feature so integration tests and downstream
/// crates can reuse them without duplicating key material.
#[cfg(any(test, feature = "test"))]
pub mod testutil;
