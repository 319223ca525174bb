// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Accumulating validation of RFC-profile conformance checks.
//!
//! Parsing a CMS object runs dozens of individual conformance checks. Rather
//! than aborting on the first failure, every check is recorded against a
//! [`ValidationContext`] and parsing continues, so a caller sees *every*
//! defect in a malformed object in a single pass.

use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
};

/// An opaque label identifying the object under validation.
///
/// Typically a URI or filename; carried solely for diagnostics.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ValidationLocation(String);

impl Display for ValidationLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ValidationLocation {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ValidationLocation {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The outcome of a single validation check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Pass,
    Warn,
    Fail,
}

/// A single recorded check: a stable key, its outcome, and diagnostic parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationCheck {
    pub key: &'static str,
    pub status: Status,
    pub params: Vec<String>,
}

impl ValidationCheck {
    pub fn is_failure(&self) -> bool {
        self.status == Status::Fail
    }
}

/// The final, immutable record of every check performed across every location.
#[derive(Clone, Debug, Default)]
pub struct ValidationResult {
    locations: Vec<(ValidationLocation, Vec<ValidationCheck>)>,
    index: HashMap<ValidationLocation, usize>,
}

impl ValidationResult {
    fn entry_mut(&mut self, location: &ValidationLocation) -> &mut Vec<ValidationCheck> {
        if let Some(&i) = self.index.get(location) {
            &mut self.locations[i].1
        } else {
            self.index.insert(location.clone(), self.locations.len());
            self.locations.push((location.clone(), Vec::new()));
            &mut self.locations.last_mut().unwrap().1
        }
    }

    pub fn checks_at(&self, location: &ValidationLocation) -> &[ValidationCheck] {
        self.index
            .get(location)
            .map(|&i| self.locations[i].1.as_slice())
            .unwrap_or(&[])
    }

    pub fn locations(&self) -> impl Iterator<Item = &ValidationLocation> {
        self.locations.iter().map(|(loc, _)| loc)
    }

    pub fn has_failures(&self) -> bool {
        self.locations
            .iter()
            .any(|(_, checks)| checks.iter().any(ValidationCheck::is_failure))
    }

    pub fn failures(&self) -> Vec<&ValidationCheck> {
        self.locations
            .iter()
            .flat_map(|(_, checks)| checks.iter())
            .filter(|c| c.is_failure())
            .collect()
    }
}

/// The mutable accumulator threaded through a single parse.
///
/// Every conformance check in the CMS parser and XML payload codec is routed
/// through this type instead of returning early or panicking.
#[derive(Debug, Default)]
pub struct ValidationContext {
    current: Option<ValidationLocation>,
    result: ValidationResult,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new current location; subsequent checks attach to it.
    pub fn set_location(&mut self, loc: impl Into<ValidationLocation>) {
        self.current = Some(loc.into());
    }

    fn record(&mut self, key: &'static str, status: Status, params: Vec<String>) {
        let location = self
            .current
            .clone()
            .expect("set_location must be called before recording a check");

        self.result
            .entry_mut(&location)
            .push(ValidationCheck { key, status, params });
    }

    /// Record pass when `cond`, fail otherwise. Returns `cond` so callers can
    /// gate follow-on checks without early-returning.
    pub fn reject_if_false(&mut self, cond: bool, key: &'static str, params: &[&str]) -> bool {
        let status = if cond { Status::Pass } else { Status::Fail };
        self.record(key, status, params.iter().map(|s| s.to_string()).collect());
        cond
    }

    /// As [`Self::reject_if_false`], but treats a `Result::Err` as failure and
    /// returns the success value, if any.
    pub fn reject_if_some_err<T, E: std::fmt::Display>(
        &mut self,
        res: Result<T, E>,
        key: &'static str,
    ) -> Option<T> {
        match res {
            Ok(v) => {
                self.record(key, Status::Pass, Vec::new());
                Some(v)
            }
            Err(e) => {
                self.record(key, Status::Fail, vec![e.to_string()]);
                None
            }
        }
    }

    /// As [`Self::reject_if_false`], but treats `None` as failure and returns
    /// the value, if present.
    pub fn reject_if_none<T>(&mut self, value: Option<T>, key: &'static str) -> Option<T> {
        let passed = value.is_some();
        self.record(key, if passed { Status::Pass } else { Status::Fail }, Vec::new());
        value
    }

    /// Record warn on failure, never fail.
    pub fn warn_if_false(&mut self, cond: bool, key: &'static str, params: &[&str]) {
        let status = if cond { Status::Pass } else { Status::Warn };
        self.record(key, status, params.iter().map(|s| s.to_string()).collect());
    }

    pub fn has_failures(&self) -> bool {
        self.result.has_failures()
    }

    pub fn has_failure_for_current_location(&self) -> bool {
        match &self.current {
            Some(loc) => self
                .result
                .checks_at(loc)
                .iter()
                .any(ValidationCheck::is_failure),
            None => false,
        }
    }

    pub fn failures_for_current_location(&self) -> Vec<&ValidationCheck> {
        match &self.current {
            Some(loc) => self
                .result
                .checks_at(loc)
                .iter()
                .filter(|c| c.is_failure())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn into_result(self) -> ValidationResult {
        self.result
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accumulates_in_order() {
        let mut ctx = ValidationContext::new();
        ctx.set_location("obj-1");
        ctx.reject_if_false(true, "a.check", &[]);
        ctx.reject_if_false(false, "b.check", &["detail"]);
        ctx.warn_if_false(false, "c.check", &[]);

        assert!(ctx.has_failures());
        assert!(ctx.has_failure_for_current_location());

        let failures = ctx.failures_for_current_location();
        assert_eq!(failures.len(), 3);
        assert_eq!(failures[1].key, "b.check");
        assert_eq!(failures[1].status, Status::Fail);
        assert_eq!(failures[2].status, Status::Warn);
    }

    #[test]
    fn separate_locations_are_independent() {
        let mut ctx = ValidationContext::new();
        ctx.set_location("obj-1");
        ctx.reject_if_false(false, "a.check", &[]);

        ctx.set_location("obj-2");
        ctx.reject_if_false(true, "a.check", &[]);
        assert!(!ctx.has_failure_for_current_location());

        assert!(ctx.has_failures());
    }

    #[test]
    fn reject_if_none_reports_value() {
        let mut ctx = ValidationContext::new();
        ctx.set_location("loc");
        assert_eq!(ctx.reject_if_none(Some(5), "k"), Some(5));
        assert_eq!(ctx.reject_if_none(None::<i32>, "k2"), None);
        assert!(ctx.has_failures());
    }
}
