//! # Checks
//!
//! Assertions evaluated against a response, in a fixed order. Every check reads its
//! own trigger fields from the specification tree and does nothing when they are
//! absent. A check that runs writes one section into the run's result log and
//! contributes a status; the run status is the most severe contribution seen.
//!
//! ```text
//! status code -> content type -> json path -> body path -> body
//! ```
//!
//! A check that cannot evaluate its input (e.g. a JSON path against an XML
//! response) records an `error` in its section and escalates the run to
//! [`RunStatus::Error`]. The remaining checks still run.

mod body;
mod body_path;
mod content_type;
mod json_path;
mod status_code;

use serde_json::{Map, Value};
use tracing::*;

use crate::{http::Response, model::RunStatus};

pub use json_path::query as query_json_path;

/// Key of the verdict in each result log section.
pub const RESULT: &str = "result";
/// Key of a check-local error message in a result log section.
pub const ERROR: &str = "error";

/// Check-local failures. They never abort a run; they are recorded in the
/// section of the check that raised them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("response body is not valid JSON: {0}")]
    NotJson(String),
    #[error("received body must be an object or an array of objects, got: {0}")]
    UnexpectedBody(String),
    #[error("field '{field}' is malformed: {reason}")]
    Malformed { field: &'static str, reason: String },
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}

/// Everything a check may look at.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    /// Validated specification tree, holding the expectations.
    pub spec: &'a Value,
    /// Canonical tree of the response body.
    pub body: &'a Value,
    pub response: &'a Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Check {
    StatusCode,
    ContentType,
    JsonPath,
    BodyPath,
    Body,
}

/// Evaluation order.
pub const CHAIN: [Check; 5] = [
    Check::StatusCode,
    Check::ContentType,
    Check::JsonPath,
    Check::BodyPath,
    Check::Body,
];

impl Check {
    /// Result log key this check writes its section under.
    pub fn log_key(self) -> &'static str {
        match self {
            Check::StatusCode => "statusCodeCheckResult",
            Check::ContentType => "contentTypeCheckResult",
            Check::JsonPath => "bodyJsonPathValueCheckResult",
            Check::BodyPath => "bodyPathValueCheckResult",
            Check::Body => "bodyCheckResult",
        }
    }

    /// Whether the specification carries the fields this check is triggered by.
    pub fn applies(self, spec: &Value) -> bool {
        match self {
            Check::StatusCode => status_code::applies(spec),
            Check::ContentType => content_type::applies(spec),
            Check::JsonPath => json_path::applies(spec),
            Check::BodyPath => body_path::applies(spec),
            Check::Body => body::applies(spec),
        }
    }

    /// Run this check and fold its outcome into `status`.
    pub fn handle(
        self,
        ctx: &Context<'_>,
        log: &mut Map<String, Value>,
        status: RunStatus,
    ) -> RunStatus {
        if !self.applies(ctx.spec) {
            return status;
        }

        let mut section = Section::default();
        let outcome = match self {
            Check::StatusCode => status_code::check(ctx, &mut section),
            Check::ContentType => content_type::check(ctx, &mut section),
            Check::JsonPath => json_path::check(ctx, &mut section),
            Check::BodyPath => body_path::check(ctx, &mut section),
            Check::Body => body::check(ctx, &mut section),
        };
        if let Err(e) = outcome {
            warn!("{self} check could not be evaluated: {e}");
            section.error(&e);
        }

        debug!("{self} check: {}", section.result);
        let result = section.result;
        log.insert(self.log_key().to_string(), section.into_value());
        status.escalate(result)
    }
}

/// Run the whole chain, starting from `status`.
pub fn evaluate(ctx: &Context<'_>, log: &mut Map<String, Value>, status: RunStatus) -> RunStatus {
    CHAIN
        .iter()
        .fold(status, |status, check| check.handle(ctx, log, status))
}

/// One check's entry in the result log.
#[derive(Debug, Default)]
pub(crate) struct Section {
    fields: Map<String, Value>,
    result: RunStatus,
}

impl Section {
    pub(crate) fn record(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// Fold a comparison outcome into the section's verdict.
    pub(crate) fn verdict(&mut self, passed: bool) {
        if !passed {
            self.result = self.result.escalate(RunStatus::Fail);
        }
    }

    fn error(&mut self, e: &Error) {
        self.record(ERROR, e.to_string());
        self.result = RunStatus::Error;
    }

    fn into_value(mut self) -> Value {
        self.fields
            .insert(RESULT.to_string(), Value::String(self.result.to_string()));
        Value::Object(self.fields)
    }
}

/// Verdict marker of a single comparison inside a section.
pub(crate) fn marker(passed: bool) -> Value {
    let status = if passed {
        RunStatus::Pass
    } else {
        RunStatus::Fail
    };
    Value::String(status.to_string())
}

/// Text form of a value as used by textual comparisons: strings as they are,
/// everything else as JSON.
pub(crate) fn as_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
