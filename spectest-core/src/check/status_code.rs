use serde_json::Value;

use super::{Context, Error, Section};
use crate::validate::EXPECTED_STATUS_CODE;

const RECEIVED_STATUS_CODE: &str = "receivedStatusCode";

pub(super) fn applies(spec: &Value) -> bool {
    spec.get(EXPECTED_STATUS_CODE).is_some()
}

/// Exact integer equality with the received status.
pub(super) fn check(ctx: &Context<'_>, section: &mut Section) -> Result<(), Error> {
    let expected = ctx.spec.get(EXPECTED_STATUS_CODE).cloned().unwrap_or_default();
    let received = ctx.response.status();

    section.record(EXPECTED_STATUS_CODE, expected.clone());
    section.record(RECEIVED_STATUS_CODE, received);
    section.verdict(status_of(&expected) == Some(u64::from(received)));
    Ok(())
}

/// Integral value of the expectation; `200.0` counts as `200`.
fn status_of(expected: &Value) -> Option<u64> {
    expected.as_u64().or_else(|| {
        expected
            .as_f64()
            .filter(|n| n.fract() == 0.0 && *n >= 0.0 && *n <= f64::from(u16::MAX))
            .map(|n| n as u64)
    })
}
