//! Values exchanged between the engine and its collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::format::Format;

/// A registered test specification as handed over by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specification {
    pub id: u64,
    pub name: String,
    pub format: Format,
    pub raw_text: String,
    pub created_at: DateTime<Utc>,
}

/// Verdict of a run. Variants are ordered by severity, so the overall status of a run
/// is the maximum of every check's contribution.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum RunStatus {
    #[default]
    Pass,
    Fail,
    Error,
}

impl RunStatus {
    /// Combine the current status with a new contribution. Never downgrades.
    pub fn escalate(self, other: RunStatus) -> RunStatus {
        self.max(other)
    }

    pub fn is_pass(self) -> bool {
        self == RunStatus::Pass
    }
}

/// Sealed result of one execution of a specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub spec_id: u64,
    pub status: RunStatus,
    pub result_log: Map<String, Value>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
