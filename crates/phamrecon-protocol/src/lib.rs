//! Shared machine-readable contracts for phamrecon.
//!
//! These types cross the boundary between the reconciliation core and anything
//! consuming its output (reports, CSV writers, downstream tooling), so they are
//! kept free of core logic and only depend on serde.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const PROTOCOL_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalStatus {
    Correct,
    Warning,
    Error,
}

impl fmt::Display for EvalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Correct => "correct",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        write!(f, "{text}")
    }
}

/// Which failure class an evaluation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Structural,
    Provenance,
    DataQuality,
    Duplicate,
    Commit,
}

/// One named check outcome. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: String,
    pub definition: String,
    pub result: String,
    pub status: EvalStatus,
    pub kind: CheckKind,
}

impl Evaluation {
    pub fn new(
        id: &str,
        definition: &str,
        result: impl Into<String>,
        status: EvalStatus,
        kind: CheckKind,
    ) -> Self {
        Self {
            id: id.to_string(),
            definition: definition.to_string(),
            result: result.into(),
            status,
            kind,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == EvalStatus::Error
    }

    pub fn is_warning(&self) -> bool {
        self.status == EvalStatus::Warning
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Evaluation: {}. Status: {}. Definition: {}. Result: {}",
            self.id, self.status, self.definition, self.result
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketOutcome {
    Committed,
    /// Passed every check in a dry run; nothing was written.
    Validated,
    Rejected,
    Aborted,
}

impl TicketOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Committed | Self::Validated)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleReport {
    pub bundle_id: usize,
    pub ticket_id: Option<String>,
    pub phage_id: Option<String>,
    pub ticket_type: Option<String>,
    pub filename: Option<String>,
    pub outcome: TicketOutcome,
    pub errors: usize,
    pub warnings: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    #[serde(default)]
    pub evaluations: BTreeMap<String, Vec<Evaluation>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub protocol_version: String,
    pub prod_run: bool,
    pub bundles: Vec<BundleReport>,
    /// Ticket-level evaluations raised before any bundle existed.
    #[serde(default)]
    pub batch_evaluations: Vec<Evaluation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl BatchReport {
    pub fn new(prod_run: bool) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            prod_run,
            ..Self::default()
        }
    }

    pub fn count(&self, outcome: TicketOutcome) -> usize {
        self.bundles.iter().filter(|b| b.outcome == outcome).count()
    }

    pub fn outcome_tally(&self) -> BTreeMap<String, usize> {
        let mut out = BTreeMap::new();
        for bundle in &self.bundles {
            let key = serde_json::to_value(bundle.outcome)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            *out.entry(key).or_insert(0) += 1;
        }
        out
    }
}
