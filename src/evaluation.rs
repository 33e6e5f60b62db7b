//! Helpers for building evaluations, shared by every check module.

pub use phamrecon_protocol::{CheckKind, EvalStatus, Evaluation};
use std::collections::{BTreeMap, BTreeSet};

pub fn correct(id: &str, definition: &str, result: impl Into<String>, kind: CheckKind) -> Evaluation {
    Evaluation::new(id, definition, result, EvalStatus::Correct, kind)
}

pub fn warning(id: &str, definition: &str, result: impl Into<String>, kind: CheckKind) -> Evaluation {
    Evaluation::new(id, definition, result, EvalStatus::Warning, kind)
}

pub fn error(id: &str, definition: &str, result: impl Into<String>, kind: CheckKind) -> Evaluation {
    Evaluation::new(id, definition, result, EvalStatus::Error, kind)
}

/// Correct when `passed`, otherwise `fail_status` with `detail` as the result.
pub fn expect(
    id: &str,
    definition: &str,
    passed: bool,
    detail: impl Into<String>,
    fail_status: EvalStatus,
    kind: CheckKind,
) -> Evaluation {
    if passed {
        correct(id, definition, "The check passed.", kind)
    } else {
        Evaluation::new(id, definition, detail, fail_status, kind)
    }
}

/// Error unless `value` is in `set`.
pub fn present(id: &str, definition: &str, value: &str, set: &BTreeSet<String>, kind: CheckKind) -> Evaluation {
    expect(
        id,
        definition,
        set.contains(value),
        format!("The value '{value}' is not a valid value."),
        EvalStatus::Error,
        kind,
    )
}

/// Error if `value` is in `set`.
pub fn absent(id: &str, definition: &str, value: &str, set: &BTreeSet<String>, kind: CheckKind) -> Evaluation {
    expect(
        id,
        definition,
        !set.contains(value),
        format!("The value '{value}' is already in use."),
        EvalStatus::Error,
        kind,
    )
}

/// Correct result with a fixed "skipped" reason.
pub fn not_evaluated(id: &str, definition: &str, reason: &str, kind: CheckKind) -> Evaluation {
    correct(id, definition, format!("Not evaluated: {reason}."), kind)
}

pub fn count_status<'a>(evaluations: impl IntoIterator<Item = &'a Evaluation>, status: EvalStatus) -> usize {
    evaluations.into_iter().filter(|e| e.status == status).count()
}

/// Writes every evaluation through `tracing`, errors at error level.
pub fn log_evaluations(bundle_id: usize, evaluations: &BTreeMap<String, Vec<Evaluation>>) {
    for (key, list) in evaluations {
        for evaluation in list {
            match evaluation.status {
                EvalStatus::Error => tracing::error!(bundle = bundle_id, key = %key, "{evaluation}"),
                EvalStatus::Warning => tracing::warn!(bundle = bundle_id, key = %key, "{evaluation}"),
                EvalStatus::Correct => tracing::debug!(bundle = bundle_id, key = %key, "{evaluation}"),
            }
        }
    }
}
