//! Reconciliation passes.
//!
//! # Responsibility
//! - Host one service per maintenance pass, each written against
//!   `GradeStore` only.
//! - Share the snapshot and reporting helpers the passes have in common.
//!
//! # Invariants
//! - Every pass reads a full snapshot, computes its mutation set from that
//!   snapshot alone, then applies it inside store transactions.
//! - A failed unit of work is rolled back and reported as
//!   `Issue::PartialApply`; only snapshot reads propagate as `Err`.

use crate::config::ConfigError;
use crate::model::grade::Grade;
use crate::model::report::{Issue, PassReport};
use crate::repo::grade_repo::RepoError;
use log::{info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod chemistry_service;
pub mod closure_service;
pub mod duplicate_service;
pub mod reconciler;
pub mod standard_service;
pub mod token_service;

pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Failure that prevents a pass from producing a report.
#[derive(Debug)]
pub enum ReconcileError {
    /// The store could not be read (snapshot scan failed).
    Store(RepoError),
    Config(ConfigError),
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "grade store unavailable: {err}"),
            Self::Config(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Config(err) => Some(err),
        }
    }
}

impl From<RepoError> for ReconcileError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

impl From<ConfigError> for ReconcileError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// Indexes a snapshot by designation, keeping the lowest-id record when raw
/// input still holds duplicates. `grades` must be ordered by id.
pub(crate) fn index_by_designation(grades: &[Grade]) -> BTreeMap<&str, &Grade> {
    let mut index = BTreeMap::new();
    for grade in grades {
        index.entry(grade.designation.as_str()).or_insert(grade);
    }
    index
}

/// Records a rolled-back unit of work on `report`.
pub(crate) fn record_partial_apply(report: &mut PassReport, unit: &str, err: &RepoError) {
    warn!(
        "event=unit_rollback module={} status=error run_id={} unit={} error={}",
        report.pass, report.run_id, unit, err
    );
    report.issues.push(Issue::PartialApply {
        unit: unit.to_string(),
        message: err.to_string(),
    });
}

/// Emits the closing counts line for a pass.
pub(crate) fn log_report(report: &PassReport) {
    info!(
        "event=pass_report module={} status=ok run_id={} dry_run={} examined={} mutated={} skipped={} issues={}",
        report.pass,
        report.run_id,
        report.dry_run,
        report.examined,
        report.mutated,
        report.skipped,
        report.issues.len()
    );
}
