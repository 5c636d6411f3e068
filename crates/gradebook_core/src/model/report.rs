//! Pass outcome reporting.
//!
//! # Responsibility
//! - Carry the examined/mutated/skipped counts every pass concludes with.
//! - Enumerate non-fatal findings for operator review.
//!
//! # Invariants
//! - Reports are plain data; producing one never touches the store.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

use crate::model::composition::Element;
use crate::model::grade::GradeId;

/// Reconciliation pass identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Closure,
    Duplicates,
    Chemistry,
    Tokens,
    Standards,
}

impl PassKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closure => "closure",
            Self::Duplicates => "duplicates",
            Self::Chemistry => "chemistry",
            Self::Tokens => "tokens",
            Self::Standards => "standards",
        }
    }
}

impl Display for PassKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-fatal finding recorded during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    /// A referenced analogue is not present in the store.
    LookupMiss { designation: String, analogue: String },
    /// Every ranking criterion tied; the lowest id won.
    AmbiguousDuplicateGroup { designation: String, ids: Vec<GradeId> },
    /// A delimiter-bearing designation could not be classified.
    MalformedDesignation { designation: String, reason: String },
    /// Kept as a genuine compound name because a part is not stored alone.
    CompoundDesignation { designation: String },
    /// Chemistry candidate with no qualifying analogue within the scan bound.
    NoDonor { designation: String },
    /// A unit of work failed and was rolled back.
    PartialApply { unit: String, message: String },
}

/// Inheritance edge applied (or planned, in dry runs) by the chemistry pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inheritance {
    pub designation: String,
    pub donor: String,
    /// Elements copied from the donor, in column order.
    pub copied: Vec<Element>,
}

/// Counts report returned by every pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub pass: PassKind,
    pub run_id: Uuid,
    pub dry_run: bool,
    pub examined: usize,
    pub mutated: usize,
    pub skipped: usize,
    /// Closure only: full passes executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<usize>,
    /// Closure only: whether the last pass scheduled nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converged: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inheritances: Vec<Inheritance>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
}

impl PassReport {
    pub fn new(pass: PassKind, dry_run: bool) -> Self {
        Self {
            pass,
            run_id: Uuid::new_v4(),
            dry_run,
            examined: 0,
            mutated: 0,
            skipped: 0,
            iterations: None,
            converged: None,
            inheritances: Vec::new(),
            issues: Vec::new(),
        }
    }

    /// Returns true when the pass scheduled no mutation.
    pub fn is_noop(&self) -> bool {
        self.mutated == 0
    }

    pub fn has_partial_apply(&self) -> bool {
        self.issues
            .iter()
            .any(|issue| matches!(issue, Issue::PartialApply { .. }))
    }
}

impl Display for PassReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pass={} examined={} mutated={} skipped={} issues={}",
            self.pass,
            self.examined,
            self.mutated,
            self.skipped,
            self.issues.len()
        )?;
        if let Some(iterations) = self.iterations {
            write!(f, " iterations={iterations}")?;
        }
        if let Some(converged) = self.converged {
            write!(f, " converged={converged}")?;
        }
        if self.dry_run {
            write!(f, " dry_run=true")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Issue, PassKind, PassReport};

    #[test]
    fn display_lists_counts_and_closure_fields() {
        let mut report = PassReport::new(PassKind::Closure, true);
        report.examined = 4;
        report.mutated = 2;
        report.iterations = Some(2);
        report.converged = Some(true);

        assert_eq!(
            report.to_string(),
            "pass=closure examined=4 mutated=2 skipped=0 issues=0 iterations=2 converged=true dry_run=true"
        );
    }

    #[test]
    fn json_tags_issue_kinds_and_omits_empty_sections() {
        let mut report = PassReport::new(PassKind::Tokens, false);
        report.issues.push(Issue::CompoundDesignation {
            designation: "347/347H".to_string(),
        });

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["pass"], "tokens");
        assert_eq!(value["issues"][0]["kind"], "compound_designation");
        assert_eq!(value["issues"][0]["designation"], "347/347H");
        assert!(value.get("iterations").is_none());
        assert!(value.get("inheritances").is_none());

        let decoded: PassReport = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, report);
    }

    #[test]
    fn partial_apply_is_detected() {
        let mut report = PassReport::new(PassKind::Chemistry, false);
        assert!(!report.has_partial_apply());
        report.issues.push(Issue::PartialApply {
            unit: "chemistry pass".to_string(),
            message: "disk full".to_string(),
        });
        assert!(report.has_partial_apply());
        assert!(report.is_noop());
    }
}
