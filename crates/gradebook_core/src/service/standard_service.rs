//! Standard field canonicalization.
//!
//! # Responsibility
//! - Recognize standard families in free-text standard descriptors.
//! - Replace descriptors that embed the record's own designation with the
//!   fixed `family, country` label.
//!
//! # Invariants
//! - Both conditions must hold before a rewrite: known family and literal
//!   designation substring.
//! - Each row is judged and rewritten on its own id.
//! - All rewrites of a pass commit in one transaction.

use crate::config::{ConfigError, StandardConfig, StandardFamily};
use crate::model::grade::{Grade, GradeId, GradePatch};
use crate::model::report::{PassKind, PassReport};
use crate::repo::grade_repo::{GradeListQuery, GradeStore};
use crate::service::{log_report, record_partial_apply, ReconcileResult};
use log::info;
use regex::Regex;

/// Compiled family patterns in priority order.
#[derive(Debug, Clone)]
pub struct StandardMatcher {
    families: Vec<(StandardFamily, Regex)>,
}

impl StandardMatcher {
    pub fn new(families: &[StandardFamily]) -> Result<Self, ConfigError> {
        let mut compiled = Vec::with_capacity(families.len());
        for family in families {
            let alternatives: Vec<String> = std::iter::once(&family.name)
                .chain(family.aliases.iter())
                .map(|spelling| regex::escape(spelling.trim()))
                .filter(|spelling| !spelling.is_empty())
                .collect();
            let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
            let regex = Regex::new(&pattern).map_err(|err| {
                ConfigError::Validation(format!(
                    "standard family `{}` has an invalid pattern: {err}",
                    family.name
                ))
            })?;
            compiled.push((family.clone(), regex));
        }
        Ok(Self { families: compiled })
    }

    pub fn from_config(config: &StandardConfig) -> Result<Self, ConfigError> {
        Self::new(&config.families)
    }

    /// First family whose name or alias appears as a whole word.
    pub fn family_of(&self, standard: &str) -> Option<&StandardFamily> {
        self.families
            .iter()
            .find(|(_, regex)| regex.is_match(standard))
            .map(|(family, _)| family)
    }

    /// Canonical label for `grade`, or `None` when the field stays as is.
    pub fn canonicalize(&self, grade: &Grade) -> Option<String> {
        let standard = grade.standard.trim();
        if standard.is_empty() || grade.designation.is_empty() {
            return None;
        }
        if !standard.contains(grade.designation.as_str()) {
            return None;
        }
        let label = self.family_of(standard)?.label();
        (label != standard).then_some(label)
    }
}

/// Rewrites stale standard descriptors to their canonical label.
pub struct StandardService<'s, S: GradeStore> {
    store: &'s S,
    config: StandardConfig,
    dry_run: bool,
}

impl<'s, S: GradeStore> StandardService<'s, S> {
    pub fn new(store: &'s S, config: StandardConfig) -> Self {
        Self {
            store,
            config,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// `examined` counts records with a non-empty standard field.
    pub fn run(&self) -> ReconcileResult<PassReport> {
        let mut report = PassReport::new(PassKind::Standards, self.dry_run);
        let matcher = StandardMatcher::from_config(&self.config)?;
        let snapshot = self.store.list_grades(&GradeListQuery::all())?;

        // Judged per row: duplicates of a designation may carry different
        // descriptors.
        let mut rewrites: Vec<(GradeId, &str, String)> = Vec::new();
        for grade in &snapshot {
            if grade.standard.trim().is_empty() {
                continue;
            }
            report.examined += 1;
            if let Some(label) = matcher.canonicalize(grade) {
                rewrites.push((grade.id, grade.designation.as_str(), label));
            }
        }

        if !self.dry_run && !rewrites.is_empty() {
            let applied = self.store.in_transaction(|tx| {
                for (id, _, label) in &rewrites {
                    tx.update_grade_by_id(*id, &GradePatch::standard(label.as_str()))?;
                }
                Ok(())
            });
            if let Err(err) = applied {
                report.skipped += rewrites.len();
                record_partial_apply(&mut report, "standards pass", &err);
                log_report(&report);
                return Ok(report);
            }
        }

        for (id, designation, label) in &rewrites {
            info!(
                "event=standard_rewrite module=standards status=ok run_id={} id={} designation={} label=\"{}\"",
                report.run_id, id, designation, label
            );
        }
        report.mutated = rewrites.len();

        log_report(&report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::StandardMatcher;
    use crate::config::{StandardConfig, StandardFamily};
    use crate::model::composition::Composition;
    use crate::model::grade::Grade;

    fn grade(designation: &str, standard: &str) -> Grade {
        Grade {
            id: 1,
            designation: designation.to_string(),
            standard: standard.to_string(),
            analogues: Vec::new(),
            composition: Composition::default(),
            link: None,
            manufacturer: None,
        }
    }

    fn matcher() -> StandardMatcher {
        StandardMatcher::from_config(&StandardConfig::default()).unwrap()
    }

    #[test]
    fn embedded_designation_in_known_family_is_rewritten() {
        let rewritten = matcher().canonicalize(&grade("1133", "GOST 1133-71"));
        assert_eq!(rewritten.as_deref(), Some("GOST, Russia"));
    }

    #[test]
    fn field_without_designation_is_left_alone() {
        assert_eq!(matcher().canonicalize(&grade("40X", "GOST 4543-71")), None);
    }

    #[test]
    fn unknown_family_is_left_alone() {
        assert_eq!(matcher().canonicalize(&grade("S45C", "Maker S45C catalogue")), None);
    }

    #[test]
    fn family_match_is_whole_word_and_case_insensitive() {
        let matcher = matcher();
        assert_eq!(matcher.family_of("din 17350").map(|f| f.name.as_str()), Some("DIN"));
        assert_eq!(matcher.family_of("ГОСТ 5950-2000").map(|f| f.name.as_str()), Some("GOST"));
        assert!(matcher.family_of("GENERIC 12").is_none());
        assert!(matcher.family_of("ENGLISH").is_none());
    }

    #[test]
    fn designation_check_is_case_sensitive() {
        assert_eq!(matcher().canonicalize(&grade("x12", "DIN X12 1.2080")), None);
    }

    #[test]
    fn canonical_label_is_not_rewritten_again() {
        let families = vec![StandardFamily::new("EN", "Europe", &[])];
        let matcher = StandardMatcher::new(&families).unwrap();
        assert_eq!(matcher.canonicalize(&grade("EN", "EN, Europe")), None);
    }
}
