//! Chemistry inheritance along analogue edges.
//!
//! # Responsibility
//! - Find records with no key chemistry (C/Cr/Ni/Mo) but with analogues.
//! - Copy the composition of the first qualifying analogue into them.
//!
//! # Invariants
//! - Populated fields are never overwritten; values are only relocated,
//!   never invented.
//! - Each row is judged and written on its own id, so duplicate rows of a
//!   designation never receive a composition planned for another row.
//! - Donors are read from the pass snapshot, so inherited values do not
//!   chain within one run.
//! - All updates of a pass commit in one transaction.

use crate::config::ChemistryConfig;
use crate::model::composition::Composition;
use crate::model::grade::{Grade, GradeId, GradePatch};
use crate::model::report::{Inheritance, Issue, PassKind, PassReport};
use crate::repo::grade_repo::{GradeListQuery, GradeStore};
use crate::service::{index_by_designation, log_report, record_partial_apply, ReconcileResult};
use log::{debug, info};
use std::collections::BTreeMap;

/// Result of looking for a donor for one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonorSearch<'g> {
    pub donor: Option<&'g Grade>,
    /// Scanned analogues that are not in the store.
    pub misses: Vec<String>,
}

/// True when `grade` should inherit chemistry.
pub fn is_candidate(grade: &Grade) -> bool {
    !grade.composition.has_key_elements() && !grade.ordered_analogues().is_empty()
}

/// Scans up to `limit` analogues of `candidate`, in lexicographic order, and
/// returns the first one whose composition has a key element.
pub fn find_donor<'g>(
    candidate: &Grade,
    index: &BTreeMap<&str, &'g Grade>,
    limit: usize,
) -> DonorSearch<'g> {
    let mut misses = Vec::new();
    for analogue in candidate.ordered_analogues().into_iter().take(limit) {
        match index.get(analogue) {
            Some(grade) if grade.composition.has_key_elements() => {
                return DonorSearch {
                    donor: Some(*grade),
                    misses,
                };
            }
            Some(_) => {}
            None => misses.push(analogue.to_string()),
        }
    }
    DonorSearch {
        donor: None,
        misses,
    }
}

/// Back-fills composition gaps from equivalent grades.
pub struct ChemistryService<'s, S: GradeStore> {
    store: &'s S,
    config: ChemistryConfig,
    dry_run: bool,
}

impl<'s, S: GradeStore> ChemistryService<'s, S> {
    pub fn new(store: &'s S, config: ChemistryConfig) -> Self {
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

    /// Runs one inheritance pass.
    ///
    /// `examined` counts candidate rows; `skipped` counts candidates without
    /// a donor within `donor_scan_limit`.
    pub fn run(&self) -> ReconcileResult<PassReport> {
        let mut report = PassReport::new(PassKind::Chemistry, self.dry_run);
        // Why: donors come from this snapshot only, so the outcome does not
        // depend on the order candidates are visited.
        let snapshot = self.store.list_grades(&GradeListQuery::all())?;
        let index = index_by_designation(&snapshot);

        let mut planned: Vec<(GradeId, Inheritance, Composition)> = Vec::new();
        for candidate in snapshot.iter().filter(|grade| is_candidate(grade)) {
            report.examined += 1;
            let search = find_donor(candidate, &index, self.config.donor_scan_limit);
            for analogue in search.misses {
                debug!(
                    "event=lookup_miss module=chemistry status=skipped designation={} analogue={}",
                    candidate.designation, analogue
                );
                report.issues.push(Issue::LookupMiss {
                    designation: candidate.designation.clone(),
                    analogue,
                });
            }

            let Some(donor) = search.donor else {
                report.skipped += 1;
                report.issues.push(Issue::NoDonor {
                    designation: candidate.designation.clone(),
                });
                continue;
            };

            let mut merged = candidate.composition.clone();
            let copied = merged.fill_from(&donor.composition);
            if copied.is_empty() {
                continue;
            }
            planned.push((
                candidate.id,
                Inheritance {
                    designation: candidate.designation.clone(),
                    donor: donor.designation.clone(),
                    copied,
                },
                merged,
            ));
        }

        if !self.dry_run && !planned.is_empty() {
            let applied = self.store.in_transaction(|tx| {
                for (id, _, composition) in &planned {
                    tx.update_grade_by_id(*id, &GradePatch::composition(composition.clone()))?;
                }
                Ok(())
            });
            if let Err(err) = applied {
                record_partial_apply(&mut report, "chemistry pass", &err);
                report.skipped += planned.len();
                log_report(&report);
                return Ok(report);
            }
        }

        for (id, inheritance, _) in planned {
            let elements: Vec<&str> = inheritance.copied.iter().map(|e| e.symbol()).collect();
            info!(
                "event=chemistry_inherit module=chemistry status=ok run_id={} id={} designation={} donor={} elements={}",
                report.run_id,
                id,
                inheritance.designation,
                inheritance.donor,
                elements.join(",")
            );
            report.mutated += 1;
            report.inheritances.push(inheritance);
        }

        log_report(&report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::{find_donor, is_candidate};
    use crate::model::composition::{Composition, Element};
    use crate::model::grade::Grade;
    use crate::service::index_by_designation;

    fn grade(id: i64, designation: &str, analogues: &[&str], composition: Composition) -> Grade {
        Grade {
            id,
            designation: designation.to_string(),
            standard: String::new(),
            analogues: analogues.iter().map(|a| a.to_string()).collect(),
            composition,
            link: None,
            manufacturer: None,
        }
    }

    #[test]
    fn first_qualifying_analogue_is_the_donor() {
        let grades = vec![
            grade(1, "Y1", &["Z1", "W1"], Composition::default()),
            grade(2, "Z1", &[], Composition::default().with(Element::Vanadium, "0.1")),
            grade(3, "W1", &[], Composition::default().with(Element::Carbon, "0.45")),
        ];
        let index = index_by_designation(&grades);

        let search = find_donor(&grades[0], &index, 10);
        assert_eq!(search.donor.map(|g| g.designation.as_str()), Some("W1"));
        assert!(search.misses.is_empty());
    }

    #[test]
    fn scan_limit_bounds_the_search() {
        let grades = vec![
            grade(1, "Y1", &["A", "B"], Composition::default()),
            grade(2, "A", &[], Composition::default()),
            grade(3, "B", &[], Composition::default().with(Element::Nickel, "8")),
        ];
        let index = index_by_designation(&grades);
        assert!(find_donor(&grades[0], &index, 1).donor.is_none());
        assert!(find_donor(&grades[0], &index, 2).donor.is_some());
    }

    #[test]
    fn missing_analogues_are_reported() {
        let grades = vec![grade(1, "Y1", &["GHOST"], Composition::default())];
        let index = index_by_designation(&grades);
        let search = find_donor(&grades[0], &index, 10);
        assert!(search.donor.is_none());
        assert_eq!(search.misses, vec!["GHOST"]);
    }

    #[test]
    fn records_with_key_chemistry_are_not_candidates() {
        let with_chemistry = grade(1, "D2", &["1.2379"], Composition::default().with(Element::Chromium, "12"));
        let without_analogues = grade(2, "Q", &[], Composition::default());
        let candidate = grade(3, "R", &["D2"], Composition::default().with(Element::Silicon, "0.3"));

        assert!(!is_candidate(&with_chemistry));
        assert!(!is_candidate(&without_analogues));
        assert!(is_candidate(&candidate));
    }
}
