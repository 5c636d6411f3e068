//! Duplicate designation resolution.
//!
//! # Responsibility
//! - Rank records sharing a designation with an explicit criteria list.
//! - Keep the single best record per group and delete the rest.
//!
//! # Invariants
//! - Ranking is a total order: the lowest id always breaks the final tie.
//! - Each group's read, decision and deletes run in one transaction.
//! - Fields of deleted duplicates are not merged into the survivor.

use crate::config::DuplicateConfig;
use crate::model::grade::{Grade, GradeId};
use crate::model::report::{Issue, PassKind, PassReport};
use crate::repo::grade_repo::{GradeListQuery, GradeStore};
use crate::service::{log_report, record_partial_apply, ReconcileResult};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// One survivor ranking criterion. Earlier criteria dominate later ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurvivorCriterion {
    /// Records with a non-empty provenance link first.
    HasLink,
    /// Records without a low-trust source marker first.
    TrustedSource,
    /// Lowest internal id first.
    EarliestCreated,
}

impl SurvivorCriterion {
    pub const DEFAULT_ORDER: [SurvivorCriterion; 3] = [
        SurvivorCriterion::HasLink,
        SurvivorCriterion::TrustedSource,
        SurvivorCriterion::EarliestCreated,
    ];
}

/// Store-independent ranking over a duplicate group.
#[derive(Debug, Clone, Copy)]
pub struct SurvivorRanking<'c> {
    criteria: &'c [SurvivorCriterion],
    low_trust_markers: &'c [String],
}

/// Outcome of ranking one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurvivorChoice {
    pub survivor: GradeId,
    /// Ids to delete, best-ranked first.
    pub losers: Vec<GradeId>,
    /// Ids that tied with the survivor on every criterion except the id
    /// fallback. Empty when the decision was unambiguous.
    pub tied: Vec<GradeId>,
}

impl<'c> SurvivorRanking<'c> {
    pub fn new(criteria: &'c [SurvivorCriterion], low_trust_markers: &'c [String]) -> Self {
        Self {
            criteria,
            low_trust_markers,
        }
    }

    pub fn from_config(config: &'c DuplicateConfig) -> Self {
        Self::new(&config.criteria, &config.low_trust_markers)
    }

    /// True when the link or standard carries a low-trust marker.
    pub fn is_low_trust(&self, grade: &Grade) -> bool {
        let link = grade.link.as_deref().unwrap_or_default().to_lowercase();
        let standard = grade.standard.to_lowercase();
        self.low_trust_markers.iter().any(|marker| {
            let marker = marker.trim().to_lowercase();
            !marker.is_empty() && (link.contains(&marker) || standard.contains(&marker))
        })
    }

    /// `Less` means `a` ranks above `b`. With `by_id == false` the
    /// `EarliestCreated` criterion is skipped.
    fn compare_criteria(&self, a: &Grade, b: &Grade, by_id: bool) -> Ordering {
        for criterion in self.criteria {
            let ordering = match criterion {
                SurvivorCriterion::HasLink => b.has_link().cmp(&a.has_link()),
                SurvivorCriterion::TrustedSource => self.is_low_trust(a).cmp(&self.is_low_trust(b)),
                SurvivorCriterion::EarliestCreated if by_id => a.id.cmp(&b.id),
                SurvivorCriterion::EarliestCreated => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Total order: configured criteria, then lowest id.
    pub fn compare(&self, a: &Grade, b: &Grade) -> Ordering {
        self.compare_criteria(a, b, true).then_with(|| a.id.cmp(&b.id))
    }

    /// Picks the survivor of `group`. Returns `None` for an empty group.
    pub fn select(&self, group: &[Grade]) -> Option<SurvivorChoice> {
        let mut ranked: Vec<&Grade> = group.iter().collect();
        ranked.sort_by(|a, b| self.compare(a, b));
        let (survivor, rest) = ranked.split_first()?;

        let mut tied: Vec<GradeId> = ranked
            .iter()
            .filter(|grade| self.compare_criteria(grade, survivor, false) == Ordering::Equal)
            .map(|grade| grade.id)
            .collect();
        if tied.len() < 2 {
            tied.clear();
        }

        Some(SurvivorChoice {
            survivor: survivor.id,
            losers: rest.iter().map(|grade| grade.id).collect(),
            tied,
        })
    }
}

/// Collapses duplicate designations to one canonical survivor each.
pub struct DuplicateService<'s, S: GradeStore> {
    store: &'s S,
    config: DuplicateConfig,
    dry_run: bool,
}

impl<'s, S: GradeStore> DuplicateService<'s, S> {
    pub fn new(store: &'s S, config: DuplicateConfig) -> Self {
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

    /// Designations held by more than one record in the current snapshot.
    pub fn find_duplicate_groups(&self) -> ReconcileResult<BTreeMap<String, usize>> {
        let snapshot = self.store.list_grades(&GradeListQuery::all())?;
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for grade in &snapshot {
            *counts.entry(grade.designation.clone()).or_default() += 1;
        }
        counts.retain(|_, count| *count > 1);
        Ok(counts)
    }

    /// Resolves every duplicate group, one transaction per group.
    ///
    /// `mutated` counts deleted records; `skipped` counts records of groups
    /// whose transaction was rolled back.
    pub fn run(&self) -> ReconcileResult<PassReport> {
        let mut report = PassReport::new(PassKind::Duplicates, self.dry_run);
        let snapshot = self.store.list_grades(&GradeListQuery::all())?;
        report.examined = snapshot.len();

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for grade in &snapshot {
            *counts.entry(grade.designation.as_str()).or_default() += 1;
        }

        let ranking = SurvivorRanking::from_config(&self.config);
        for (designation, count) in counts.into_iter().filter(|(_, count)| *count > 1) {
            let resolved = self.store.in_transaction(|tx| {
                let group = tx.list_grades(&GradeListQuery::by_designation(designation))?;
                let Some(choice) = ranking.select(&group) else {
                    return Ok(None);
                };
                if !self.dry_run {
                    for loser in &choice.losers {
                        tx.delete_grade(*loser)?;
                    }
                }
                Ok(Some(choice))
            });

            match resolved {
                Ok(Some(choice)) => {
                    info!(
                        "event=duplicate_group module=duplicates status=ok run_id={} designation={} survivor={} deleted={}",
                        report.run_id,
                        designation,
                        choice.survivor,
                        choice.losers.len()
                    );
                    if !choice.tied.is_empty() {
                        warn!(
                            "event=duplicate_group module=duplicates status=tie_break run_id={} designation={} tied={:?} survivor={}",
                            report.run_id, designation, choice.tied, choice.survivor
                        );
                        report.issues.push(Issue::AmbiguousDuplicateGroup {
                            designation: designation.to_string(),
                            ids: choice.tied.clone(),
                        });
                    }
                    report.mutated += choice.losers.len();
                }
                Ok(None) => {}
                Err(err) => {
                    report.skipped += count;
                    record_partial_apply(&mut report, designation, &err);
                }
            }
        }

        log_report(&report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::{SurvivorCriterion, SurvivorRanking};
    use crate::model::composition::Composition;
    use crate::model::grade::Grade;

    fn grade(id: i64, link: Option<&str>, standard: &str) -> Grade {
        Grade {
            id,
            designation: "X1".to_string(),
            standard: standard.to_string(),
            analogues: Vec::new(),
            composition: Composition::default(),
            link: link.map(str::to_string),
            manufacturer: None,
        }
    }

    fn markers() -> Vec<String> {
        vec!["zknives.com".to_string()]
    }

    #[test]
    fn link_bearing_record_survives() {
        let markers = markers();
        let ranking = SurvivorRanking::new(&SurvivorCriterion::DEFAULT_ORDER, &markers);
        let group = [
            grade(5, None, ""),
            grade(6, Some("http://x"), ""),
            grade(9, Some(""), ""),
        ];

        let choice = ranking.select(&group).unwrap();
        assert_eq!(choice.survivor, 6);
        assert_eq!(choice.losers, vec![5, 9]);
        assert!(choice.tied.is_empty());
    }

    #[test]
    fn low_trust_link_loses_to_trusted_link() {
        let markers = markers();
        let ranking = SurvivorRanking::new(&SurvivorCriterion::DEFAULT_ORDER, &markers);
        let group = [
            grade(1, Some("https://zknives.com/steels/x1"), ""),
            grade(2, Some("https://maker.example/x1"), ""),
        ];
        assert_eq!(ranking.select(&group).unwrap().survivor, 2);
    }

    #[test]
    fn marker_in_standard_counts_as_low_trust() {
        let markers = markers();
        let ranking = SurvivorRanking::new(&SurvivorCriterion::DEFAULT_ORDER, &markers);
        assert!(ranking.is_low_trust(&grade(1, None, "ZKnives.com chart")));
        assert!(!ranking.is_low_trust(&grade(1, None, "AISI, USA")));
    }

    #[test]
    fn full_tie_falls_back_to_lowest_id_and_is_reported() {
        let markers = markers();
        let ranking = SurvivorRanking::new(&SurvivorCriterion::DEFAULT_ORDER, &markers);
        let group = [grade(8, None, ""), grade(3, None, ""), grade(4, Some("http://y"), "")];
        let choice = ranking.select(&group).unwrap();
        assert_eq!(choice.survivor, 4);
        assert!(choice.tied.is_empty());

        let group = [grade(8, None, ""), grade(3, None, "")];
        let choice = ranking.select(&group).unwrap();
        assert_eq!(choice.survivor, 3);
        assert_eq!(choice.tied, vec![3, 8]);
    }

    #[test]
    fn criteria_order_is_respected() {
        let markers = markers();
        let trust_first = [SurvivorCriterion::TrustedSource, SurvivorCriterion::HasLink];
        let ranking = SurvivorRanking::new(&trust_first, &markers);
        let group = [
            grade(1, Some("https://zknives.com/x1"), ""),
            grade(2, None, ""),
        ];
        assert_eq!(ranking.select(&group).unwrap().survivor, 2);
    }
}
