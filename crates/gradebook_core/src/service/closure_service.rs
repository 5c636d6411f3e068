//! Equivalence closure over the analogue relation.
//!
//! # Responsibility
//! - Make the analogue relation symmetric for records present in the store.
//! - Propagate analogues transitively into sparse records, one hop per pass.
//! - Repeat until a pass schedules nothing, bounded by `max_iterations`.
//!
//! # Invariants
//! - A record's analogue set only ever grows, except for stripping its own
//!   designation.
//! - Each pass plans from one snapshot and commits as one transaction.
//! - Plans are per designation; every row of a planned designation is
//!   rewritten by id with its own entries kept.
//! - Rewritten analogue lists are sorted and deduplicated.

use crate::config::ClosureConfig;
use crate::model::grade::{Grade, GradePatch};
use crate::model::report::{Issue, PassKind, PassReport};
use crate::repo::grade_repo::{GradeListQuery, GradeStore};
use crate::service::{index_by_designation, log_report, record_partial_apply, ReconcileResult};
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

/// Mutation set computed from one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosurePlan {
    /// Designation -> full replacement analogue list (sorted).
    pub updates: BTreeMap<String, Vec<String>>,
    /// `(designation, analogue)` pairs whose analogue is not stored.
    pub lookup_misses: BTreeSet<(String, String)>,
    /// Distinct designations in the snapshot.
    pub examined: usize,
}

impl ClosurePlan {
    pub fn is_fixpoint(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Plans one symmetrize + bounded-transitive-merge pass.
///
/// Step 1 adds `R` to every stored analogue `D` of `R` that does not list it.
/// Step 2 merges, into every record with `0 < |analogues| < sparsity_threshold`,
/// the analogue set of its first stored analogue in lexicographic order.
/// Both steps read the snapshot, never each other's output.
pub fn plan_closure(grades: &[Grade], sparsity_threshold: usize) -> ClosurePlan {
    let index = index_by_designation(grades);
    let mut pending: BTreeMap<&str, BTreeSet<String>> = index
        .iter()
        .map(|(designation, grade)| (*designation, grade.analogue_set()))
        .collect();
    let mut lookup_misses = BTreeSet::new();

    for grade in index.values() {
        for analogue in grade.ordered_analogues() {
            let Some(target) = index.get(analogue) else {
                lookup_misses.insert((grade.designation.clone(), analogue.to_string()));
                continue;
            };
            if !target.analogues.contains(&grade.designation) {
                if let Some(set) = pending.get_mut(analogue) {
                    set.insert(grade.designation.clone());
                }
            }
        }
    }

    for grade in index.values() {
        let size = grade.analogue_set().len();
        if size == 0 || size >= sparsity_threshold {
            continue;
        }
        // Why: the stored list order is arrival order from ingestion, so the
        // merge source is picked lexicographically to keep runs reproducible.
        let source = grade
            .ordered_analogues()
            .into_iter()
            .find_map(|analogue| index.get(analogue));
        let Some(source) = source else {
            continue;
        };
        if let Some(set) = pending.get_mut(grade.designation.as_str()) {
            set.extend(
                source
                    .analogue_set()
                    .into_iter()
                    .filter(|analogue| *analogue != grade.designation),
            );
        }
    }

    let mut updates = BTreeMap::new();
    for (designation, set) in pending {
        let Some(grade) = index.get(designation) else {
            continue;
        };
        let lists_itself = grade.analogues.iter().any(|a| a == designation);
        if lists_itself || set != grade.analogue_set() {
            updates.insert(designation.to_string(), set.into_iter().collect());
        }
    }

    ClosurePlan {
        updates,
        lookup_misses,
        examined: index.len(),
    }
}

/// Runs the closure builder against a store.
pub struct ClosureService<'s, S: GradeStore> {
    store: &'s S,
    config: ClosureConfig,
    dry_run: bool,
}

impl<'s, S: GradeStore> ClosureService<'s, S> {
    pub fn new(store: &'s S, config: ClosureConfig) -> Self {
        Self {
            store,
            config,
            dry_run: false,
        }
    }

    /// Plans without writing. A dry run executes exactly one planning pass.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Iterates passes until fixpoint or `max_iterations`.
    ///
    /// `mutated` counts designations rewritten across all iterations; `skipped`
    /// counts records whose analogues reference absent grades.
    pub fn run(&self) -> ReconcileResult<PassReport> {
        let mut report = PassReport::new(PassKind::Closure, self.dry_run);
        let mut misses: BTreeSet<(String, String)> = BTreeSet::new();
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            iterations += 1;
            let snapshot = self.store.list_grades(&GradeListQuery::all())?;
            let plan = plan_closure(&snapshot, self.config.sparsity_threshold);
            if iterations == 1 {
                report.examined = plan.examined;
            }
            misses.extend(plan.lookup_misses.iter().cloned());

            info!(
                "event=closure_pass module=closure status=ok run_id={} iteration={} scheduled={} lookup_misses={}",
                report.run_id,
                iterations,
                plan.updates.len(),
                plan.lookup_misses.len()
            );

            if plan.is_fixpoint() {
                converged = true;
                break;
            }
            if self.dry_run {
                report.mutated += plan.updates.len();
                break;
            }

            let applied = self.store.in_transaction(|tx| {
                for grade in &snapshot {
                    let Some(planned) = plan.updates.get(&grade.designation) else {
                        continue;
                    };
                    // Duplicate rows keep their own entries on top of the plan.
                    let mut analogues = grade.analogue_set();
                    analogues.extend(planned.iter().cloned());
                    let analogues: Vec<String> = analogues.into_iter().collect();
                    tx.update_grade_by_id(grade.id, &GradePatch::analogues(analogues))?;
                }
                Ok(plan.updates.len())
            });
            match applied {
                Ok(count) => report.mutated += count,
                Err(err) => {
                    record_partial_apply(&mut report, &format!("closure pass {iterations}"), &err);
                    break;
                }
            }
        }

        for (designation, analogue) in &misses {
            debug!(
                "event=lookup_miss module=closure status=skipped designation={} analogue={}",
                designation, analogue
            );
        }
        report.skipped = misses
            .iter()
            .map(|(designation, _)| designation.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        report.issues.extend(
            misses
                .into_iter()
                .map(|(designation, analogue)| Issue::LookupMiss {
                    designation,
                    analogue,
                }),
        );
        report.iterations = Some(iterations);
        report.converged = Some(converged);

        log_report(&report);
        Ok(report)
    }
}
