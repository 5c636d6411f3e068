//! Merged-designation detection.
//!
//! # Responsibility
//! - Split designations that look like two grades fused during ingestion.
//! - Delete the merged record only when every part is stored on its own.
//!
//! # Invariants
//! - Never creates records and never rewrites a designation: the merged
//!   record is either kept untouched or deleted.
//! - Each deletion, with part linking and reference scrubbing, is one
//!   transaction.

use crate::config::TokenConfig;
use crate::model::grade::GradePatch;
use crate::model::report::{Issue, PassKind, PassReport};
use crate::repo::grade_repo::{GradeListQuery, GradeStore, RepoResult};
use crate::service::{index_by_designation, log_report, record_partial_apply, ReconcileResult};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;

// `1.563475Ni8` -> `1.5634` + `75Ni8`
static WERKSTOFF_CONCAT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(1\.\d{4})(\d+[A-Za-z]\d*)$").expect("valid werkstoff regex"));
// `T11347M47` -> `T11347` + `M47`
static LETTER_BOUNDARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z]+\d+)([A-Z]\d+)$").expect("valid letter boundary regex"));

/// How a designation was split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitMethod {
    Delimiter(String),
    WerkstoffConcat,
    LetterBoundary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignationSplit {
    pub method: SplitMethod,
    /// Trimmed parts, blanks kept so malformed input stays visible.
    pub parts: Vec<String>,
}

/// Classification of one designation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenClass {
    /// No merge signal.
    Plain,
    /// Every part exists alone: the merged record is an ingestion artifact.
    Redundant { parts: Vec<String> },
    /// Some part does not exist alone: a genuine compound name.
    Compound { missing: Vec<String> },
    /// Delimiter present but the parts cannot be trusted.
    Malformed { reason: String },
}

/// Splits designations according to `TokenConfig`.
#[derive(Debug, Clone)]
pub struct TokenSplitter {
    delimiters: Vec<String>,
    detect_concatenated: bool,
}

impl TokenSplitter {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            delimiters: config.delimiters.clone(),
            detect_concatenated: config.detect_concatenated,
        }
    }

    pub fn split(&self, designation: &str) -> Option<DesignationSplit> {
        for delimiter in &self.delimiters {
            if delimiter.is_empty() || !designation.contains(delimiter.as_str()) {
                continue;
            }
            return Some(DesignationSplit {
                method: SplitMethod::Delimiter(delimiter.clone()),
                parts: designation
                    .split(delimiter.as_str())
                    .map(|part| part.trim().to_string())
                    .collect(),
            });
        }

        if !self.detect_concatenated {
            return None;
        }
        for (regex, method) in [
            (&*WERKSTOFF_CONCAT_RE, SplitMethod::WerkstoffConcat),
            (&*LETTER_BOUNDARY_RE, SplitMethod::LetterBoundary),
        ] {
            if let Some(captures) = regex.captures(designation) {
                return Some(DesignationSplit {
                    method,
                    parts: vec![captures[1].to_string(), captures[2].to_string()],
                });
            }
        }
        None
    }

    /// Classifies `designation` against the set of stored designations.
    pub fn classify(&self, designation: &str, exists: impl Fn(&str) -> bool) -> TokenClass {
        let Some(split) = self.split(designation) else {
            return TokenClass::Plain;
        };
        let is_delimited = matches!(split.method, SplitMethod::Delimiter(_));

        if split.parts.len() < 2 || split.parts.iter().any(|part| part.is_empty()) {
            return TokenClass::Malformed {
                reason: "empty part after split".to_string(),
            };
        }
        if split.parts.iter().any(|part| part == designation) {
            return TokenClass::Malformed {
                reason: "part equals the whole designation".to_string(),
            };
        }

        let missing: Vec<String> = split
            .parts
            .iter()
            .filter(|part| !exists(part.as_str()))
            .cloned()
            .collect();
        if missing.is_empty() {
            return TokenClass::Redundant { parts: split.parts };
        }
        if is_delimited {
            TokenClass::Compound { missing }
        } else {
            // Why: a concatenation pattern alone is weak evidence (many real
            // grades end in digits); without stored parts it is an ordinary
            // designation and raises no issue.
            TokenClass::Plain
        }
    }
}

/// Writes performed when a merged record is removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeRemoval {
    /// Part rows that gained the other parts as analogues.
    pub linked: usize,
    /// Rows whose analogue list dropped the merged designation.
    pub scrubbed: usize,
}

/// Removes redundant merged-designation records.
pub struct TokenService<'s, S: GradeStore> {
    store: &'s S,
    config: TokenConfig,
    dry_run: bool,
}

impl<'s, S: GradeStore> TokenService<'s, S> {
    pub fn new(store: &'s S, config: TokenConfig) -> Self {
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

    /// Classifies every distinct designation and deletes redundant merges.
    ///
    /// `examined` counts designations with a merge signal; `mutated` counts
    /// merged designations deleted; `skipped` counts kept compound and
    /// malformed ones.
    pub fn run(&self) -> ReconcileResult<PassReport> {
        let mut report = PassReport::new(PassKind::Tokens, self.dry_run);
        let snapshot = self.store.list_grades(&GradeListQuery::all())?;
        let index = index_by_designation(&snapshot);
        let splitter = TokenSplitter::new(&self.config);

        for designation in index.keys() {
            let class = splitter.classify(designation, |part| index.contains_key(part));
            if class == TokenClass::Plain {
                continue;
            }
            report.examined += 1;
            debug!(
                "event=token_classify module=tokens status=ok designation={} class={:?}",
                designation, class
            );

            match class {
                TokenClass::Plain => {}
                TokenClass::Compound { .. } => {
                    report.skipped += 1;
                    report.issues.push(Issue::CompoundDesignation {
                        designation: designation.to_string(),
                    });
                }
                TokenClass::Malformed { reason } => {
                    report.skipped += 1;
                    report.issues.push(Issue::MalformedDesignation {
                        designation: designation.to_string(),
                        reason,
                    });
                }
                TokenClass::Redundant { parts } => {
                    if self.dry_run {
                        report.mutated += 1;
                        continue;
                    }
                    match self.remove_merged(designation, &parts) {
                        Ok(Some(removal)) => {
                            info!(
                                "event=token_remove module=tokens status=ok run_id={} designation={} parts={} linked={} scrubbed={}",
                                report.run_id,
                                designation,
                                parts.join("+"),
                                removal.linked,
                                removal.scrubbed
                            );
                            report.mutated += 1;
                        }
                        Ok(None) => {
                            report.skipped += 1;
                            report.issues.push(Issue::CompoundDesignation {
                                designation: designation.to_string(),
                            });
                        }
                        Err(err) => {
                            report.skipped += 1;
                            record_partial_apply(&mut report, designation, &err);
                        }
                    }
                }
            }
        }

        log_report(&report);
        Ok(report)
    }

    /// Deletes `designation` if all `parts` still exist. Before the delete the
    /// parts are linked as each other's analogues, after it the designation
    /// is scrubbed from other analogue lists, each when configured. Returns
    /// `None` when a part vanished meanwhile.
    fn remove_merged(
        &self,
        designation: &str,
        parts: &[String],
    ) -> RepoResult<Option<MergeRemoval>> {
        self.store.in_transaction(|tx| {
            for part in parts {
                if tx.get_grade(part)?.is_none() {
                    return Ok(None);
                }
            }

            let mut removal = MergeRemoval::default();
            if self.config.link_parts {
                removal.linked = link_parts(tx, parts)?;
            }
            tx.delete_by_designation(designation)?;

            if self.config.scrub_references {
                for grade in tx.list_grades(&GradeListQuery::with_analogues())? {
                    if !grade.analogues.iter().any(|a| a == designation) {
                        continue;
                    }
                    let remaining: Vec<String> = grade
                        .analogues
                        .iter()
                        .filter(|a| *a != designation && **a != grade.designation)
                        .cloned()
                        .collect();
                    tx.update_grade_by_id(grade.id, &GradePatch::analogues(remaining))?;
                    removal.scrubbed += 1;
                }
            }
            Ok(Some(removal))
        })
    }
}

/// Adds every other part to the analogue list of each row of each part.
/// Returns the number of rows rewritten.
fn link_parts<S: GradeStore>(tx: &S, parts: &[String]) -> RepoResult<usize> {
    let mut linked = 0;
    for part in parts {
        for grade in tx.list_grades(&GradeListQuery::by_designation(part.as_str()))? {
            let current = grade.analogue_set();
            let mut wanted = current.clone();
            wanted.extend(
                parts
                    .iter()
                    .filter(|other| **other != grade.designation)
                    .cloned(),
            );
            if wanted == current {
                continue;
            }
            let analogues: Vec<String> = wanted.into_iter().collect();
            tx.update_grade_by_id(grade.id, &GradePatch::analogues(analogues))?;
            linked += 1;
        }
    }
    Ok(linked)
}

#[cfg(test)]
mod tests {
    use super::{SplitMethod, TokenClass, TokenSplitter};
    use crate::config::TokenConfig;
    use std::collections::BTreeSet;

    fn splitter() -> TokenSplitter {
        TokenSplitter::new(&TokenConfig::default())
    }

    fn store(designations: &[&str]) -> BTreeSet<String> {
        designations.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn slash_merge_with_both_parts_is_redundant() {
        let existing = store(&["A2", "A2H", "A2/A2H"]);
        let class = splitter().classify("A2/A2H", |part| existing.contains(part));
        assert_eq!(
            class,
            TokenClass::Redundant {
                parts: vec!["A2".to_string(), "A2H".to_string()]
            }
        );
    }

    #[test]
    fn slash_merge_without_parts_is_compound() {
        let existing = store(&["347/347H"]);
        let class = splitter().classify("347/347H", |part| existing.contains(part));
        assert!(matches!(class, TokenClass::Compound { missing } if missing.len() == 2));
    }

    #[test]
    fn one_missing_part_keeps_the_record() {
        let existing = store(&["Elmax", "Elmax/SuperClean"]);
        let class = splitter().classify("Elmax/SuperClean", |part| existing.contains(part));
        assert_eq!(
            class,
            TokenClass::Compound {
                missing: vec!["SuperClean".to_string()]
            }
        );
    }

    #[test]
    fn empty_part_is_malformed() {
        let class = splitter().classify("D2/", |_| true);
        assert!(matches!(class, TokenClass::Malformed { .. }));
    }

    #[test]
    fn concatenations_are_split_by_pattern() {
        let split = splitter().split("1.563475Ni8").unwrap();
        assert_eq!(split.method, SplitMethod::WerkstoffConcat);
        assert_eq!(split.parts, vec!["1.5634", "75Ni8"]);

        let split = splitter().split("T11347M47").unwrap();
        assert_eq!(split.method, SplitMethod::LetterBoundary);
        assert_eq!(split.parts, vec!["T11347", "M47"]);

        assert!(splitter().split("X153CrMoV12").is_none());
        assert!(splitter().split("1.2379").is_none());
    }

    #[test]
    fn unmatched_concatenation_is_plain() {
        let class = splitter().classify("T11347M47", |part| part == "T11347");
        assert_eq!(class, TokenClass::Plain);
    }

    #[test]
    fn concatenation_detection_can_be_disabled() {
        let config = TokenConfig {
            detect_concatenated: false,
            ..TokenConfig::default()
        };
        assert!(TokenSplitter::new(&config).split("1.563475Ni8").is_none());
    }
}
