//! Grade domain model.
//!
//! # Responsibility
//! - Define the canonical material-grade record and its write shapes.
//! - Own the analogue-list storage codec.
//!
//! # Invariants
//! - `designation` is non-blank.
//! - A grade never lists its own designation as an analogue.
//! - Analogue lists carry no duplicates and no blank entries.

use crate::model::composition::Composition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Internal monotonic identifier assigned by the store at insert time.
///
/// Only used as the last-resort tie-break key; designations are the
/// identity callers work with.
pub type GradeId = i64;

/// Delimiter used by the analogue column. Designations may contain spaces
/// (`Conqueror SuperClean`), so whitespace is not a separator.
pub const ANALOGUE_DELIMITER: char = '|';

/// Persisted grade record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grade {
    pub id: GradeId,
    pub designation: String,
    /// Free-text standard descriptor, possibly with a country annotation.
    pub standard: String,
    /// Equivalent designations in stored order.
    pub analogues: Vec<String>,
    pub composition: Composition,
    /// Provenance URL. `None` when the source is unknown.
    pub link: Option<String>,
    pub manufacturer: Option<String>,
}

impl Grade {
    /// Validates record invariants.
    pub fn validate(&self) -> Result<(), GradeValidationError> {
        validate_parts(&self.designation, &self.analogues)
    }

    pub fn has_link(&self) -> bool {
        self.link
            .as_deref()
            .is_some_and(|link| !link.trim().is_empty())
    }

    /// Analogues in the deterministic order every pass consults them:
    /// lexicographic by designation, own designation excluded.
    pub fn ordered_analogues(&self) -> Vec<&str> {
        let mut ordered: Vec<&str> = self
            .analogues
            .iter()
            .map(String::as_str)
            .filter(|analogue| *analogue != self.designation)
            .collect();
        ordered.sort_unstable();
        ordered.dedup();
        ordered
    }

    /// Analogue set with own designation removed.
    pub fn analogue_set(&self) -> BTreeSet<String> {
        self.analogues
            .iter()
            .filter(|analogue| **analogue != self.designation)
            .cloned()
            .collect()
    }
}

/// Insert shape: everything except the store-assigned id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewGrade {
    pub designation: String,
    pub standard: String,
    pub analogues: Vec<String>,
    pub composition: Composition,
    pub link: Option<String>,
    pub manufacturer: Option<String>,
}

impl NewGrade {
    pub fn new(designation: impl Into<String>) -> Self {
        Self {
            designation: designation.into(),
            ..Self::default()
        }
    }

    pub fn with_standard(mut self, standard: impl Into<String>) -> Self {
        self.standard = standard.into();
        self
    }

    pub fn with_analogues<I, S>(mut self, analogues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.analogues = analogues.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_composition(mut self, composition: Composition) -> Self {
        self.composition = composition;
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn validate(&self) -> Result<(), GradeValidationError> {
        validate_parts(&self.designation, &self.analogues)
    }
}

/// Partial update applied by designation or by id. `None` leaves a field
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradePatch {
    pub standard: Option<String>,
    pub analogues: Option<Vec<String>>,
    /// Replaces the whole composition row. Callers that must not overwrite
    /// populated fields merge with [`Composition::fill_from`] first.
    pub composition: Option<Composition>,
}

impl GradePatch {
    pub fn analogues(analogues: Vec<String>) -> Self {
        Self {
            analogues: Some(analogues),
            ..Self::default()
        }
    }

    pub fn composition(composition: Composition) -> Self {
        Self {
            composition: Some(composition),
            ..Self::default()
        }
    }

    pub fn standard(standard: impl Into<String>) -> Self {
        Self {
            standard: Some(standard.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.standard.is_none() && self.analogues.is_none() && self.composition.is_none()
    }
}

/// Write-path validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradeValidationError {
    EmptyDesignation,
    SelfReference(String),
    BlankAnalogue(String),
}

impl Display for GradeValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyDesignation => write!(f, "grade designation cannot be blank"),
            Self::SelfReference(designation) => {
                write!(f, "grade `{designation}` lists itself as an analogue")
            }
            Self::BlankAnalogue(designation) => {
                write!(f, "grade `{designation}` has a blank analogue entry")
            }
        }
    }
}

impl Error for GradeValidationError {}

fn validate_parts(designation: &str, analogues: &[String]) -> Result<(), GradeValidationError> {
    if designation.trim().is_empty() {
        return Err(GradeValidationError::EmptyDesignation);
    }
    for analogue in analogues {
        if analogue.trim().is_empty() {
            return Err(GradeValidationError::BlankAnalogue(designation.to_string()));
        }
        if analogue == designation {
            return Err(GradeValidationError::SelfReference(designation.to_string()));
        }
    }
    Ok(())
}

/// Decodes the analogue column. Entries are trimmed, blanks dropped and
/// duplicates removed keeping the first occurrence.
pub fn parse_analogues(raw: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    raw.split(ANALOGUE_DELIMITER)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter(|entry| seen.insert(*entry))
        .map(str::to_string)
        .collect()
}

/// Encodes an analogue list for storage.
pub fn encode_analogues(analogues: &[String]) -> String {
    let mut encoded = String::new();
    for analogue in analogues {
        let trimmed = analogue.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !encoded.is_empty() {
            encoded.push(ANALOGUE_DELIMITER);
        }
        encoded.push_str(trimmed);
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::{encode_analogues, parse_analogues, Grade, GradeValidationError, NewGrade};
    use crate::model::composition::Composition;

    fn grade(designation: &str, analogues: &[&str]) -> Grade {
        Grade {
            id: 1,
            designation: designation.to_string(),
            standard: String::new(),
            analogues: analogues.iter().map(|a| a.to_string()).collect(),
            composition: Composition::default(),
            link: None,
            manufacturer: None,
        }
    }

    #[test]
    fn parse_keeps_multi_word_designations() {
        let parsed = parse_analogues(" Conqueror SuperClean |D2| |1.2379|D2");
        assert_eq!(parsed, vec!["Conqueror SuperClean", "D2", "1.2379"]);
    }

    #[test]
    fn encode_skips_blank_entries() {
        let encoded = encode_analogues(&["A2".to_string(), " ".to_string(), "1.2363".to_string()]);
        assert_eq!(encoded, "A2|1.2363");
        assert_eq!(parse_analogues(&encoded), vec!["A2", "1.2363"]);
    }

    #[test]
    fn ordered_analogues_are_lexicographic_and_exclude_self() {
        let grade = grade("X1", &["Z9", "X1", "B2", "Z9"]);
        assert_eq!(grade.ordered_analogues(), vec!["B2", "Z9"]);
    }

    #[test]
    fn validation_rejects_self_reference_and_blank_designation() {
        let err = NewGrade::new("D2")
            .with_analogues(["1.2379", "D2"])
            .validate()
            .unwrap_err();
        assert_eq!(err, GradeValidationError::SelfReference("D2".to_string()));

        let err = NewGrade::new("  ").validate().unwrap_err();
        assert_eq!(err, GradeValidationError::EmptyDesignation);
    }

    #[test]
    fn has_link_ignores_blank_links() {
        let mut record = grade("H13", &[]);
        record.link = Some("  ".to_string());
        assert!(!record.has_link());
        record.link = Some("https://example.com/h13".to_string());
        assert!(record.has_link());
    }
}
