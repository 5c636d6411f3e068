//! Reconciliation tuning knobs.
//!
//! # Responsibility
//! - Load pass settings from TOML, defaulting every missing field.
//! - Reject settings that would make a pass meaningless.
//!
//! # Invariants
//! - `ReconcileConfig::default()` reproduces the documented defaults and
//!   always passes `validate()`.

use crate::service::duplicate_service::SurvivorCriterion;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Top-level configuration shared by every pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Compute and report mutations without applying them.
    pub dry_run: bool,
    pub closure: ClosureConfig,
    pub duplicates: DuplicateConfig,
    pub chemistry: ChemistryConfig,
    pub tokens: TokenConfig,
    pub standards: StandardConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClosureConfig {
    /// Records with fewer analogues than this get the transitive merge.
    pub sparsity_threshold: usize,
    /// Safety bound on full symmetrize+merge passes.
    pub max_iterations: usize,
}

impl Default for ClosureConfig {
    fn default() -> Self {
        Self {
            sparsity_threshold: 20,
            max_iterations: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    /// Substrings marking a provenance as lower trust. Matched against the
    /// link and the standard field.
    pub low_trust_markers: Vec<String>,
    /// Ranking criteria in priority order. The lowest id always breaks the
    /// final tie, even when `EarliestCreated` is omitted.
    pub criteria: Vec<SurvivorCriterion>,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            low_trust_markers: vec!["zknives.com".to_string()],
            criteria: SurvivorCriterion::DEFAULT_ORDER.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChemistryConfig {
    /// How many analogues are consulted per candidate.
    pub donor_scan_limit: usize,
}

impl Default for ChemistryConfig {
    fn default() -> Self {
        Self {
            donor_scan_limit: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Separators that suggest two designations were merged.
    pub delimiters: Vec<String>,
    /// Also detect delimiter-free concatenations such as `1.563475Ni8`.
    pub detect_concatenated: bool,
    /// Link the parts of a deleted merged designation as analogues of each
    /// other.
    pub link_parts: bool,
    /// Remove a deleted merged designation from other analogue lists.
    pub scrub_references: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            delimiters: vec!["/".to_string()],
            detect_concatenated: true,
            link_parts: true,
            scrub_references: true,
        }
    }
}

/// Standard family with a fixed canonical label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardFamily {
    /// Canonical family name, e.g. `GOST`.
    pub name: String,
    /// Country written after the family name.
    pub country: String,
    /// Extra spellings recognized as this family, e.g. `ГОСТ`.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl StandardFamily {
    pub fn new(name: &str, country: &str, aliases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            country: country.to_string(),
            aliases: aliases.iter().map(|alias| alias.to_string()).collect(),
        }
    }

    /// Canonical `family, country` label.
    pub fn label(&self) -> String {
        format!("{}, {}", self.name, self.country)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardConfig {
    /// Families in match priority order.
    pub families: Vec<StandardFamily>,
}

impl Default for StandardConfig {
    fn default() -> Self {
        Self {
            families: vec![
                StandardFamily::new("GOST", "Russia", &["ГОСТ"]),
                StandardFamily::new("DIN", "Germany", &[]),
                StandardFamily::new("AISI", "USA", &[]),
                StandardFamily::new("ASTM", "USA", &[]),
                StandardFamily::new("SAE", "USA", &[]),
                StandardFamily::new("UNS", "USA", &[]),
                StandardFamily::new("JIS", "Japan", &[]),
                StandardFamily::new("GB", "China", &[]),
                StandardFamily::new("ISO", "International", &[]),
                StandardFamily::new("EN", "Europe", &[]),
            ],
        }
    }
}

/// Configuration load and validation failures.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(String),
    Validation(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse(message) => write!(f, "config parse error: {message}"),
            Self::Validation(message) => write!(f, "config validation error: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(_) => None,
            Self::Validation(_) => None,
        }
    }
}

impl ReconcileConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.closure.sparsity_threshold == 0 {
            return Err(ConfigError::Validation(
                "closure.sparsity_threshold must be at least 1".to_string(),
            ));
        }
        if self.closure.max_iterations == 0 {
            return Err(ConfigError::Validation(
                "closure.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.chemistry.donor_scan_limit == 0 {
            return Err(ConfigError::Validation(
                "chemistry.donor_scan_limit must be at least 1".to_string(),
            ));
        }
        if self.tokens.delimiters.iter().any(|d| d.is_empty()) {
            return Err(ConfigError::Validation(
                "tokens.delimiters cannot contain an empty delimiter".to_string(),
            ));
        }
        if self.tokens.delimiters.is_empty() && !self.tokens.detect_concatenated {
            return Err(ConfigError::Validation(
                "tokens needs at least one delimiter or detect_concatenated = true".to_string(),
            ));
        }
        for family in &self.standards.families {
            if family.name.trim().is_empty() || family.country.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "standards.families entries need a name and a country".to_string(),
                ));
            }
        }
        Ok(())
    }
}
