//! Grade store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide point lookup, filtered scan, insert, partial update, delete and
//!   caller-controlled transactions over the `grades` table.
//! - Keep SQL details inside the persistence boundary so passes only see
//!   `GradeStore`.
//!
//! # Invariants
//! - Write paths validate designation and analogue lists before SQL runs.
//! - Scans are ordered by `id ASC` so every pass sees a stable snapshot order.
//! - Designations are compared and returned trimmed; an update also stores
//!   the designation trimmed.
//! - `in_transaction` commits only when the closure returns `Ok`.

use crate::db::migrations::{latest_version, schema_version};
use crate::db::DbError;
use crate::model::composition::{Composition, Element};
use crate::model::grade::{
    encode_analogues, parse_analogues, Grade, GradeId, GradePatch, GradeValidationError, NewGrade,
};
use log::warn;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const GRADE_BASE_COLUMNS: &str = "id, designation, standard, analogues, link, manufacturer";

pub type RepoResult<T> = Result<T, RepoError>;

/// Store error for grade persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(GradeValidationError),
    Db(DbError),
    /// No record carries this designation.
    NotFound(String),
    /// No record carries this internal id.
    IdNotFound(GradeId),
    /// Connection schema is not at the version this binary expects.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(designation) => write!(f, "grade not found: {designation}"),
            Self::IdNotFound(id) => write!(f, "grade id not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "grade store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted grade data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::IdNotFound(_) => None,
            Self::UninitializedConnection { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<GradeValidationError> for RepoError {
    fn from(value: GradeValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Scan filters. All set filters must match; the default scans everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradeListQuery {
    /// Exact designation match.
    pub designation: Option<String>,
    /// Literal substring the designation must contain.
    pub designation_contains: Option<String>,
    /// Only records with a non-empty analogue list.
    pub with_analogues: bool,
    /// Only records where every key element (C/Cr/Ni/Mo) is empty.
    pub missing_key_chemistry: bool,
}

impl GradeListQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_designation(designation: impl Into<String>) -> Self {
        Self {
            designation: Some(designation.into()),
            ..Self::default()
        }
    }

    pub fn with_analogues() -> Self {
        Self {
            with_analogues: true,
            ..Self::default()
        }
    }

    /// Records matching `grade`, as evaluated by in-memory stores.
    pub fn matches(&self, grade: &Grade) -> bool {
        if let Some(designation) = self.designation.as_deref() {
            if grade.designation != designation.trim() {
                return false;
            }
        }
        if let Some(needle) = self.designation_contains.as_deref() {
            if !grade.designation.contains(needle) {
                return false;
            }
        }
        if self.with_analogues && grade.analogues.is_empty() {
            return false;
        }
        if self.missing_key_chemistry && grade.composition.has_key_elements() {
            return false;
        }
        true
    }
}

/// Record Store interface every reconciliation pass is written against.
pub trait GradeStore {
    /// Lowest-id record carrying `designation`.
    fn get_grade(&self, designation: &str) -> RepoResult<Option<Grade>>;
    /// Records matching `query`, ordered by id.
    fn list_grades(&self, query: &GradeListQuery) -> RepoResult<Vec<Grade>>;
    fn insert_grade(&self, grade: &NewGrade) -> RepoResult<GradeId>;
    /// Applies `patch` to every record carrying `designation`.
    fn update_grade(&self, designation: &str, patch: &GradePatch) -> RepoResult<()>;
    /// Applies `patch` to record `id` only; rows sharing its designation are
    /// left alone.
    fn update_grade_by_id(&self, id: GradeId, patch: &GradePatch) -> RepoResult<()>;
    fn delete_grade(&self, id: GradeId) -> RepoResult<()>;
    /// Deletes every record carrying `designation`; returns the row count.
    fn delete_by_designation(&self, designation: &str) -> RepoResult<usize>;
    /// Runs `f` as one unit of work: commit on `Ok`, roll back on `Err`.
    ///
    /// Nested calls join the outermost transaction.
    fn in_transaction<T, F>(&self, f: F) -> RepoResult<T>
    where
        Self: Sized,
        F: FnOnce(&Self) -> RepoResult<T>;
}

/// SQLite-backed grade store.
pub struct SqliteGradeStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGradeStore<'conn> {
    /// Wraps a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations were not applied.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let actual_version = schema_version(conn)?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }
}

impl GradeStore for SqliteGradeStore<'_> {
    fn get_grade(&self, designation: &str) -> RepoResult<Option<Grade>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM grades WHERE TRIM(designation) = ?1 ORDER BY id ASC LIMIT 1;",
            select_columns()
        ))?;
        let mut rows = stmt.query([designation.trim()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_grade_row(row)?));
        }
        Ok(None)
    }

    fn list_grades(&self, query: &GradeListQuery) -> RepoResult<Vec<Grade>> {
        let mut sql = format!("SELECT {} FROM grades WHERE 1 = 1", select_columns());
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(designation) = query.designation.as_ref() {
            sql.push_str(" AND TRIM(designation) = ?");
            bind_values.push(Value::Text(designation.trim().to_string()));
        }
        if let Some(needle) = query.designation_contains.as_ref() {
            sql.push_str(" AND instr(TRIM(designation), ?) > 0");
            bind_values.push(Value::Text(needle.clone()));
        }
        if query.with_analogues {
            sql.push_str(" AND TRIM(REPLACE(analogues, '|', '')) != ''");
        }
        if query.missing_key_chemistry {
            for element in Element::KEY {
                let column = element.column();
                sql.push_str(&format!(" AND ({column} IS NULL OR TRIM({column}) = '')"));
            }
        }
        sql.push_str(" ORDER BY id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut grades = Vec::new();
        while let Some(row) = rows.next()? {
            grades.push(parse_grade_row(row)?);
        }
        Ok(grades)
    }

    fn insert_grade(&self, grade: &NewGrade) -> RepoResult<GradeId> {
        grade.validate()?;

        let mut columns = vec!["designation", "standard", "analogues", "link", "manufacturer"];
        let mut bind_values = vec![
            Value::Text(grade.designation.trim().to_string()),
            Value::Text(grade.standard.clone()),
            Value::Text(encode_analogues(&grade.analogues)),
            optional_text(grade.link.as_deref()),
            optional_text(grade.manufacturer.as_deref()),
        ];
        for element in Element::ALL {
            columns.push(element.column());
            bind_values.push(optional_text(grade.composition.get(element)));
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        self.conn.execute(
            &format!(
                "INSERT INTO grades ({}) VALUES ({placeholders});",
                columns.join(", ")
            ),
            params_from_iter(bind_values),
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn update_grade(&self, designation: &str, patch: &GradePatch) -> RepoResult<()> {
        let designation = designation.trim();
        if let Some(analogues) = patch.analogues.as_ref() {
            validate_patch_analogues(designation, analogues)?;
        }

        if patch.is_empty() {
            if self.get_grade(designation)?.is_none() {
                return Err(RepoError::NotFound(designation.to_string()));
            }
            return Ok(());
        }

        let (assignments, mut bind_values) = patch_assignments(patch);
        bind_values.push(Value::Text(designation.to_string()));
        let changed = self.conn.execute(
            &format!(
                "UPDATE grades SET {} WHERE TRIM(designation) = ?;",
                assignments.join(", ")
            ),
            params_from_iter(bind_values),
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(designation.to_string()));
        }
        Ok(())
    }

    fn update_grade_by_id(&self, id: GradeId, patch: &GradePatch) -> RepoResult<()> {
        let designation: Option<String> = self
            .conn
            .query_row(
                "SELECT TRIM(designation) FROM grades WHERE id = ?1;",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(designation) = designation else {
            return Err(RepoError::IdNotFound(id));
        };
        if let Some(analogues) = patch.analogues.as_ref() {
            validate_patch_analogues(&designation, analogues)?;
        }
        if patch.is_empty() {
            return Ok(());
        }

        let (assignments, mut bind_values) = patch_assignments(patch);
        bind_values.push(Value::Integer(id));
        self.conn.execute(
            &format!("UPDATE grades SET {} WHERE id = ?;", assignments.join(", ")),
            params_from_iter(bind_values),
        )?;
        Ok(())
    }

    fn delete_grade(&self, id: GradeId) -> RepoResult<()> {
        let changed = self.conn.execute("DELETE FROM grades WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::IdNotFound(id));
        }
        Ok(())
    }

    fn delete_by_designation(&self, designation: &str) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "DELETE FROM grades WHERE TRIM(designation) = ?1;",
            [designation.trim()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(designation.to_string()));
        }
        Ok(changed)
    }

    fn in_transaction<T, F>(&self, f: F) -> RepoResult<T>
    where
        F: FnOnce(&Self) -> RepoResult<T>,
    {
        if !self.conn.is_autocommit() {
            return f(self);
        }

        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        let outcome = f(self).and_then(|value| {
            self.conn.execute_batch("COMMIT;")?;
            Ok(value)
        });

        if outcome.is_err() && !self.conn.is_autocommit() {
            if let Err(err) = self.conn.execute_batch("ROLLBACK;") {
                warn!(
                    "event=store_rollback module=repo status=error error_code=rollback_failed error={}",
                    err
                );
            }
        }
        outcome
    }
}

fn select_columns() -> String {
    let mut columns = String::from(GRADE_BASE_COLUMNS);
    for element in Element::ALL {
        columns.push_str(", ");
        columns.push_str(element.column());
    }
    columns
}

/// `SET` clauses and their bind values for `patch`.
fn patch_assignments(patch: &GradePatch) -> (Vec<String>, Vec<Value>) {
    let mut assignments = vec!["designation = TRIM(designation)".to_string()];
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(standard) = patch.standard.as_ref() {
        assignments.push("standard = ?".to_string());
        bind_values.push(Value::Text(standard.clone()));
    }
    if let Some(analogues) = patch.analogues.as_ref() {
        assignments.push("analogues = ?".to_string());
        bind_values.push(Value::Text(encode_analogues(analogues)));
    }
    if let Some(composition) = patch.composition.as_ref() {
        for element in Element::ALL {
            assignments.push(format!("{} = ?", element.column()));
            bind_values.push(optional_text(composition.get(element)));
        }
    }
    assignments.push("updated_at = (CAST(strftime('%s', 'now') AS INTEGER) * 1000)".to_string());
    (assignments, bind_values)
}

fn parse_grade_row(row: &Row<'_>) -> RepoResult<Grade> {
    // Why: analogue entries are trimmed by the codec, so a padded legacy
    // designation would never match its own back-edges.
    let designation = row.get::<_, String>("designation")?.trim().to_string();
    if designation.is_empty() {
        let id: GradeId = row.get("id")?;
        return Err(RepoError::InvalidData(format!(
            "blank designation in grades.designation for id {id}"
        )));
    }

    let mut composition = Composition::default();
    for element in Element::ALL {
        composition.set(element, row.get::<_, Option<String>>(element.column())?);
    }

    let analogues_raw: Option<String> = row.get("analogues")?;
    Ok(Grade {
        id: row.get("id")?,
        designation,
        standard: row.get::<_, Option<String>>("standard")?.unwrap_or_default(),
        analogues: parse_analogues(analogues_raw.as_deref().unwrap_or_default()),
        composition,
        link: row.get("link")?,
        manufacturer: row.get("manufacturer")?,
    })
}

pub(crate) fn validate_patch_analogues(designation: &str, analogues: &[String]) -> RepoResult<()> {
    for analogue in analogues {
        if analogue.trim().is_empty() {
            return Err(GradeValidationError::BlankAnalogue(designation.to_string()).into());
        }
        if analogue.trim() == designation.trim() {
            return Err(GradeValidationError::SelfReference(designation.to_string()).into());
        }
    }
    Ok(())
}

fn optional_text(value: Option<&str>) -> Value {
    match value {
        Some(text) if !text.trim().is_empty() => Value::Text(text.to_string()),
        _ => Value::Null,
    }
}
