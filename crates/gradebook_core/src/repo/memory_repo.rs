//! In-memory grade store.
//!
//! # Responsibility
//! - Implement `GradeStore` without SQLite so pass logic can be exercised
//!   against a fake store.
//! - Allow tests to inject write failures and observe rollback behavior.
//!
//! # Invariants
//! - Ids are assigned monotonically and never reused.
//! - A failed outermost transaction restores the pre-transaction rows.

use crate::model::grade::{parse_analogues, Grade, GradeId, GradePatch, NewGrade};
use crate::repo::grade_repo::{
    validate_patch_analogues, GradeListQuery, GradeStore, RepoError, RepoResult,
};
use std::cell::RefCell;
use std::collections::BTreeSet;

#[derive(Debug, Default)]
struct MemoryState {
    next_id: GradeId,
    rows: Vec<Grade>,
    depth: usize,
    failing: BTreeSet<String>,
}

/// `GradeStore` over a `Vec<Grade>`, single-threaded like the passes.
#[derive(Debug, Default)]
pub struct MemoryGradeStore {
    state: RefCell<MemoryState>,
}

impl MemoryGradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every update or delete touching `designation` fail with an
    /// `InvalidData` error.
    pub fn inject_write_failure(&self, designation: impl Into<String>) {
        self.state.borrow_mut().failing.insert(designation.into());
    }

    pub fn clear_write_failures(&self) {
        self.state.borrow_mut().failing.clear();
    }

    /// Number of stored rows, duplicates included.
    pub fn len(&self) -> usize {
        self.state.borrow().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self, designation: &str) -> RepoResult<()> {
        if self.state.borrow().failing.contains(designation) {
            return Err(RepoError::InvalidData(format!(
                "injected write failure for `{designation}`"
            )));
        }
        Ok(())
    }
}

impl GradeStore for MemoryGradeStore {
    fn get_grade(&self, designation: &str) -> RepoResult<Option<Grade>> {
        Ok(self
            .state
            .borrow()
            .rows
            .iter()
            .find(|grade| grade.designation == designation.trim())
            .cloned())
    }

    fn list_grades(&self, query: &GradeListQuery) -> RepoResult<Vec<Grade>> {
        Ok(self
            .state
            .borrow()
            .rows
            .iter()
            .filter(|grade| query.matches(grade))
            .cloned()
            .collect())
    }

    fn insert_grade(&self, grade: &NewGrade) -> RepoResult<GradeId> {
        grade.validate()?;

        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        // Round-trip through the codec so the fake normalizes like SQLite.
        let analogues = parse_analogues(&grade.analogues.join("|"));
        state.rows.push(Grade {
            id,
            designation: grade.designation.trim().to_string(),
            standard: grade.standard.clone(),
            analogues,
            composition: grade.composition.clone(),
            link: grade.link.clone().filter(|link| !link.trim().is_empty()),
            manufacturer: grade.manufacturer.clone(),
        });
        Ok(id)
    }

    fn update_grade(&self, designation: &str, patch: &GradePatch) -> RepoResult<()> {
        if let Some(analogues) = patch.analogues.as_ref() {
            validate_patch_analogues(designation, analogues)?;
        }
        self.check_writable(designation)?;

        let designation = designation.trim();
        let mut state = self.state.borrow_mut();
        let mut changed = 0;
        for grade in state
            .rows
            .iter_mut()
            .filter(|grade| grade.designation == designation)
        {
            apply_patch(grade, patch);
            changed += 1;
        }

        if changed == 0 {
            return Err(RepoError::NotFound(designation.to_string()));
        }
        Ok(())
    }

    fn update_grade_by_id(&self, id: GradeId, patch: &GradePatch) -> RepoResult<()> {
        let designation = self
            .state
            .borrow()
            .rows
            .iter()
            .find(|grade| grade.id == id)
            .map(|grade| grade.designation.clone())
            .ok_or(RepoError::IdNotFound(id))?;
        if let Some(analogues) = patch.analogues.as_ref() {
            validate_patch_analogues(&designation, analogues)?;
        }
        self.check_writable(&designation)?;

        let mut state = self.state.borrow_mut();
        if let Some(grade) = state.rows.iter_mut().find(|grade| grade.id == id) {
            apply_patch(grade, patch);
        }
        Ok(())
    }

    fn delete_grade(&self, id: GradeId) -> RepoResult<()> {
        let designation = self
            .state
            .borrow()
            .rows
            .iter()
            .find(|grade| grade.id == id)
            .map(|grade| grade.designation.clone())
            .ok_or(RepoError::IdNotFound(id))?;
        self.check_writable(&designation)?;

        self.state.borrow_mut().rows.retain(|grade| grade.id != id);
        Ok(())
    }

    fn delete_by_designation(&self, designation: &str) -> RepoResult<usize> {
        self.check_writable(designation)?;

        let mut state = self.state.borrow_mut();
        let before = state.rows.len();
        state.rows.retain(|grade| grade.designation != designation.trim());
        let removed = before - state.rows.len();
        if removed == 0 {
            return Err(RepoError::NotFound(designation.to_string()));
        }
        Ok(removed)
    }

    fn in_transaction<T, F>(&self, f: F) -> RepoResult<T>
    where
        F: FnOnce(&Self) -> RepoResult<T>,
    {
        let snapshot = {
            let mut state = self.state.borrow_mut();
            state.depth += 1;
            (state.depth == 1).then(|| state.rows.clone())
        };

        let outcome = f(self);

        let mut state = self.state.borrow_mut();
        state.depth -= 1;
        if outcome.is_err() {
            if let Some(rows) = snapshot {
                state.rows = rows;
            }
        }
        outcome
    }
}

fn apply_patch(grade: &mut Grade, patch: &GradePatch) {
    if let Some(standard) = patch.standard.as_ref() {
        grade.standard = standard.clone();
    }
    if let Some(analogues) = patch.analogues.as_ref() {
        grade.analogues = parse_analogues(&analogues.join("|"));
    }
    if let Some(composition) = patch.composition.as_ref() {
        grade.composition = composition.clone();
    }
}
