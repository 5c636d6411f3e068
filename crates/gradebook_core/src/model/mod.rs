//! Grade domain model.
//!
//! # Responsibility
//! - Define the grade record, its typed composition and write shapes.
//! - Define the counts report every reconciliation pass returns.
//!
//! # Invariants
//! - Every grade carries a store-assigned monotonic `GradeId`.
//! - Designations are the identity passes reason about; ids only break ties.

pub mod composition;
pub mod grade;
pub mod report;
