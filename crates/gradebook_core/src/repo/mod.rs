//! Record Store abstraction and persistence implementations.
//!
//! # Responsibility
//! - Define the `GradeStore` contract every reconciliation pass is written
//!   against.
//! - Isolate SQLite query details from pass logic.
//!
//! # Invariants
//! - Stores return semantic errors (`NotFound`, `Validation`) in addition to
//!   DB transport errors.
//! - One transaction boundary is controlled by the caller per unit of work.

pub mod grade_repo;
pub mod memory_repo;
