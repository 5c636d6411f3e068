//! Core reconciliation engine for the material grade reference dataset.
//! This crate is the single source of truth for grade record invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, ReconcileConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, flush_logging, init_logging, logging_status};
pub use model::composition::{Composition, Element};
pub use model::grade::{Grade, GradeId, GradePatch, GradeValidationError, NewGrade};
pub use model::report::{Issue, PassKind, PassReport};
pub use repo::grade_repo::{
    GradeListQuery, GradeStore, RepoError, RepoResult, SqliteGradeStore,
};
pub use repo::memory_repo::MemoryGradeStore;
pub use service::reconciler::{Reconciler, RECOMMENDED_ORDER};
pub use service::{ReconcileError, ReconcileResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
