//! Pass orchestration.
//!
//! # Responsibility
//! - Dispatch a single pass by kind with the shared configuration.
//! - Run every pass in the order that converges fastest.
//!
//! # Invariants
//! - Passes share no in-process state; each re-reads the store.
//! - A store failure stops the run; earlier reports stay committed.

use crate::config::ReconcileConfig;
use crate::model::report::{PassKind, PassReport};
use crate::repo::grade_repo::GradeStore;
use crate::service::chemistry_service::ChemistryService;
use crate::service::closure_service::ClosureService;
use crate::service::duplicate_service::DuplicateService;
use crate::service::standard_service::StandardService;
use crate::service::token_service::TokenService;
use crate::service::ReconcileResult;
use log::{error, info};

/// Duplicates and merged designations are removed before the closure so
/// dead designations are not propagated; chemistry runs on the closed graph.
pub const RECOMMENDED_ORDER: [PassKind; 5] = [
    PassKind::Duplicates,
    PassKind::Tokens,
    PassKind::Closure,
    PassKind::Chemistry,
    PassKind::Standards,
];

/// Runs reconciliation passes against one store.
pub struct Reconciler<'s, S: GradeStore> {
    store: &'s S,
    config: ReconcileConfig,
}

impl<'s, S: GradeStore> Reconciler<'s, S> {
    /// Validates `config` up front so no pass starts with bad settings.
    pub fn new(store: &'s S, config: ReconcileConfig) -> ReconcileResult<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn run_pass(&self, pass: PassKind) -> ReconcileResult<PassReport> {
        let dry_run = self.config.dry_run;
        info!(
            "event=pass_start module={} status=start dry_run={}",
            pass, dry_run
        );
        let result = match pass {
            PassKind::Closure => ClosureService::new(self.store, self.config.closure.clone())
                .dry_run(dry_run)
                .run(),
            PassKind::Duplicates => {
                DuplicateService::new(self.store, self.config.duplicates.clone())
                    .dry_run(dry_run)
                    .run()
            }
            PassKind::Chemistry => {
                ChemistryService::new(self.store, self.config.chemistry.clone())
                    .dry_run(dry_run)
                    .run()
            }
            PassKind::Tokens => TokenService::new(self.store, self.config.tokens.clone())
                .dry_run(dry_run)
                .run(),
            PassKind::Standards => {
                StandardService::new(self.store, self.config.standards.clone())
                    .dry_run(dry_run)
                    .run()
            }
        };
        if let Err(err) = &result {
            error!(
                "event=pass_failed module={} status=error error={}",
                pass, err
            );
        }
        result
    }

    /// Runs every pass in [`RECOMMENDED_ORDER`].
    pub fn run_all(&self) -> ReconcileResult<Vec<PassReport>> {
        RECOMMENDED_ORDER
            .iter()
            .map(|pass| self.run_pass(*pass))
            .collect()
    }
}
