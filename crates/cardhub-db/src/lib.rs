//! CardHub database layer
//!
//! Repositories that persist cards and invitations as aggregates: the parent row and its
//! owned child collections are always written in one transaction.

pub mod db;

pub use db::{
    reconcile, setup_database, with_transaction, CardRepository, ChildRecord,
    InvitationRepository, ReconcileOutcome, ReconcilePlan, Updated,
};

/// Migrations embedded from the workspace `migrations/` directory.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");
