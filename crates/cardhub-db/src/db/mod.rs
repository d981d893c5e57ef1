//! Database repositories for the data access layer
//!
//! `reconcile` holds the generic child-collection reconciler; `card` and `invitation` are the
//! aggregate repositories built on it.

pub mod card;
pub mod invitation;
pub mod pool;
pub mod reconcile;
pub mod transaction;

pub use card::CardRepository;
pub use invitation::InvitationRepository;
pub use pool::setup_database;
pub use reconcile::{reconcile, ChildRecord, ReconcileOutcome, ReconcilePlan};
pub use transaction::with_transaction;

/// A committed aggregate update.
#[derive(Debug, Clone, PartialEq)]
pub struct Updated<T> {
    pub record: T,
    /// Media filename the record referenced when the update locked it and no longer does.
    pub replaced_media: Option<String>,
}

/// Filename a write stopped referencing: the locked `current` value, when `new` replaced it.
pub(crate) fn replaced_media(new: Option<&str>, current: Option<String>) -> Option<String> {
    match (new, current) {
        (Some(new), Some(current)) if new != current => Some(current),
        _ => None,
    }
}
