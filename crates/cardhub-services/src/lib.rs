//! CardHub Services Layer
//!
//! Request-level orchestration on top of the repositories and the file store. The
//! services run uniqueness pre-flights, stage uploads around the aggregate writer and
//! retire files that are no longer referenced. Callers pass the acting user explicitly.

pub mod services;
pub mod telemetry;

pub use services::card_service::CardService;
pub use services::invitation_service::{generate_invitation_key, InvitationService};
pub use services::media_lifecycle::{MediaLifecycleService, MediaLimits, StagedMedia};
pub use telemetry::init_tracing;
