pub mod card_service;
pub mod invitation_service;
pub mod media_lifecycle;
