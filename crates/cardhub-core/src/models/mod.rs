pub mod card;
pub mod invitation;
pub mod media;

pub use card::{
    Card, CardBank, CardBankRequest, CardRequest, CardSocialMedia, CardSocialMediaRequest,
};
pub use invitation::{Invitation, InvitationDetail, InvitationDetailRequest, InvitationRequest};
pub use media::{MediaCategory, MediaUpload};
