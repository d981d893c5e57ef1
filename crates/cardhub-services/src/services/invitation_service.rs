//! Invitation operations: key generation, image staging and the transactional write.

use std::sync::Arc;

use cardhub_core::models::{Invitation, InvitationRequest, MediaCategory, MediaUpload};
use cardhub_core::{AppError, DbId};
use cardhub_db::InvitationRepository;
use uuid::Uuid;
use validator::Validate;

use super::media_lifecycle::MediaLifecycleService;

const INVITATION_KEY_LEN: usize = 12;
const MAX_KEY_ATTEMPTS: usize = 5;

/// Random public key for an invitation: 12 lowercase hex characters.
pub fn generate_invitation_key() -> String {
    let mut key = Uuid::new_v4().simple().to_string();
    key.truncate(INVITATION_KEY_LEN);
    key
}

#[derive(Clone)]
pub struct InvitationService {
    invitations: InvitationRepository,
    media: Arc<MediaLifecycleService>,
}

impl InvitationService {
    pub fn new(invitations: InvitationRepository, media: Arc<MediaLifecycleService>) -> Self {
        Self { invitations, media }
    }

    /// Create an invitation owned by `actor_id` under a freshly generated key.
    #[tracing::instrument(skip(self, request, image))]
    pub async fn create_invitation(
        &self,
        actor_id: DbId,
        request: InvitationRequest,
        image: Option<MediaUpload>,
    ) -> Result<Invitation, AppError> {
        request.validate()?;
        let key = self.unused_key().await?;

        let mut invitation = Invitation::from_request(actor_id, key, request);
        let invitations = &self.invitations;

        let invitation = self
            .media
            .write_with_media(
                MediaCategory::Invitations,
                image,
                |filename| async move {
                    invitation.image = filename;
                    Ok((invitations.create_with_relations(invitation).await?, None))
                },
            )
            .await?;

        tracing::info!(
            invitation_id = ?invitation.id,
            invitation_key = %invitation.invitation_key,
            "Invitation created"
        );
        Ok(invitation)
    }

    /// Apply `request` to invitation `id`. The existing detail row is updated in place.
    #[tracing::instrument(skip(self, request, image), fields(invitation.id = %id))]
    pub async fn update_invitation(
        &self,
        actor_id: DbId,
        id: DbId,
        request: InvitationRequest,
        image: Option<MediaUpload>,
    ) -> Result<Invitation, AppError> {
        request.validate()?;

        let mut invitation = self
            .invitations
            .get_invitation(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Invitation {} not found", id)))?;

        invitation.apply_request(request);
        let invitations = &self.invitations;

        let invitation = self
            .media
            .write_with_media(
                MediaCategory::Invitations,
                image,
                |filename| async move {
                    let updated = invitations
                        .update_with_relations(invitation, actor_id, filename)
                        .await?;
                    Ok((updated.record, updated.replaced_media))
                },
            )
            .await?;

        tracing::info!(invitation_id = %id, actor_id = %actor_id, "Invitation updated");
        Ok(invitation)
    }

    #[tracing::instrument(skip(self), fields(invitation.id = %id))]
    pub async fn delete_invitation(&self, id: DbId) -> Result<(), AppError> {
        let image = self.invitations.delete_with_relations(id).await?;

        if !self.invitations.delete_policy().is_soft() {
            if let Some(image) = image {
                self.media.retire(MediaCategory::Invitations, &image).await;
            }
        }

        tracing::info!(invitation_id = %id, "Invitation deleted");
        Ok(())
    }

    pub async fn get_invitation(&self, id: DbId) -> Result<Option<Invitation>, AppError> {
        self.invitations.get_invitation(id).await
    }

    pub async fn get_invitation_by_key(&self, key: &str) -> Result<Option<Invitation>, AppError> {
        self.invitations.get_invitation_by_key(key).await
    }

    pub async fn is_key_available(
        &self,
        key: &str,
        exclude_id: Option<DbId>,
    ) -> Result<bool, AppError> {
        self.invitations.is_key_available(key, exclude_id).await
    }

    async fn unused_key(&self) -> Result<String, AppError> {
        for _ in 0..MAX_KEY_ATTEMPTS {
            let key = generate_invitation_key();
            if self.invitations.is_key_available(&key, None).await? {
                return Ok(key);
            }
            tracing::debug!(invitation_key = %key, "Generated invitation key already in use");
        }

        Err(AppError::Internal(format!(
            "Could not generate an unused invitation key after {} attempts",
            MAX_KEY_ATTEMPTS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_key_shape() {
        let key = generate_invitation_key();
        assert_eq!(key.len(), INVITATION_KEY_LEN);
        assert!(key
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_generated_keys_differ() {
        assert_ne!(generate_invitation_key(), generate_invitation_key());
    }
}
