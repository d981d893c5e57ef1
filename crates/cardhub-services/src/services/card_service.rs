//! Card operations: slug pre-flight, photo staging and the transactional write.

use std::sync::Arc;

use cardhub_core::models::{Card, CardRequest, MediaCategory, MediaUpload};
use cardhub_core::{AppError, DbId};
use cardhub_db::CardRepository;
use validator::Validate;

use super::media_lifecycle::MediaLifecycleService;

#[derive(Clone)]
pub struct CardService {
    cards: CardRepository,
    media: Arc<MediaLifecycleService>,
}

impl CardService {
    pub fn new(cards: CardRepository, media: Arc<MediaLifecycleService>) -> Self {
        Self { cards, media }
    }

    /// Create a card owned by `actor_id`, storing `photo` if one was uploaded.
    #[tracing::instrument(skip(self, request, photo), fields(card.slug = %request.slug))]
    pub async fn create_card(
        &self,
        actor_id: DbId,
        request: CardRequest,
        photo: Option<MediaUpload>,
    ) -> Result<Card, AppError> {
        request.validate()?;
        self.ensure_slug_available(&request.slug, None).await?;

        let mut card = Card::from_request(actor_id, request);
        let cards = &self.cards;

        let card = self
            .media
            .write_with_media(MediaCategory::Cards, photo, |filename| async move {
                card.photo = filename;
                Ok((cards.create_with_relations(card).await?, None))
            })
            .await?;

        tracing::info!(card_id = ?card.id, slug = %card.slug, "Card created");
        Ok(card)
    }

    /// Apply `request` to card `id`, reconciling its banks and social media.
    ///
    /// A new `photo` replaces whatever the card references when its row is locked. That file is
    /// removed only after the update has committed; without a `photo` the stored one is kept.
    #[tracing::instrument(skip(self, request, photo), fields(card.id = %id))]
    pub async fn update_card(
        &self,
        actor_id: DbId,
        id: DbId,
        request: CardRequest,
        photo: Option<MediaUpload>,
    ) -> Result<Card, AppError> {
        request.validate()?;

        let mut card = self
            .cards
            .get_card(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Card {} not found", id)))?;

        if request.slug.trim() != card.slug {
            self.ensure_slug_available(request.slug.trim(), Some(id))
                .await?;
        }

        card.apply_request(request);
        let cards = &self.cards;

        let card = self
            .media
            .write_with_media(MediaCategory::Cards, photo, |filename| async move {
                let updated = cards.update_with_relations(card, actor_id, filename).await?;
                Ok((updated.record, updated.replaced_media))
            })
            .await?;

        tracing::info!(card_id = %id, actor_id = %actor_id, "Card updated");
        Ok(card)
    }

    /// Delete card `id`. Under the hard policy its photo is removed once the delete commits.
    #[tracing::instrument(skip(self), fields(card.id = %id))]
    pub async fn delete_card(&self, id: DbId) -> Result<(), AppError> {
        let photo = self.cards.delete_with_relations(id).await?;

        if !self.cards.delete_policy().is_soft() {
            if let Some(photo) = photo {
                self.media.retire(MediaCategory::Cards, &photo).await;
            }
        }

        tracing::info!(card_id = %id, policy = %self.cards.delete_policy(), "Card deleted");
        Ok(())
    }

    pub async fn get_card(&self, id: DbId) -> Result<Option<Card>, AppError> {
        self.cards.get_card(id).await
    }

    pub async fn is_slug_available(
        &self,
        slug: &str,
        exclude_id: Option<DbId>,
    ) -> Result<bool, AppError> {
        self.cards.is_slug_available(slug, exclude_id).await
    }

    async fn ensure_slug_available(
        &self,
        slug: &str,
        exclude_id: Option<DbId>,
    ) -> Result<(), AppError> {
        if self.cards.is_slug_available(slug, exclude_id).await? {
            Ok(())
        } else {
            Err(AppError::Conflict(format!("Slug '{}' is already in use", slug)))
        }
    }
}
