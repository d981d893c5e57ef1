use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::DbId;

static SLUG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid regex"));

/// Digital business card aggregate.
///
/// `id` is `None` until the card has been persisted. The child collections are owned by the
/// card and are written together with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: Option<DbId>,
    pub user_id: DbId,
    pub name: String,
    pub slug: String,
    pub title: Option<String>,
    pub photo: Option<String>,
    pub telephone: Option<String>,
    pub email: Option<String>,
    pub location: Option<String>,
    pub website_url: Option<String>,
    pub store_url: Option<String>,
    pub is_active: bool,
    pub updated_by: Option<DbId>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub banks: Vec<CardBank>,
    #[serde(default)]
    pub social_media: Vec<CardSocialMedia>,
}

/// Bank account attached to a card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardBank {
    pub id: Option<DbId>,
    pub bank_id: DbId,
    pub iban: String,
}

/// Social network profile attached to a card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSocialMedia {
    pub id: Option<DbId>,
    pub social_media_id: DbId,
    pub url: String,
}

fn blank_to_none(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if SLUG_PATTERN.is_match(slug) {
        Ok(())
    } else {
        let mut err = ValidationError::new("slug");
        err.message = Some("Slug may only contain lowercase letters, digits and hyphens".into());
        Err(err)
    }
}

/// Request DTO for creating or updating a card
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CardRequest {
    #[validate(length(min = 2, max = 255, message = "Name must be at least 2 characters"))]
    pub name: String,
    #[validate(
        length(min = 1, max = 255, message = "Slug is required"),
        custom(function = "validate_slug")
    )]
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub telephone: String,
    #[serde(default)]
    #[validate(email(message = "Email must be a valid address"))]
    pub email: Option<String>,
    #[serde(default)]
    #[validate(url(message = "Location must be a valid URL"))]
    pub location: Option<String>,
    #[serde(default)]
    #[validate(url(message = "Website must be a valid URL"))]
    pub website_url: Option<String>,
    #[serde(default)]
    #[validate(url(message = "Store must be a valid URL"))]
    pub store_url: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    #[validate(nested)]
    pub banks: Vec<CardBankRequest>,
    #[serde(default)]
    #[validate(nested)]
    pub social_media: Vec<CardSocialMediaRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Validate)]
pub struct CardBankRequest {
    #[serde(default)]
    pub id: Option<DbId>,
    #[validate(range(min = 1, message = "Bank is required"))]
    pub bank_id: DbId,
    #[validate(length(min = 1, max = 64, message = "IBAN is required"))]
    pub iban: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Validate)]
pub struct CardSocialMediaRequest {
    #[serde(default)]
    pub id: Option<DbId>,
    #[validate(range(min = 1, message = "Social network is required"))]
    pub social_media_id: DbId,
    #[validate(url(message = "Profile must be a valid URL"))]
    pub url: String,
}

impl From<CardBankRequest> for CardBank {
    fn from(req: CardBankRequest) -> Self {
        CardBank {
            id: req.id.filter(|id| *id > 0),
            bank_id: req.bank_id,
            iban: req.iban.trim().to_string(),
        }
    }
}

impl From<CardSocialMediaRequest> for CardSocialMedia {
    fn from(req: CardSocialMediaRequest) -> Self {
        CardSocialMedia {
            id: req.id.filter(|id| *id > 0),
            social_media_id: req.social_media_id,
            url: req.url.trim().to_string(),
        }
    }
}

impl Card {
    /// Build an unpersisted card owned by `user_id` from a validated request.
    pub fn from_request(user_id: DbId, req: CardRequest) -> Self {
        let mut card = Card {
            id: None,
            user_id,
            name: String::new(),
            slug: String::new(),
            title: None,
            photo: None,
            telephone: None,
            email: None,
            location: None,
            website_url: None,
            store_url: None,
            is_active: false,
            updated_by: None,
            created_at: None,
            updated_at: None,
            banks: Vec::new(),
            social_media: Vec::new(),
        };
        card.apply_request(req);
        card
    }

    /// Copy request scalars onto the card and replace both desired child lists.
    ///
    /// Child rows carry their optional ids, so rows kept by the caller are updated in place
    /// and everything else is reconciled away.
    pub fn apply_request(&mut self, req: CardRequest) {
        self.name = req.name.trim().to_string();
        self.slug = req.slug.trim().to_string();
        self.title = blank_to_none(&req.title);
        self.telephone = blank_to_none(&req.telephone);
        self.email = req.email.as_deref().and_then(blank_to_none);
        self.location = req.location.as_deref().and_then(blank_to_none);
        self.website_url = req.website_url.as_deref().and_then(blank_to_none);
        self.store_url = req.store_url.as_deref().and_then(blank_to_none);
        self.is_active = req.is_active;
        self.banks = req.banks.into_iter().map(CardBank::from).collect();
        self.social_media = req
            .social_media
            .into_iter()
            .map(CardSocialMedia::from)
            .collect();
    }
}
