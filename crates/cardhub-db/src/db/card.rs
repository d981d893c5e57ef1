use async_trait::async_trait;
use cardhub_core::models::{Card, CardBank, CardSocialMedia};
use cardhub_core::{AppError, DbId, DeletePolicy};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool, Postgres};

use crate::db::reconcile::{reconcile, ChildRecord};
use crate::db::transaction::with_transaction;
use crate::db::{replaced_media, Updated};

const CARD_COLUMNS: &str = "id, user_id, name, slug, title, photo, telephone, email, location, \
     website_url, store_url, is_active, updated_by, created_at, updated_at";

#[derive(Debug, FromRow)]
struct CardRow {
    id: DbId,
    user_id: DbId,
    name: String,
    slug: String,
    title: Option<String>,
    photo: Option<String>,
    telephone: Option<String>,
    email: Option<String>,
    location: Option<String>,
    website_url: Option<String>,
    store_url: Option<String>,
    is_active: bool,
    updated_by: Option<DbId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct CardBankRow {
    id: DbId,
    bank_id: DbId,
    iban: String,
}

#[derive(Debug, FromRow)]
struct CardSocialMediaRow {
    id: DbId,
    social_media_id: DbId,
    url: String,
}

impl CardRow {
    fn into_card(self, banks: Vec<CardBankRow>, social_media: Vec<CardSocialMediaRow>) -> Card {
        Card {
            id: Some(self.id),
            user_id: self.user_id,
            name: self.name,
            slug: self.slug,
            title: self.title,
            photo: self.photo,
            telephone: self.telephone,
            email: self.email,
            location: self.location,
            website_url: self.website_url,
            store_url: self.store_url,
            is_active: self.is_active,
            updated_by: self.updated_by,
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
            banks: banks
                .into_iter()
                .map(|row| CardBank {
                    id: Some(row.id),
                    bank_id: row.bank_id,
                    iban: row.iban,
                })
                .collect(),
            social_media: social_media
                .into_iter()
                .map(|row| CardSocialMedia {
                    id: Some(row.id),
                    social_media_id: row.social_media_id,
                    url: row.url,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ChildRecord for CardBank {
    const TABLE: &'static str = "card_banks";
    const PARENT_COLUMN: &'static str = "card_id";

    fn id(&self) -> Option<DbId> {
        self.id
    }

    fn assign_id(&mut self, id: DbId) {
        self.id = Some(id);
    }

    async fn insert(&self, conn: &mut PgConnection, parent_id: DbId) -> Result<DbId, AppError> {
        let id = sqlx::query_scalar::<Postgres, DbId>(
            "INSERT INTO card_banks (card_id, bank_id, iban) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(parent_id)
        .bind(self.bank_id)
        .bind(&self.iban)
        .fetch_one(conn)
        .await?;
        Ok(id)
    }

    async fn update(
        &self,
        conn: &mut PgConnection,
        parent_id: DbId,
        id: DbId,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE card_banks
            SET bank_id = $3, iban = $4, updated_at = NOW()
            WHERE id = $1 AND card_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(parent_id)
        .bind(self.bank_id)
        .bind(&self.iban)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ChildRecord for CardSocialMedia {
    const TABLE: &'static str = "card_social_media";
    const PARENT_COLUMN: &'static str = "card_id";

    fn id(&self) -> Option<DbId> {
        self.id
    }

    fn assign_id(&mut self, id: DbId) {
        self.id = Some(id);
    }

    async fn insert(&self, conn: &mut PgConnection, parent_id: DbId) -> Result<DbId, AppError> {
        let id = sqlx::query_scalar::<Postgres, DbId>(
            "INSERT INTO card_social_media (card_id, social_media_id, url) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(parent_id)
        .bind(self.social_media_id)
        .bind(&self.url)
        .fetch_one(conn)
        .await?;
        Ok(id)
    }

    async fn update(
        &self,
        conn: &mut PgConnection,
        parent_id: DbId,
        id: DbId,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE card_social_media
            SET social_media_id = $3, url = $4, updated_at = NOW()
            WHERE id = $1 AND card_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(parent_id)
        .bind(self.social_media_id)
        .bind(&self.url)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Unique violations on `cards` can only come from the live-slug index.
fn slug_conflict(slug: &str, err: AppError) -> AppError {
    match err {
        AppError::Conflict(_) => AppError::Conflict(format!("Slug '{}' is already in use", slug)),
        other => other,
    }
}

async fn insert_card(
    conn: &mut PgConnection,
    mut card: Card,
    policy: DeletePolicy,
) -> Result<Card, AppError> {
    let (id, created_at, updated_at) =
        sqlx::query_as::<Postgres, (DbId, DateTime<Utc>, DateTime<Utc>)>(
            r#"
            INSERT INTO cards (user_id, name, slug, title, photo, telephone, email,
                               location, website_url, store_url, is_active, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id, created_at, updated_at
            "#,
        )
        .bind(card.user_id)
        .bind(&card.name)
        .bind(&card.slug)
        .bind(&card.title)
        .bind(&card.photo)
        .bind(&card.telephone)
        .bind(&card.email)
        .bind(&card.location)
        .bind(&card.website_url)
        .bind(&card.store_url)
        .bind(card.is_active)
        .bind(card.updated_by)
        .fetch_one(&mut *conn)
        .await?;

    reconcile(&mut *conn, id, &mut card.banks, policy).await?;
    reconcile(&mut *conn, id, &mut card.social_media, policy).await?;

    card.id = Some(id);
    card.created_at = Some(created_at);
    card.updated_at = Some(updated_at);
    Ok(card)
}

async fn update_card(
    conn: &mut PgConnection,
    id: DbId,
    mut card: Card,
    actor_id: DbId,
    new_photo: Option<String>,
    policy: DeletePolicy,
) -> Result<Updated<Card>, AppError> {
    // The photo is read under the row lock; the caller's copy may already be stale.
    let current_photo = sqlx::query_scalar::<Postgres, Option<String>>(
        "SELECT photo FROM cards WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Card {} not found", id)))?;

    reconcile(&mut *conn, id, &mut card.banks, policy).await?;
    reconcile(&mut *conn, id, &mut card.social_media, policy).await?;

    let (photo, updated_at) = sqlx::query_as::<Postgres, (Option<String>, DateTime<Utc>)>(
        r#"
        UPDATE cards
        SET name = $2, slug = $3, title = $4, photo = COALESCE($5, photo), telephone = $6,
            email = $7, location = $8, website_url = $9, store_url = $10, is_active = $11,
            updated_by = $12, updated_at = NOW()
        WHERE id = $1
        RETURNING photo, updated_at
        "#,
    )
    .bind(id)
    .bind(&card.name)
    .bind(&card.slug)
    .bind(&card.title)
    .bind(&new_photo)
    .bind(&card.telephone)
    .bind(&card.email)
    .bind(&card.location)
    .bind(&card.website_url)
    .bind(&card.store_url)
    .bind(card.is_active)
    .bind(actor_id)
    .fetch_one(&mut *conn)
    .await?;

    card.photo = photo;
    card.updated_by = Some(actor_id);
    card.updated_at = Some(updated_at);

    Ok(Updated {
        replaced_media: replaced_media(new_photo.as_deref(), current_photo),
        record: card,
    })
}

async fn remove_card(
    conn: &mut PgConnection,
    id: DbId,
    policy: DeletePolicy,
) -> Result<Option<String>, AppError> {
    let photo = if policy.is_soft() {
        let photo = sqlx::query_scalar::<Postgres, Option<String>>(
            "UPDATE cards SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL RETURNING photo",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        if photo.is_some() {
            for table in ["card_banks", "card_social_media"] {
                let sql = format!(
                    "UPDATE {} SET deleted_at = NOW() WHERE card_id = $1 AND deleted_at IS NULL",
                    table
                );
                sqlx::query(&sql).bind(id).execute(&mut *conn).await?;
            }
        }
        photo
    } else {
        // Child rows go with the card through ON DELETE CASCADE.
        sqlx::query_scalar::<Postgres, Option<String>>(
            "DELETE FROM cards WHERE id = $1 AND deleted_at IS NULL RETURNING photo",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
    };

    photo.ok_or_else(|| AppError::NotFound(format!("Card {} not found", id)))
}

/// Repository persisting cards together with their bank and social media rows
#[derive(Clone)]
pub struct CardRepository {
    pool: PgPool,
    delete_policy: DeletePolicy,
}

impl CardRepository {
    pub fn new(pool: PgPool, delete_policy: DeletePolicy) -> Self {
        Self {
            pool,
            delete_policy,
        }
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        self.delete_policy
    }

    /// Insert a card and all of its child rows atomically.
    ///
    /// Returns the card with every identity and timestamp filled in.
    #[tracing::instrument(skip(self, card), fields(db.table = "cards", db.operation = "insert", card.slug = %card.slug))]
    pub async fn create_with_relations(&self, card: Card) -> Result<Card, AppError> {
        let slug = card.slug.clone();
        let policy = self.delete_policy;

        with_transaction(&self.pool, move |tx| {
            Box::pin(insert_card(&mut **tx, card, policy))
        })
        .await
        .map_err(|e| slug_conflict(&slug, e))
    }

    /// Reconcile both child collections and save the card's scalar fields in one transaction.
    ///
    /// The card row is locked first, so concurrent updates of the same card are serialized.
    /// `card.photo` is ignored: the stored photo changes only when `new_photo` is given, and
    /// the filename it replaced is reported in [`Updated::replaced_media`].
    #[tracing::instrument(skip(self, card), fields(db.table = "cards", db.operation = "update", db.record_id = ?card.id))]
    pub async fn update_with_relations(
        &self,
        card: Card,
        actor_id: DbId,
        new_photo: Option<String>,
    ) -> Result<Updated<Card>, AppError> {
        let id = card
            .id
            .ok_or_else(|| AppError::InvalidInput("Card has not been persisted yet".to_string()))?;
        let slug = card.slug.clone();
        let policy = self.delete_policy;

        with_transaction(&self.pool, move |tx| {
            Box::pin(update_card(&mut **tx, id, card, actor_id, new_photo, policy))
        })
        .await
        .map_err(|e| slug_conflict(&slug, e))
    }

    /// Remove a card and its child rows. Returns the photo filename the card referenced.
    #[tracing::instrument(skip(self), fields(db.table = "cards", db.operation = "delete", db.record_id = %id))]
    pub async fn delete_with_relations(&self, id: DbId) -> Result<Option<String>, AppError> {
        let policy = self.delete_policy;

        with_transaction(&self.pool, move |tx| Box::pin(remove_card(&mut **tx, id, policy))).await
    }

    /// Get a live card with both child collections, ordered by child id
    #[tracing::instrument(skip(self), fields(db.table = "cards", db.operation = "select", db.record_id = %id))]
    pub async fn get_card(&self, id: DbId) -> Result<Option<Card>, AppError> {
        let sql = format!(
            "SELECT {} FROM cards WHERE id = $1 AND deleted_at IS NULL",
            CARD_COLUMNS
        );
        let Some(row) = sqlx::query_as::<Postgres, CardRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let banks = sqlx::query_as::<Postgres, CardBankRow>(
            "SELECT id, bank_id, iban FROM card_banks WHERE card_id = $1 AND deleted_at IS NULL ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let social_media = sqlx::query_as::<Postgres, CardSocialMediaRow>(
            "SELECT id, social_media_id, url FROM card_social_media WHERE card_id = $1 AND deleted_at IS NULL ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(row.into_card(banks, social_media)))
    }

    #[tracing::instrument(skip(self), fields(db.table = "cards", db.operation = "count"))]
    pub async fn count_cards(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<Postgres, i64>(
            "SELECT COUNT(*) FROM cards WHERE deleted_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Whether no live card other than `exclude_id` uses `slug`.
    ///
    /// `None` or `Some(0)` means no exclusion. This is a pre-flight check only; the partial
    /// unique index on `cards.slug` is what actually rejects duplicates.
    #[tracing::instrument(skip(self), fields(db.table = "cards", db.operation = "select"))]
    pub async fn is_slug_available(
        &self,
        slug: &str,
        exclude_id: Option<DbId>,
    ) -> Result<bool, AppError> {
        let exclude_id = exclude_id.filter(|id| *id > 0);
        let taken = sqlx::query_scalar::<Postgres, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM cards
                WHERE slug = $1 AND deleted_at IS NULL AND ($2::BIGINT IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(slug)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(!taken)
    }
}
