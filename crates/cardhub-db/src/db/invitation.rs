use async_trait::async_trait;
use cardhub_core::models::{Invitation, InvitationDetail};
use cardhub_core::{AppError, DbId, DeletePolicy};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgConnection, PgPool, Postgres};

use crate::db::reconcile::{reconcile, ChildRecord};
use crate::db::transaction::with_transaction;
use crate::db::{replaced_media, Updated};

const INVITATION_COLUMNS: &str = "id, invitation_key, image, user_id, category_id, template, kind, \
     is_confirmed, is_participant, title, description, venue, address, location, link, telephone, \
     note, \"date\", \"time\", updated_by, created_at, updated_at";

const DETAIL_COLUMNS: &str = "id, title, bride_name, bride_surname, bride_mother_name, \
     bride_mother_surname, bride_father_name, bride_father_surname, groom_name, groom_surname, \
     groom_mother_name, groom_mother_surname, groom_father_name, groom_father_surname, person, \
     mother_name, mother_surname, father_name, father_surname, is_mother_live, is_father_live, \
     is_bride_mother_live, is_bride_father_live, is_groom_mother_live, is_groom_father_live";

#[derive(Debug, FromRow)]
struct InvitationRow {
    id: DbId,
    invitation_key: String,
    image: Option<String>,
    user_id: DbId,
    category_id: DbId,
    template: String,
    kind: String,
    is_confirmed: bool,
    is_participant: bool,
    title: Option<String>,
    description: Option<String>,
    venue: Option<String>,
    address: Option<String>,
    location: Option<String>,
    link: Option<String>,
    telephone: Option<String>,
    note: Option<String>,
    date: Option<NaiveDate>,
    time: Option<String>,
    updated_by: Option<DbId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct InvitationDetailRow {
    id: DbId,
    title: String,
    bride_name: String,
    bride_surname: String,
    bride_mother_name: String,
    bride_mother_surname: String,
    bride_father_name: String,
    bride_father_surname: String,
    groom_name: String,
    groom_surname: String,
    groom_mother_name: String,
    groom_mother_surname: String,
    groom_father_name: String,
    groom_father_surname: String,
    person: String,
    mother_name: String,
    mother_surname: String,
    father_name: String,
    father_surname: String,
    is_mother_live: bool,
    is_father_live: bool,
    is_bride_mother_live: bool,
    is_bride_father_live: bool,
    is_groom_mother_live: bool,
    is_groom_father_live: bool,
}

impl From<InvitationDetailRow> for InvitationDetail {
    fn from(row: InvitationDetailRow) -> Self {
        InvitationDetail {
            id: Some(row.id),
            title: row.title,
            bride_name: row.bride_name,
            bride_surname: row.bride_surname,
            bride_mother_name: row.bride_mother_name,
            bride_mother_surname: row.bride_mother_surname,
            bride_father_name: row.bride_father_name,
            bride_father_surname: row.bride_father_surname,
            groom_name: row.groom_name,
            groom_surname: row.groom_surname,
            groom_mother_name: row.groom_mother_name,
            groom_mother_surname: row.groom_mother_surname,
            groom_father_name: row.groom_father_name,
            groom_father_surname: row.groom_father_surname,
            person: row.person,
            mother_name: row.mother_name,
            mother_surname: row.mother_surname,
            father_name: row.father_name,
            father_surname: row.father_surname,
            is_mother_live: row.is_mother_live,
            is_father_live: row.is_father_live,
            is_bride_mother_live: row.is_bride_mother_live,
            is_bride_father_live: row.is_bride_father_live,
            is_groom_mother_live: row.is_groom_mother_live,
            is_groom_father_live: row.is_groom_father_live,
        }
    }
}

impl InvitationRow {
    fn into_invitation(self, details: Vec<InvitationDetailRow>) -> Invitation {
        Invitation {
            id: Some(self.id),
            invitation_key: self.invitation_key,
            image: self.image,
            user_id: self.user_id,
            category_id: self.category_id,
            template: self.template,
            kind: self.kind,
            is_confirmed: self.is_confirmed,
            is_participant: self.is_participant,
            title: self.title,
            description: self.description,
            venue: self.venue,
            address: self.address,
            location: self.location,
            link: self.link,
            telephone: self.telephone,
            note: self.note,
            date: self.date,
            time: self.time,
            updated_by: self.updated_by,
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
            details: details.into_iter().map(InvitationDetail::from).collect(),
        }
    }
}

#[async_trait]
impl ChildRecord for InvitationDetail {
    const TABLE: &'static str = "invitation_details";
    const PARENT_COLUMN: &'static str = "invitation_id";
    const MIN_ROWS: usize = 1;

    fn id(&self) -> Option<DbId> {
        self.id
    }

    fn assign_id(&mut self, id: DbId) {
        self.id = Some(id);
    }

    async fn insert(&self, conn: &mut PgConnection, parent_id: DbId) -> Result<DbId, AppError> {
        let id = sqlx::query_scalar::<Postgres, DbId>(
            r#"
            INSERT INTO invitation_details (
                invitation_id, title, bride_name, bride_surname, bride_mother_name,
                bride_mother_surname, bride_father_name, bride_father_surname, groom_name,
                groom_surname, groom_mother_name, groom_mother_surname, groom_father_name,
                groom_father_surname, person, mother_name, mother_surname, father_name,
                father_surname, is_mother_live, is_father_live, is_bride_mother_live,
                is_bride_father_live, is_groom_mother_live, is_groom_father_live
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24, $25)
            RETURNING id
            "#,
        )
        .bind(parent_id)
        .bind(&self.title)
        .bind(&self.bride_name)
        .bind(&self.bride_surname)
        .bind(&self.bride_mother_name)
        .bind(&self.bride_mother_surname)
        .bind(&self.bride_father_name)
        .bind(&self.bride_father_surname)
        .bind(&self.groom_name)
        .bind(&self.groom_surname)
        .bind(&self.groom_mother_name)
        .bind(&self.groom_mother_surname)
        .bind(&self.groom_father_name)
        .bind(&self.groom_father_surname)
        .bind(&self.person)
        .bind(&self.mother_name)
        .bind(&self.mother_surname)
        .bind(&self.father_name)
        .bind(&self.father_surname)
        .bind(self.is_mother_live)
        .bind(self.is_father_live)
        .bind(self.is_bride_mother_live)
        .bind(self.is_bride_father_live)
        .bind(self.is_groom_mother_live)
        .bind(self.is_groom_father_live)
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
            UPDATE invitation_details
            SET title = $3, bride_name = $4, bride_surname = $5, bride_mother_name = $6,
                bride_mother_surname = $7, bride_father_name = $8, bride_father_surname = $9,
                groom_name = $10, groom_surname = $11, groom_mother_name = $12,
                groom_mother_surname = $13, groom_father_name = $14, groom_father_surname = $15,
                person = $16, mother_name = $17, mother_surname = $18, father_name = $19,
                father_surname = $20, is_mother_live = $21, is_father_live = $22,
                is_bride_mother_live = $23, is_bride_father_live = $24,
                is_groom_mother_live = $25, is_groom_father_live = $26, updated_at = NOW()
            WHERE id = $1 AND invitation_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(parent_id)
        .bind(&self.title)
        .bind(&self.bride_name)
        .bind(&self.bride_surname)
        .bind(&self.bride_mother_name)
        .bind(&self.bride_mother_surname)
        .bind(&self.bride_father_name)
        .bind(&self.bride_father_surname)
        .bind(&self.groom_name)
        .bind(&self.groom_surname)
        .bind(&self.groom_mother_name)
        .bind(&self.groom_mother_surname)
        .bind(&self.groom_father_name)
        .bind(&self.groom_father_surname)
        .bind(&self.person)
        .bind(&self.mother_name)
        .bind(&self.mother_surname)
        .bind(&self.father_name)
        .bind(&self.father_surname)
        .bind(self.is_mother_live)
        .bind(self.is_father_live)
        .bind(self.is_bride_mother_live)
        .bind(self.is_bride_father_live)
        .bind(self.is_groom_mother_live)
        .bind(self.is_groom_father_live)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}

fn key_conflict(key: &str, err: AppError) -> AppError {
    match err {
        AppError::Conflict(_) => {
            AppError::Conflict(format!("Invitation key '{}' is already in use", key))
        }
        other => other,
    }
}

async fn insert_invitation(
    conn: &mut PgConnection,
    mut invitation: Invitation,
    policy: DeletePolicy,
) -> Result<Invitation, AppError> {
    let (id, created_at, updated_at) =
        sqlx::query_as::<Postgres, (DbId, DateTime<Utc>, DateTime<Utc>)>(
            r#"
            INSERT INTO invitations (
                invitation_key, image, user_id, category_id, template, kind, is_confirmed,
                is_participant, title, description, venue, address, location, link, telephone,
                note, "date", "time", updated_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19)
            RETURNING id, created_at, updated_at
            "#,
        )
        .bind(&invitation.invitation_key)
        .bind(&invitation.image)
        .bind(invitation.user_id)
        .bind(invitation.category_id)
        .bind(&invitation.template)
        .bind(&invitation.kind)
        .bind(invitation.is_confirmed)
        .bind(invitation.is_participant)
        .bind(&invitation.title)
        .bind(&invitation.description)
        .bind(&invitation.venue)
        .bind(&invitation.address)
        .bind(&invitation.location)
        .bind(&invitation.link)
        .bind(&invitation.telephone)
        .bind(&invitation.note)
        .bind(invitation.date)
        .bind(&invitation.time)
        .bind(invitation.updated_by)
        .fetch_one(&mut *conn)
        .await?;

    reconcile(&mut *conn, id, &mut invitation.details, policy).await?;

    invitation.id = Some(id);
    invitation.created_at = Some(created_at);
    invitation.updated_at = Some(updated_at);
    Ok(invitation)
}

async fn update_invitation(
    conn: &mut PgConnection,
    id: DbId,
    mut invitation: Invitation,
    actor_id: DbId,
    new_image: Option<String>,
    policy: DeletePolicy,
) -> Result<Updated<Invitation>, AppError> {
    let current_image = sqlx::query_scalar::<Postgres, Option<String>>(
        "SELECT image FROM invitations WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Invitation {} not found", id)))?;

    reconcile(&mut *conn, id, &mut invitation.details, policy).await?;

    let (image, updated_at) = sqlx::query_as::<Postgres, (Option<String>, DateTime<Utc>)>(
        r#"
        UPDATE invitations
        SET invitation_key = $2, image = COALESCE($3, image), category_id = $4, template = $5,
            kind = $6, is_confirmed = $7, is_participant = $8, title = $9, description = $10,
            venue = $11, address = $12, location = $13, link = $14, telephone = $15, note = $16,
            "date" = $17, "time" = $18, updated_by = $19, updated_at = NOW()
        WHERE id = $1
        RETURNING image, updated_at
        "#,
    )
    .bind(id)
    .bind(&invitation.invitation_key)
    .bind(&new_image)
    .bind(invitation.category_id)
    .bind(&invitation.template)
    .bind(&invitation.kind)
    .bind(invitation.is_confirmed)
    .bind(invitation.is_participant)
    .bind(&invitation.title)
    .bind(&invitation.description)
    .bind(&invitation.venue)
    .bind(&invitation.address)
    .bind(&invitation.location)
    .bind(&invitation.link)
    .bind(&invitation.telephone)
    .bind(&invitation.note)
    .bind(invitation.date)
    .bind(&invitation.time)
    .bind(actor_id)
    .fetch_one(&mut *conn)
    .await?;

    invitation.image = image;
    invitation.updated_by = Some(actor_id);
    invitation.updated_at = Some(updated_at);

    Ok(Updated {
        replaced_media: replaced_media(new_image.as_deref(), current_image),
        record: invitation,
    })
}

async fn remove_invitation(
    conn: &mut PgConnection,
    id: DbId,
    policy: DeletePolicy,
) -> Result<Option<String>, AppError> {
    let image = if policy.is_soft() {
        let image = sqlx::query_scalar::<Postgres, Option<String>>(
            "UPDATE invitations SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL RETURNING image",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        if image.is_some() {
            sqlx::query(
                "UPDATE invitation_details SET deleted_at = NOW() WHERE invitation_id = $1 AND deleted_at IS NULL",
            )
            .bind(id)
            .execute(&mut *conn)
            .await?;
        }
        image
    } else {
        sqlx::query_scalar::<Postgres, Option<String>>(
            "DELETE FROM invitations WHERE id = $1 AND deleted_at IS NULL RETURNING image",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
    };

    image.ok_or_else(|| AppError::NotFound(format!("Invitation {} not found", id)))
}

/// Repository persisting invitations together with their detail block
#[derive(Clone)]
pub struct InvitationRepository {
    pool: PgPool,
    delete_policy: DeletePolicy,
}

impl InvitationRepository {
    pub fn new(pool: PgPool, delete_policy: DeletePolicy) -> Self {
        Self {
            pool,
            delete_policy,
        }
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        self.delete_policy
    }

    #[tracing::instrument(skip(self, invitation), fields(db.table = "invitations", db.operation = "insert"))]
    pub async fn create_with_relations(
        &self,
        invitation: Invitation,
    ) -> Result<Invitation, AppError> {
        let key = invitation.invitation_key.clone();
        let policy = self.delete_policy;

        with_transaction(&self.pool, move |tx| {
            Box::pin(insert_invitation(&mut **tx, invitation, policy))
        })
        .await
        .map_err(|e| key_conflict(&key, e))
    }

    /// Update an invitation and its detail row under a row lock.
    ///
    /// `invitation.image` is ignored; the stored image changes only when `new_image` is given.
    #[tracing::instrument(skip(self, invitation, new_image), fields(db.table = "invitations", db.operation = "update", db.record_id = ?invitation.id))]
    pub async fn update_with_relations(
        &self,
        invitation: Invitation,
        actor_id: DbId,
        new_image: Option<String>,
    ) -> Result<Updated<Invitation>, AppError> {
        let id = invitation.id.ok_or_else(|| {
            AppError::InvalidInput("Invitation has not been persisted yet".to_string())
        })?;
        let key = invitation.invitation_key.clone();
        let policy = self.delete_policy;

        with_transaction(&self.pool, move |tx| {
            Box::pin(update_invitation(
                &mut **tx, id, invitation, actor_id, new_image, policy,
            ))
        })
        .await
        .map_err(|e| key_conflict(&key, e))
    }

    /// Remove an invitation and its details. Returns the image filename it referenced.
    #[tracing::instrument(skip(self), fields(db.table = "invitations", db.operation = "delete", db.record_id = %id))]
    pub async fn delete_with_relations(&self, id: DbId) -> Result<Option<String>, AppError> {
        let policy = self.delete_policy;

        with_transaction(&self.pool, move |tx| {
            Box::pin(remove_invitation(&mut **tx, id, policy))
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(db.table = "invitations", db.operation = "select", db.record_id = %id))]
    pub async fn get_invitation(&self, id: DbId) -> Result<Option<Invitation>, AppError> {
        let sql = format!(
            "SELECT {} FROM invitations WHERE id = $1 AND deleted_at IS NULL",
            INVITATION_COLUMNS
        );
        let row = sqlx::query_as::<Postgres, InvitationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => self.with_details(row).await.map(Some),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "invitations", db.operation = "select"))]
    pub async fn get_invitation_by_key(&self, key: &str) -> Result<Option<Invitation>, AppError> {
        let sql = format!(
            "SELECT {} FROM invitations WHERE invitation_key = $1 AND deleted_at IS NULL",
            INVITATION_COLUMNS
        );
        let row = sqlx::query_as::<Postgres, InvitationRow>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => self.with_details(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn with_details(&self, row: InvitationRow) -> Result<Invitation, AppError> {
        let sql = format!(
            "SELECT {} FROM invitation_details WHERE invitation_id = $1 AND deleted_at IS NULL ORDER BY id",
            DETAIL_COLUMNS
        );
        let details = sqlx::query_as::<Postgres, InvitationDetailRow>(&sql)
            .bind(row.id)
            .fetch_all(&self.pool)
            .await?;
        Ok(row.into_invitation(details))
    }

    #[tracing::instrument(skip(self), fields(db.table = "invitations", db.operation = "count"))]
    pub async fn count_invitations(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<Postgres, i64>(
            "SELECT COUNT(*) FROM invitations WHERE deleted_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Whether no live invitation other than `exclude_id` uses `key`.
    #[tracing::instrument(skip(self), fields(db.table = "invitations", db.operation = "select"))]
    pub async fn is_key_available(
        &self,
        key: &str,
        exclude_id: Option<DbId>,
    ) -> Result<bool, AppError> {
        let exclude_id = exclude_id.filter(|id| *id > 0);
        let taken = sqlx::query_scalar::<Postgres, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM invitations
                WHERE invitation_key = $1 AND deleted_at IS NULL AND ($2::BIGINT IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(key)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(!taken)
    }
}
