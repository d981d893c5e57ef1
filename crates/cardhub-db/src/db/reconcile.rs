//! Child-collection reconciliation
//!
//! Given the rows a parent should own after a write, [`reconcile`] removes every currently
//! owned row that is not listed, updates listed rows in place and inserts rows without an
//! identity. It always runs on a connection borrowed from an open transaction so that a
//! failure at any step leaves nothing visible.

use std::collections::HashSet;

use async_trait::async_trait;
use cardhub_core::{AppError, DbId, DeletePolicy};
use sqlx::PgConnection;

/// A row owned by exactly one parent aggregate through `PARENT_COLUMN`.
#[async_trait]
pub trait ChildRecord: Send + Sync {
    /// Table holding the rows
    const TABLE: &'static str;
    /// Foreign key column referencing the parent
    const PARENT_COLUMN: &'static str;
    /// Minimum number of rows a parent must own after reconciliation
    const MIN_ROWS: usize = 0;

    /// Persisted identity, `None` for rows that still need to be inserted.
    fn id(&self) -> Option<DbId>;

    fn assign_id(&mut self, id: DbId);

    /// Insert the row under `parent_id` and return its new identity.
    async fn insert(&self, conn: &mut PgConnection, parent_id: DbId) -> Result<DbId, AppError>;

    /// Update row `id` owned by `parent_id`. Returns the number of rows affected.
    async fn update(
        &self,
        conn: &mut PgConnection,
        parent_id: DbId,
        id: DbId,
    ) -> Result<u64, AppError>;
}

/// Identities to keep and the number of rows to insert, computed before touching storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub keep: Vec<DbId>,
    pub inserts: usize,
}

/// What a reconciliation changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub removed: u64,
    pub updated: u64,
    pub inserted: u64,
}

impl ReconcilePlan {
    /// Partition `rows` into kept identities and new rows.
    ///
    /// Fails with `Integrity` when fewer than `R::MIN_ROWS` rows are desired and with
    /// `InvalidInput` when an identity is listed twice.
    pub fn build<R: ChildRecord>(rows: &[R]) -> Result<Self, AppError> {
        if rows.len() < R::MIN_ROWS {
            return Err(AppError::Integrity(format!(
                "{} requires at least {} row(s), got {}",
                R::TABLE,
                R::MIN_ROWS,
                rows.len()
            )));
        }

        let mut seen = HashSet::with_capacity(rows.len());
        let mut keep = Vec::new();
        let mut inserts = 0;

        for row in rows {
            match row.id() {
                Some(id) => {
                    if !seen.insert(id) {
                        return Err(AppError::InvalidInput(format!(
                            "{} row {} is listed more than once",
                            R::TABLE,
                            id
                        )));
                    }
                    keep.push(id);
                }
                None => inserts += 1,
            }
        }

        Ok(Self { keep, inserts })
    }

    /// Every kept identity must already belong to the parent.
    pub fn verify_owned(&self, table: &str, owned: &[DbId]) -> Result<(), AppError> {
        let owned: HashSet<DbId> = owned.iter().copied().collect();
        match self.keep.iter().find(|id| !owned.contains(id)) {
            Some(id) => Err(AppError::Integrity(format!(
                "{} row {} does not belong to this record",
                table, id
            ))),
            None => Ok(()),
        }
    }
}

/// Make the rows owned by `parent_id` match `rows`.
///
/// New rows get their identity assigned in place. Rows dropped from the list are deleted or
/// stamped with `deleted_at` depending on `policy`; an empty list removes every row.
pub async fn reconcile<R: ChildRecord>(
    conn: &mut PgConnection,
    parent_id: DbId,
    rows: &mut [R],
    policy: DeletePolicy,
) -> Result<ReconcileOutcome, AppError> {
    let plan = ReconcilePlan::build(rows)?;

    let owned_sql = format!(
        "SELECT id FROM {} WHERE {} = $1 AND deleted_at IS NULL FOR UPDATE",
        R::TABLE,
        R::PARENT_COLUMN
    );
    let owned: Vec<DbId> = sqlx::query_scalar(&owned_sql)
        .bind(parent_id)
        .fetch_all(&mut *conn)
        .await?;

    if let Err(e) = plan.verify_owned(R::TABLE, &owned) {
        tracing::warn!(
            table = R::TABLE,
            parent_id = parent_id,
            error = %e,
            "Rejected child row not owned by parent"
        );
        return Err(e);
    }

    let remove_sql = if policy.is_soft() {
        format!(
            "UPDATE {} SET deleted_at = NOW() WHERE {} = $1 AND deleted_at IS NULL AND NOT (id = ANY($2))",
            R::TABLE,
            R::PARENT_COLUMN
        )
    } else {
        format!(
            "DELETE FROM {} WHERE {} = $1 AND NOT (id = ANY($2))",
            R::TABLE,
            R::PARENT_COLUMN
        )
    };
    let removed = sqlx::query(&remove_sql)
        .bind(parent_id)
        .bind(&plan.keep)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    let mut outcome = ReconcileOutcome {
        removed,
        ..Default::default()
    };

    for row in rows.iter_mut() {
        match row.id() {
            Some(id) => {
                let affected = row.update(&mut *conn, parent_id, id).await?;
                if affected != 1 {
                    return Err(AppError::Integrity(format!(
                        "{} row {} could not be updated",
                        R::TABLE,
                        id
                    )));
                }
                outcome.updated += 1;
            }
            None => {
                let id = row.insert(&mut *conn, parent_id).await?;
                row.assign_id(id);
                outcome.inserted += 1;
            }
        }
    }

    tracing::debug!(
        table = R::TABLE,
        parent_id = parent_id,
        removed = outcome.removed,
        updated = outcome.updated,
        inserted = outcome.inserted,
        "Child rows reconciled"
    );

    Ok(outcome)
}
