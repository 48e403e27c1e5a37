use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{LineageRecord, LineageStore, Rotation};
use crate::error::AppError;

const LINEAGE_COLUMNS: &str =
    "id, uid, token_hash, pair_count, parent_id, created_at, use_count, last_used_at, revoked_at";

#[derive(Clone)]
pub struct PgLineageStore {
    pool: PgPool,
}

impl PgLineageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LineageStore for PgLineageStore {
    async fn start(&self, uid: Uuid, token_hash: &str) -> Result<LineageRecord, AppError> {
        let mut transaction = self.pool.begin().await?;

        // Serializes concurrent logins of one account until commit
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(uid)
            .execute(&mut *transaction)
            .await?;

        let query = format!(
            r#"
            INSERT INTO token_lineage (id, uid, token_hash, pair_count, parent_id, created_at, use_count)
            SELECT $1, $2, $3, COALESCE(MAX(pair_count) + 1, 0), NULL, $4, 0
            FROM token_lineage
            WHERE uid = $2
            RETURNING {}
            "#,
            LINEAGE_COLUMNS
        );
        let record = sqlx::query_as::<_, LineageRecord>(&query)
            .bind(Uuid::new_v4())
            .bind(uid)
            .bind(token_hash)
            .bind(Utc::now())
            .fetch_one(&mut *transaction)
            .await?;

        transaction.commit().await?;
        Ok(record)
    }

    async fn rotate(
        &self,
        uid: Uuid,
        presented_hash: &str,
        successor_hash: &str,
        max_uses: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<Rotation>, AppError> {
        let max_uses = i32::try_from(max_uses).unwrap_or(i32::MAX);
        let mut transaction = self.pool.begin().await?;

        // The conditional UPDATE takes the row lock; a concurrent rotation of
        // the same token waits here and then sees the spent use.
        let consume = format!(
            r#"
            UPDATE token_lineage
            SET use_count = use_count + 1,
                last_used_at = $3,
                revoked_at = CASE WHEN use_count + 1 >= $2 THEN $3 ELSE NULL END
            WHERE token_hash = $1 AND uid = $4 AND revoked_at IS NULL AND use_count < $2
            RETURNING {}
            "#,
            LINEAGE_COLUMNS
        );
        let consumed = sqlx::query_as::<_, LineageRecord>(&consume)
            .bind(presented_hash)
            .bind(max_uses)
            .bind(now)
            .bind(uid)
            .fetch_optional(&mut *transaction)
            .await?;

        let Some(consumed) = consumed else {
            transaction.rollback().await?;
            return Ok(None);
        };

        let append = format!(
            r#"
            INSERT INTO token_lineage (id, uid, token_hash, pair_count, parent_id, created_at, use_count)
            VALUES ($1, $2, $3, $4, $5, $6, 0)
            RETURNING {}
            "#,
            LINEAGE_COLUMNS
        );
        // An error here drops the transaction, which rolls the spent use back
        let successor = sqlx::query_as::<_, LineageRecord>(&append)
            .bind(Uuid::new_v4())
            .bind(uid)
            .bind(successor_hash)
            .bind(consumed.pair_count + 1)
            .bind(consumed.id)
            .bind(now)
            .fetch_one(&mut *transaction)
            .await?;

        transaction.commit().await?;
        Ok(Some(Rotation {
            consumed,
            successor,
        }))
    }

    async fn revoke(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE token_lineage
            SET revoked_at = $2
            WHERE token_hash = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all(&self, uid: Uuid, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE token_lineage
            SET revoked_at = $2
            WHERE uid = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(uid)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn chain(&self, uid: Uuid) -> Result<Vec<LineageRecord>, AppError> {
        let query = format!(
            "SELECT {} FROM token_lineage WHERE uid = $1 ORDER BY pair_count, created_at",
            LINEAGE_COLUMNS
        );
        let records = sqlx::query_as::<_, LineageRecord>(&query)
            .bind(uid)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }
}
