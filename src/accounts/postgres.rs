use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{Account, AccountDirectory, NewAccount, ProfileChanges, Role};
use crate::error::AppError;

const ACCOUNT_COLUMNS: &str = r#"
    uid, username, email, hash, role, name_first, name_last, bio, image,
    email_confirmed, created_at, updated_at, last_login_at, last_login_ip, login_count
"#;

/// Row as stored in the `accounts` table
#[derive(sqlx::FromRow)]
struct AccountRow {
    uid: Uuid,
    username: String,
    email: String,
    hash: String,
    role: String,
    name_first: String,
    name_last: String,
    bio: Option<String>,
    image: Option<String>,
    email_confirmed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
    last_login_ip: Option<String>,
    login_count: i32,
}

impl TryFrom<AccountRow> for Account {
    type Error = AppError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let role: Role = row.role.parse().map_err(|_| {
            AppError::Internal(format!("account {} has unknown role {:?}", row.uid, row.role))
        })?;
        Ok(Account {
            uid: row.uid,
            username: row.username,
            email: row.email,
            password_hash: row.hash,
            role,
            name_first: row.name_first,
            name_last: row.name_last,
            bio: row.bio,
            image: row.image,
            email_confirmed: row.email_confirmed,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_login_at: row.last_login_at,
            last_login_ip: row.last_login_ip,
            login_count: row.login_count,
        })
    }
}

/// Postgres-backed directory; uniqueness rests on the table's constraints
#[derive(Clone)]
pub struct PgAccountDirectory {
    pool: PgPool,
}

impl PgAccountDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<Account>, AppError> {
        let query = format!("SELECT {} FROM accounts WHERE {} = $1", ACCOUNT_COLUMNS, column);
        sqlx::query_as::<_, AccountRow>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
    }
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    async fn insert(&self, account: NewAccount) -> Result<Account, AppError> {
        let query = format!(
            r#"
            INSERT INTO accounts
                (uid, username, email, hash, role, name_first, name_last, bio, email_confirmed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query_as::<_, AccountRow>(&query)
            .bind(Uuid::new_v4())
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(account.role.as_str())
            .bind(&account.name_first)
            .bind(&account.name_last)
            .bind(&account.bio)
            .bind(account.email_confirmed)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, AppError> {
        self.fetch_one_by("username", username).await
    }

    async fn find_by_uid(&self, uid: Uuid) -> Result<Option<Account>, AppError> {
        let query = format!("SELECT {} FROM accounts WHERE uid = $1", ACCOUNT_COLUMNS);
        sqlx::query_as::<_, AccountRow>(&query)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        self.fetch_one_by("email", email).await
    }

    async fn list(&self) -> Result<Vec<Account>, AppError> {
        let query = format!("SELECT {} FROM accounts ORDER BY created_at", ACCOUNT_COLUMNS);
        sqlx::query_as::<_, AccountRow>(&query)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    async fn update_profile(
        &self,
        uid: Uuid,
        changes: &ProfileChanges,
    ) -> Result<Account, AppError> {
        let query = format!(
            r#"
            UPDATE accounts
            SET username = $1, name_first = $2, name_last = $3, image = $4, bio = $5,
                updated_at = now()
            WHERE uid = $6
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query_as::<_, AccountRow>(&query)
            .bind(&changes.username)
            .bind(&changes.name_first)
            .bind(&changes.name_last)
            .bind(&changes.image)
            .bind(&changes.bio)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("account"))?;
        row.try_into()
    }

    async fn record_login(
        &self,
        uid: Uuid,
        ip: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET last_login_at = $1, last_login_ip = $2, login_count = login_count + 1
            WHERE uid = $3
            "#,
        )
        .bind(at)
        .bind(ip)
        .bind(uid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn store_confirmation(
        &self,
        uid: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO email_confirmations (token_hash, uid, created_at, expires_at)
            VALUES ($1, $2, now(), $3)
            "#,
        )
        .bind(token_hash)
        .bind(uid)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn confirm_email(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, AppError> {
        let mut transaction = self.pool.begin().await?;

        // DELETE .. RETURNING consumes the token exactly once under concurrency
        let uid = sqlx::query_scalar::<_, Uuid>(
            r#"
            DELETE FROM email_confirmations
            WHERE token_hash = $1 AND expires_at > $2
            RETURNING uid
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&mut *transaction)
        .await?;

        let Some(uid) = uid else {
            transaction.rollback().await?;
            return Ok(None);
        };

        sqlx::query("UPDATE accounts SET email_confirmed = true, updated_at = $1 WHERE uid = $2")
            .bind(now)
            .bind(uid)
            .execute(&mut *transaction)
            .await?;
        sqlx::query("DELETE FROM email_confirmations WHERE uid = $1")
            .bind(uid)
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;
        Ok(Some(uid))
    }
}
