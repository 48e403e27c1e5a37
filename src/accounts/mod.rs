/// Account directory
///
/// Storage of user accounts behind the `AccountDirectory` trait. The store
/// owns uniqueness of usernames and email addresses: `insert` and
/// `update_profile` fail with a conflict instead of callers checking first.

mod memory;
mod postgres;

pub use memory::InMemoryAccountDirectory;
pub use postgres::PgAccountDirectory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, ValidationError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Maintainer,
    #[default]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Maintainer => "maintainer",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "maintainer" => Ok(Role::Maintainer),
            "user" => Ok(Role::User),
            _ => Err(ValidationError::InvalidFormat("role".to_string())),
        }
    }
}

#[derive(Clone)]
pub struct Account {
    pub uid: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub name_first: String,
    pub name_last: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub email_confirmed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub login_count: i32,
}

// The hash never ends up in logs
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("uid", &self.uid)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"[redacted]")
            .field("role", &self.role)
            .field("email_confirmed", &self.email_confirmed)
            .field("login_count", &self.login_count)
            .finish()
    }
}

impl Account {
    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile {
            username: self.username.clone(),
            name_first: self.name_first.clone(),
            name_last: self.name_last.clone(),
            image: self.image.clone(),
            bio: self.bio.clone(),
        }
    }

    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            uid: self.uid,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            name_first: self.name_first.clone(),
            name_last: self.name_last.clone(),
            bio: self.bio.clone(),
            image: self.image.clone(),
            email_confirmed: self.email_confirmed,
            created_at: self.created_at,
            last_login_at: self.last_login_at,
            login_count: self.login_count,
        }
    }
}

/// Fields needed to create an account; already validated and hashed
#[derive(Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub name_first: String,
    pub name_last: String,
    pub bio: Option<String>,
    pub role: Role,
    pub email_confirmed: bool,
}

/// A complete replacement profile; the handler merges partial input first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileChanges {
    pub username: String,
    pub name_first: String,
    pub name_last: String,
    pub image: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicProfile {
    pub username: String,
    pub name_first: String,
    pub name_last: String,
    pub image: Option<String>,
    pub bio: Option<String>,
}

/// Account as shown to its owner and to admins; no credential material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    pub uid: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub name_first: String,
    pub name_last: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub email_confirmed: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub login_count: i32,
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Fails with a conflict when the username or email is taken
    async fn insert(&self, account: NewAccount) -> Result<Account, AppError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, AppError>;
    async fn find_by_uid(&self, uid: Uuid) -> Result<Option<Account>, AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AppError>;
    async fn list(&self) -> Result<Vec<Account>, AppError>;
    /// Fails with not-found for an unknown uid, conflict for a taken username
    async fn update_profile(&self, uid: Uuid, changes: &ProfileChanges)
        -> Result<Account, AppError>;
    async fn record_login(
        &self,
        uid: Uuid,
        ip: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;
    async fn store_confirmation(
        &self,
        uid: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;
    /// Consumes a confirmation token; `None` if unknown or expired
    async fn confirm_email(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, AppError>;
}
