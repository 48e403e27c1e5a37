use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{Account, AccountDirectory, NewAccount, ProfileChanges};
use crate::error::AppError;

#[derive(Default)]
struct Tables {
    accounts: HashMap<Uuid, Account>,
    confirmations: HashMap<String, (Uuid, DateTime<Utc>)>,
}

/// Process-local directory for tests and single-node development
///
/// Every operation runs under one lock, so uniqueness checks and the write
/// that depends on them are atomic.
#[derive(Default)]
pub struct InMemoryAccountDirectory {
    tables: Mutex<Tables>,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, AppError> {
        self.tables
            .lock()
            .map_err(|_| AppError::Internal("account directory lock poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|t| t.accounts.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn username_taken(tables: &Tables, username: &str, except: Option<Uuid>) -> bool {
    tables
        .accounts
        .values()
        .any(|a| a.username == username && Some(a.uid) != except)
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn insert(&self, account: NewAccount) -> Result<Account, AppError> {
        let mut tables = self.lock()?;

        if username_taken(&tables, &account.username, None) {
            return Err(AppError::conflict("Username already exists"));
        }
        if tables.accounts.values().any(|a| a.email == account.email) {
            return Err(AppError::conflict("Email already exists"));
        }

        let now = Utc::now();
        let created = Account {
            uid: Uuid::new_v4(),
            username: account.username,
            email: account.email,
            password_hash: account.password_hash,
            role: account.role,
            name_first: account.name_first,
            name_last: account.name_last,
            bio: account.bio,
            image: None,
            email_confirmed: account.email_confirmed,
            created_at: now,
            updated_at: now,
            last_login_at: None,
            last_login_ip: None,
            login_count: 0,
        };
        tables.accounts.insert(created.uid, created.clone());
        Ok(created)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, AppError> {
        Ok(self
            .lock()?
            .accounts
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn find_by_uid(&self, uid: Uuid) -> Result<Option<Account>, AppError> {
        Ok(self.lock()?.accounts.get(&uid).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        Ok(self
            .lock()?
            .accounts
            .values()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Account>, AppError> {
        let mut accounts: Vec<Account> = self.lock()?.accounts.values().cloned().collect();
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }

    async fn update_profile(
        &self,
        uid: Uuid,
        changes: &ProfileChanges,
    ) -> Result<Account, AppError> {
        let mut tables = self.lock()?;

        if username_taken(&tables, &changes.username, Some(uid)) {
            return Err(AppError::conflict("Username already exists"));
        }

        let account = tables
            .accounts
            .get_mut(&uid)
            .ok_or_else(|| AppError::not_found("account"))?;
        account.username = changes.username.clone();
        account.name_first = changes.name_first.clone();
        account.name_last = changes.name_last.clone();
        account.image = changes.image.clone();
        account.bio = changes.bio.clone();
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn record_login(
        &self,
        uid: Uuid,
        ip: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut tables = self.lock()?;
        let account = tables
            .accounts
            .get_mut(&uid)
            .ok_or_else(|| AppError::not_found("account"))?;
        account.last_login_at = Some(at);
        account.last_login_ip = ip.map(str::to_string);
        account.login_count += 1;
        Ok(())
    }

    async fn store_confirmation(
        &self,
        uid: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.lock()?
            .confirmations
            .insert(token_hash.to_string(), (uid, expires_at));
        Ok(())
    }

    async fn confirm_email(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, AppError> {
        let mut tables = self.lock()?;
        let uid = match tables.confirmations.remove(token_hash) {
            Some((uid, expires_at)) if expires_at > now => uid,
            _ => return Ok(None),
        };
        tables.confirmations.retain(|_, (owner, _)| *owner != uid);
        match tables.accounts.get_mut(&uid) {
            Some(account) => {
                account.email_confirmed = true;
                account.updated_at = now;
                Ok(Some(uid))
            }
            None => Ok(None),
        }
    }
}
