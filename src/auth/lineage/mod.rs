/// Refresh token lineage
///
/// Every refresh token issued while tracking is enabled gets a record. A
/// rotation consumes one use of the presented token's record and appends a
/// child record, one `pair_count` further, for the token minted in its place:
///
/// ```text
/// Unused --rotate--> Used(1) --rotate--> ... --rotate--> Used(max) = Revoked
/// ```
///
/// Only the SHA-256 digest of a token is stored.

mod memory;
mod postgres;

pub use memory::InMemoryLineageStore;
pub use postgres::PgLineageStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct LineageRecord {
    pub id: Uuid,
    pub uid: Uuid,
    #[serde(skip)]
    pub token_hash: String,
    /// Position in the account's chain, starting at 0
    pub pair_count: i64,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub use_count: i32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineageState {
    Unused,
    Used(u32),
    Revoked,
}

impl LineageRecord {
    pub fn state(&self) -> LineageState {
        if self.revoked_at.is_some() {
            LineageState::Revoked
        } else if self.use_count == 0 {
            LineageState::Unused
        } else {
            LineageState::Used(self.use_count.max(0) as u32)
        }
    }
}

/// Hex SHA-256 digest used as the lookup key for a token
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Outcome of a successful rotation
#[derive(Debug, Clone)]
pub struct Rotation {
    /// The presented token's record after spending one use
    pub consumed: LineageRecord,
    /// Record of the token minted in its place
    pub successor: LineageRecord,
}

#[async_trait]
pub trait LineageStore: Send + Sync {
    /// Record a login token as the root of a new branch
    ///
    /// Its `pair_count` is one past the highest of the account, 0 for the
    /// first login.
    async fn start(&self, uid: Uuid, token_hash: &str) -> Result<LineageRecord, AppError>;

    /// Spend one use of the presented token and record its successor
    ///
    /// Both writes happen in one atomic step: either the use is spent and
    /// the successor exists with `pair_count` = predecessor + 1, or nothing
    /// changes. `None` when the presented token is unknown, belongs to
    /// another account, is revoked or is already at `max_uses`. The use that
    /// reaches `max_uses` revokes the record.
    async fn rotate(
        &self,
        uid: Uuid,
        presented_hash: &str,
        successor_hash: &str,
        max_uses: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<Rotation>, AppError>;

    /// `false` if there was no live record for the token
    async fn revoke(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, AppError>;

    async fn revoke_all(&self, uid: Uuid, now: DateTime<Utc>) -> Result<u64, AppError>;

    /// The account's records ordered by `pair_count`, then `created_at`
    async fn chain(&self, uid: Uuid) -> Result<Vec<LineageRecord>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token_is_stable_hex() {
        let digest = hash_token("some.refresh.token");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, hash_token("some.refresh.token"));
        assert_ne!(digest, hash_token("some.refresh.tokem"));
    }

    #[test]
    fn test_state_follows_counters() {
        let mut record = LineageRecord {
            id: Uuid::new_v4(),
            uid: Uuid::new_v4(),
            token_hash: hash_token("t"),
            pair_count: 0,
            parent_id: None,
            created_at: Utc::now(),
            use_count: 0,
            last_used_at: None,
            revoked_at: None,
        };
        assert_eq!(record.state(), LineageState::Unused);

        record.use_count = 1;
        assert_eq!(record.state(), LineageState::Used(1));

        record.use_count = 2;
        record.revoked_at = Some(Utc::now());
        assert_eq!(record.state(), LineageState::Revoked);
    }
}
