use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{LineageRecord, LineageStore, Rotation};
use crate::error::AppError;

/// Lineage kept in process memory; every operation runs under one lock
#[derive(Default)]
pub struct InMemoryLineageStore {
    records: Mutex<Vec<LineageRecord>>,
}

impl InMemoryLineageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<LineageRecord>>, AppError> {
        self.records
            .lock()
            .map_err(|_| AppError::Internal("lineage store lock poisoned".to_string()))
    }
}

fn new_record(
    uid: Uuid,
    token_hash: &str,
    pair_count: i64,
    parent_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> LineageRecord {
    LineageRecord {
        id: Uuid::new_v4(),
        uid,
        token_hash: token_hash.to_string(),
        pair_count,
        parent_id,
        created_at: now,
        use_count: 0,
        last_used_at: None,
        revoked_at: None,
    }
}

fn ensure_unrecorded(records: &[LineageRecord], token_hash: &str) -> Result<(), AppError> {
    if records.iter().any(|r| r.token_hash == token_hash) {
        return Err(AppError::conflict("Token already recorded"));
    }
    Ok(())
}

#[async_trait]
impl LineageStore for InMemoryLineageStore {
    async fn start(&self, uid: Uuid, token_hash: &str) -> Result<LineageRecord, AppError> {
        let mut records = self.lock()?;
        ensure_unrecorded(&records, token_hash)?;

        let pair_count = records
            .iter()
            .filter(|r| r.uid == uid)
            .map(|r| r.pair_count)
            .max()
            .map_or(0, |latest| latest + 1);

        let record = new_record(uid, token_hash, pair_count, None, Utc::now());
        records.push(record.clone());
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
        let mut records = self.lock()?;
        let max_uses = i32::try_from(max_uses).unwrap_or(i32::MAX);
        ensure_unrecorded(&records, successor_hash)?;

        let Some(record) = records.iter_mut().find(|r| {
            r.token_hash == presented_hash
                && r.uid == uid
                && r.revoked_at.is_none()
                && r.use_count < max_uses
        }) else {
            return Ok(None);
        };

        record.use_count += 1;
        record.last_used_at = Some(now);
        if record.use_count >= max_uses {
            record.revoked_at = Some(now);
        }
        let consumed = record.clone();

        let successor = new_record(
            uid,
            successor_hash,
            consumed.pair_count + 1,
            Some(consumed.id),
            now,
        );
        records.push(successor.clone());

        Ok(Some(Rotation {
            consumed,
            successor,
        }))
    }

    async fn revoke(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let mut records = self.lock()?;
        match records
            .iter_mut()
            .find(|r| r.token_hash == token_hash && r.revoked_at.is_none())
        {
            Some(record) => {
                record.revoked_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_all(&self, uid: Uuid, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut records = self.lock()?;
        let mut revoked = 0;
        for record in records
            .iter_mut()
            .filter(|r| r.uid == uid && r.revoked_at.is_none())
        {
            record.revoked_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn chain(&self, uid: Uuid) -> Result<Vec<LineageRecord>, AppError> {
        let mut chain: Vec<LineageRecord> = self
            .lock()?
            .iter()
            .filter(|r| r.uid == uid)
            .cloned()
            .collect();
        chain.sort_by_key(|r| (r.pair_count, r.created_at));
        Ok(chain)
    }
}
