/// Token authority
///
/// Mints access/refresh pairs and rotates refresh tokens. With lineage
/// tracking enabled, every refresh token is bound to a lineage record and
/// may be rotated at most `max_refresh_token_uses` times; after that it is
/// revoked and any further presentation fails exactly like a forged token.

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLog};
use crate::auth::claims::TokenKind;
use crate::auth::jwt::TokenCodec;
use crate::auth::lineage::{hash_token, LineageRecord, LineageState, LineageStore, Rotation};
use crate::configuration::AuthSettings;
use crate::error::{AppError, TokenError};

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Position of the refresh token in its lineage; `None` when untracked
    pub pair_count: Option<i64>,
}

#[derive(Clone)]
pub struct TokenAuthority {
    codec: TokenCodec,
    lineage: Option<Arc<dyn LineageStore>>,
    max_refresh_uses: u32,
}

impl TokenAuthority {
    pub fn new(settings: &AuthSettings) -> Self {
        Self {
            codec: TokenCodec::new(settings),
            lineage: None,
            max_refresh_uses: settings.max_refresh_token_uses.max(1),
        }
    }

    pub fn with_lineage(mut self, store: Arc<dyn LineageStore>) -> Self {
        self.lineage = Some(store);
        self
    }

    pub fn tracks_lineage(&self) -> bool {
        self.lineage.is_some()
    }

    pub fn ttl(&self, kind: TokenKind) -> Option<Duration> {
        self.codec.ttl(kind)
    }

    pub fn issue(&self, uid: Uuid, kind: TokenKind) -> Result<String, AppError> {
        self.codec.issue(uid, kind)
    }

    /// Subject of a valid token of the given kind
    pub fn decode(&self, token: &str, kind: TokenKind) -> Result<Uuid, TokenError> {
        self.codec.decode(token, kind)?.user_id()
    }

    /// Login path: a fresh pair starting a new branch of the account's lineage
    pub async fn mint_pair(&self, uid: Uuid) -> Result<TokenPair, AppError> {
        let (access_token, refresh_token) = self.fresh_tokens(uid)?;

        let pair_count = match &self.lineage {
            Some(store) => Some(store.start(uid, &hash_token(&refresh_token)).await?.pair_count),
            None => None,
        };

        Ok(TokenPair {
            access_token,
            refresh_token,
            pair_count,
        })
    }

    fn fresh_tokens(&self, uid: Uuid) -> Result<(String, String), AppError> {
        Ok((
            self.codec.issue(uid, TokenKind::Access)?,
            self.codec.issue(uid, TokenKind::Refresh)?,
        ))
    }

    /// Exchange a refresh token for a new pair
    ///
    /// The successor tokens are minted up front; they are only handed out
    /// once the store has spent the presented token's use and recorded the
    /// successor in the same step.
    pub async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let uid = self.decode(refresh_token, TokenKind::Refresh)?;
        let (access_token, successor) = self.fresh_tokens(uid)?;

        let pair_count = match &self.lineage {
            Some(store) => {
                let rotation = store
                    .rotate(
                        uid,
                        &hash_token(refresh_token),
                        &hash_token(&successor),
                        self.max_refresh_uses,
                        Utc::now(),
                    )
                    .await?;
                Some(self.check_rotation(uid, rotation)?.successor.pair_count)
            }
            None => None,
        };

        AuditLog::success(AuditAction::TokenRotate, "Refresh token rotated")
            .with_user_id(uid)
            .record();
        Ok(TokenPair {
            access_token,
            refresh_token: successor,
            pair_count,
        })
    }

    fn check_rotation(
        &self,
        uid: Uuid,
        rotation: Option<Rotation>,
    ) -> Result<Rotation, TokenError> {
        match rotation {
            Some(rotation) => {
                if rotation.consumed.state() == LineageState::Revoked {
                    tracing::info!(
                        uid = %uid,
                        pair_count = rotation.consumed.pair_count,
                        "Refresh token reached its reuse limit and was revoked"
                    );
                }
                Ok(rotation)
            }
            None => {
                AuditLog::failure(
                    AuditAction::TokenReuseRejected,
                    "Refresh token unknown, revoked or past its reuse limit",
                )
                .with_user_id(uid)
                .record();
                Err(TokenError::Invalid)
            }
        }
    }

    /// Logout path; `false` when there was nothing live to revoke
    pub async fn revoke(&self, refresh_token: &str) -> Result<bool, AppError> {
        match &self.lineage {
            Some(store) => store.revoke(&hash_token(refresh_token), Utc::now()).await,
            None => Ok(false),
        }
    }

    pub async fn revoke_all(&self, uid: Uuid) -> Result<u64, AppError> {
        match &self.lineage {
            Some(store) => store.revoke_all(uid, Utc::now()).await,
            None => Ok(0),
        }
    }

    pub async fn lineage(&self, uid: Uuid) -> Result<Vec<LineageRecord>, AppError> {
        match &self.lineage {
            Some(store) => store.chain(uid).await,
            None => Ok(Vec::new()),
        }
    }
}
