/// JWT claims
///
/// Wire format: `{sub, iat, exp?, jti}`. `exp` is absent only on
/// session-scoped refresh tokens; `jti` keeps two tokens minted for the same
/// account within one second distinct.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TokenError;

/// Which secret a token is signed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Account uid
    pub sub: String,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    pub jti: String,
}

impl Claims {
    pub fn new(uid: Uuid, issued_at: DateTime<Utc>, ttl: Option<Duration>) -> Self {
        let iat = issued_at.timestamp();
        Self {
            sub: uid.to_string(),
            iat,
            exp: ttl.map(|ttl| iat + ttl.num_seconds()),
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// A subject that is not a uid means the token was not minted here
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Invalid)
    }
}
