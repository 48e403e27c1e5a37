use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use uuid::Uuid;

use crate::auth::hash_token;

const TOKEN_LENGTH: usize = 64;

/// Single-use email confirmation token
///
/// The plaintext goes into the confirmation link; only `digest()` is stored.
#[derive(Clone, Debug)]
pub struct ConfirmationToken {
    token: String,
    uid: Uuid,
    expires_at: DateTime<Utc>,
}

impl ConfirmationToken {
    pub fn new(uid: Uuid) -> Self {
        let token = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();

        Self {
            token,
            uid,
            expires_at: Utc::now() + Duration::hours(24),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn uid(&self) -> Uuid {
        self.uid
    }

    pub fn digest(&self) -> String {
        hash_token(&self.token)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn link(&self, domain: &str) -> String {
        format!("{}/confirm?token={}", domain.trim_end_matches('/'), self.token)
    }
}
