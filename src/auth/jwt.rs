/// JWT signing and verification
///
/// Access and refresh tokens are HS256-signed with separate secrets. Decoding
/// verifies the signature before looking at `exp`, so a forged token is
/// always `Invalid` even when its claimed expiry has passed.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenKind};
use crate::configuration::AuthSettings;
use crate::error::{AppError, TokenError};

#[derive(Clone)]
struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[derive(Clone)]
pub struct TokenCodec {
    access: SigningKey,
    refresh: SigningKey,
    access_ttl: Duration,
    refresh_ttl: Option<Duration>,
}

impl TokenCodec {
    pub fn new(settings: &AuthSettings) -> Self {
        Self {
            access: SigningKey::from_secret(&settings.access_token_secret),
            refresh: SigningKey::from_secret(&settings.refresh_token_secret),
            access_ttl: settings.access_token_ttl(),
            refresh_ttl: settings.refresh_token_ttl(),
        }
    }

    fn key(&self, kind: TokenKind) -> &SigningKey {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Lifetime of a token of this kind; `None` for session refresh tokens
    pub fn ttl(&self, kind: TokenKind) -> Option<Duration> {
        match kind {
            TokenKind::Access => Some(self.access_ttl),
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    pub fn issue(&self, uid: Uuid, kind: TokenKind) -> Result<String, AppError> {
        self.issue_at(uid, kind, Utc::now())
    }

    /// Issue a token as if the current time were `now`
    pub fn issue_at(
        &self,
        uid: Uuid,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let claims = Claims::new(uid, now, self.ttl(kind));

        encode(&Header::new(Algorithm::HS256), &claims, &self.key(kind).encoding).map_err(|e| {
            AppError::Internal(format!("{} token generation failed: {}", kind.as_str(), e))
        })
    }

    pub fn decode(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        if self.ttl(kind).is_some() {
            validation.set_required_spec_claims(&["exp", "sub"]);
        } else {
            validation.set_required_spec_claims(&["sub"]);
        }

        decode::<Claims>(token, &self.key(kind).decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => {
                    tracing::debug!(kind = kind.as_str(), error = %e, "JWT validation error");
                    TokenError::Invalid
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test_config() -> AuthSettings {
        AuthSettings {
            access_token_secret: "access-secret-key-at-least-32-characters".to_string(),
            refresh_token_secret: "refresh-secret-key-at-least-32-characters".to_string(),
            access_token_expire_minutes: 60,
            refresh_token_expire_days: 7,
            refresh_token_expire_minutes: 0,
            session_only: false,
            track_lineage: true,
            max_refresh_token_uses: 2,
            password_hash_cost: 10,
        }
    }

    #[test]
    fn test_issue_and_decode_same_kind() {
        let codec = TokenCodec::new(&get_test_config());
        let uid = Uuid::new_v4();

        for kind in [TokenKind::Access, TokenKind::Refresh] {
            let token = codec.issue(uid, kind).expect("Failed to generate token");
            let claims = codec.decode(&token, kind).expect("Failed to validate token");
            assert_eq!(claims.user_id().unwrap(), uid);
            assert!(claims.exp.is_some());
        }
    }

    #[test]
    fn test_cross_kind_use_is_invalid() {
        let codec = TokenCodec::new(&get_test_config());
        let uid = Uuid::new_v4();

        let access = codec.issue(uid, TokenKind::Access).unwrap();
        let refresh = codec.issue(uid, TokenKind::Refresh).unwrap();

        assert_eq!(
            codec.decode(&access, TokenKind::Refresh),
            Err(TokenError::Invalid)
        );
        assert_eq!(
            codec.decode(&refresh, TokenKind::Access),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn test_expired_token_is_expired_not_invalid() {
        let codec = TokenCodec::new(&get_test_config());
        let two_hours_ago = Utc::now() - Duration::hours(2);

        let token = codec
            .issue_at(Uuid::new_v4(), TokenKind::Access, two_hours_ago)
            .unwrap();

        assert_eq!(codec.decode(&token, TokenKind::Access), Err(TokenError::Expired));
    }

    #[test]
    fn test_expired_token_with_wrong_secret_is_invalid() {
        let codec = TokenCodec::new(&get_test_config());
        let token = codec
            .issue_at(Uuid::new_v4(), TokenKind::Access, Utc::now() - Duration::hours(2))
            .unwrap();

        assert_eq!(codec.decode(&token, TokenKind::Refresh), Err(TokenError::Invalid));
    }

    #[test]
    fn test_garbage_token() {
        let codec = TokenCodec::new(&get_test_config());
        assert_eq!(
            codec.decode("invalid.token.here", TokenKind::Access),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn test_tampered_token() {
        let codec = TokenCodec::new(&get_test_config());
        let token = codec.issue(Uuid::new_v4(), TokenKind::Access).unwrap();

        let tampered = format!("{}X", token);
        assert_eq!(
            codec.decode(&tampered, TokenKind::Access),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn test_session_refresh_token_has_no_expiry() {
        let mut config = get_test_config();
        config.session_only = true;
        let codec = TokenCodec::new(&config);

        let token = codec
            .issue_at(Uuid::new_v4(), TokenKind::Refresh, Utc::now() - Duration::days(365))
            .unwrap();
        let claims = codec.decode(&token, TokenKind::Refresh).unwrap();
        assert!(claims.exp.is_none());
    }

    #[test]
    fn test_refresh_token_without_exp_rejected_when_lifetime_configured() {
        let mut session_config = get_test_config();
        session_config.session_only = true;
        let session_codec = TokenCodec::new(&session_config);
        let token = session_codec
            .issue(Uuid::new_v4(), TokenKind::Refresh)
            .unwrap();

        let codec = TokenCodec::new(&get_test_config());
        assert_eq!(codec.decode(&token, TokenKind::Refresh), Err(TokenError::Invalid));
    }
}
