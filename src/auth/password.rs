/// Credential hashing and verification
///
/// bcrypt with a configurable work factor. Verification never errors: a
/// malformed stored hash counts as a mismatch so a corrupt row cannot be
/// told apart from a wrong password by the caller.

use std::sync::OnceLock;

use crate::error::{AppError, ConfigError, ValidationError};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

const MIN_COST: u32 = 10;
const MAX_COST: u32 = 31;

#[derive(Debug)]
pub struct CredentialVerifier {
    cost: u32,
    /// Hash compared against when the account does not exist
    dummy_hash: OnceLock<String>,
}

impl CredentialVerifier {
    pub fn new(cost: u32) -> Result<Self, AppError> {
        if !(MIN_COST..=MAX_COST).contains(&cost) {
            return Err(ConfigError::InvalidValue(format!(
                "password hash cost must be within {}..={}, got {}",
                MIN_COST, MAX_COST, cost
            ))
            .into());
        }
        Ok(Self {
            cost,
            dummy_hash: OnceLock::new(),
        })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Salted hash of `password`; two calls never return the same string
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        bcrypt::hash(password, self.cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    pub fn verify(&self, stored_hash: &str, supplied: &str) -> bool {
        match bcrypt::verify(supplied, stored_hash) {
            Ok(matches) => matches,
            Err(_) => {
                // the error text can echo the stored hash, keep it out of logs
                tracing::error!("Stored password hash could not be parsed");
                false
            }
        }
    }

    /// Spend the same work as a real verification; used for unknown accounts
    pub fn verify_dummy(&self, supplied: &str) {
        let hash = self.dummy_hash.get_or_init(|| {
            bcrypt::hash(uuid::Uuid::new_v4().to_string(), self.cost).unwrap_or_default()
        });
        let _ = bcrypt::verify(supplied, hash);
    }
}

/// Length rule applied at registration
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let length = password.chars().count();
    if length == 0 {
        return Err(ValidationError::EmptyField("password".to_string()));
    }
    if length < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        ));
    }
    // bcrypt only looks at the first 72 bytes; the cap also bounds hashing work
    if length > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        ));
    }
    Ok(())
}
