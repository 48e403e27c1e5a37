/// Input validators for account data
///
/// Every validator trims its input and returns the normalised value, so
/// handlers store exactly what was checked.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MAX_NAME_LENGTH: usize = 256;
const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 32;
const MAX_URL_LENGTH: usize = 2048;
const MAX_BIO_LENGTH: usize = 1024;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$"
    ).expect("email regex is valid");

    static ref USERNAME_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9_.-]+$").expect("username regex is valid");
}

/// Validates an email address and returns it lowercased
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    if has_suspicious_email_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent("email".to_string()));
    }

    Ok(trimmed.to_lowercase())
}

/// Validates a username: 3 to 32 characters of letters, digits, `_`, `.`, `-`
pub fn is_valid_username(username: &str) -> Result<String, ValidationError> {
    let trimmed = username.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("username".to_string()));
    }

    if trimmed.chars().count() < MIN_USERNAME_LENGTH {
        return Err(ValidationError::TooShort(
            "username".to_string(),
            MIN_USERNAME_LENGTH,
        ));
    }

    if trimmed.chars().count() > MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong(
            "username".to_string(),
            MAX_USERNAME_LENGTH,
        ));
    }

    if !USERNAME_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("username".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates a first or last name
pub fn is_valid_name(field: &str, name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field.to_string()));
    }

    if trimmed.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong(field.to_string(), MAX_NAME_LENGTH));
    }

    if has_suspicious_name_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent(field.to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates a profile image link: absolute http(s) URL with a host
pub fn is_valid_image_url(image: &str) -> Result<String, ValidationError> {
    let trimmed = image.trim();

    if trimmed.len() > MAX_URL_LENGTH {
        return Err(ValidationError::TooLong("image".to_string(), MAX_URL_LENGTH));
    }

    let parsed = url::Url::parse(trimmed)
        .map_err(|_| ValidationError::InvalidFormat("image".to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ValidationError::InvalidFormat("image".to_string()));
    }

    Ok(parsed.to_string())
}

pub fn is_valid_bio(bio: &str) -> Result<String, ValidationError> {
    let trimmed = bio.trim();

    if trimmed.chars().count() > MAX_BIO_LENGTH {
        return Err(ValidationError::TooLong("bio".to_string(), MAX_BIO_LENGTH));
    }

    if trimmed.contains('\0') {
        return Err(ValidationError::SuspiciousContent("bio".to_string()));
    }

    Ok(trimmed.to_string())
}

fn has_suspicious_email_patterns(email: &str) -> bool {
    if let Some(at_pos) = email.find('@') {
        let local_part = &email[..at_pos];
        if local_part.len() > 64 {
            return true;
        }
    }

    if email.matches('@').count() != 1 {
        return true;
    }

    email.contains('\0')
}

fn has_suspicious_name_patterns(name: &str) -> bool {
    if name.chars().any(|c| c.is_control()) {
        return true;
    }

    let special_char_count = name
        .chars()
        .filter(|c| {
            !c.is_alphanumeric() && !c.is_whitespace() && !matches!(c, '-' | '.' | '_' | '\'')
        })
        .count();

    special_char_count > 5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(is_valid_email("user@example.com").is_ok());
        assert!(is_valid_email("test.email@domain.co.uk").is_ok());
        assert!(is_valid_email("user+tag@example.com").is_ok());
    }

    #[test]
    fn test_email_is_normalised() {
        assert_eq!(
            is_valid_email("  Alice@Example.COM ").unwrap(),
            "alice@example.com"
        );
    }

    #[test]
    fn test_invalid_email_format() {
        assert!(is_valid_email("invalid").is_err());
        assert!(is_valid_email("user@").is_err());
        assert!(is_valid_email("@example.com").is_err());
        assert!(is_valid_email("user@@example.com").is_err());
        assert!(is_valid_email("user@localhost").is_err());
    }

    #[test]
    fn test_email_length_limits() {
        let too_long = format!("{}@example.com", "a".repeat(250));
        assert!(is_valid_email(&too_long).is_err());
        assert!(is_valid_email("a@b.").is_err());
    }

    #[test]
    fn test_valid_username() {
        assert_eq!(is_valid_username(" alice ").unwrap(), "alice");
        assert!(is_valid_username("bob_the-builder.2").is_ok());
    }

    #[test]
    fn test_invalid_username() {
        assert!(is_valid_username("").is_err());
        assert!(is_valid_username("al").is_err());
        assert!(is_valid_username(&"a".repeat(33)).is_err());
        assert!(is_valid_username("alice smith").is_err());
        assert!(is_valid_username("alice@home").is_err());
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("name_first", "John").is_ok());
        assert!(is_valid_name("name_last", "Jean-Pierre").is_ok());
        assert!(is_valid_name("name_last", "O'Brien").is_ok());
    }

    #[test]
    fn test_invalid_name() {
        assert!(is_valid_name("name_first", "").is_err());
        assert!(is_valid_name("name_first", &"a".repeat(257)).is_err());
        assert!(is_valid_name("name_first", "Name\0with\0null").is_err());
        assert!(is_valid_name("name_first", "!!!!!!@@@@").is_err());
    }

    #[test]
    fn test_image_url() {
        assert!(is_valid_image_url("https://cdn.example.com/a.png").is_ok());
        assert!(is_valid_image_url("ftp://example.com/a.png").is_err());
        assert!(is_valid_image_url("not a url").is_err());
        assert!(is_valid_image_url("javascript:alert(1)").is_err());
    }

    #[test]
    fn test_bio_limits() {
        assert!(is_valid_bio("Rustacean").is_ok());
        assert!(is_valid_bio(&"b".repeat(1025)).is_err());
    }
}
