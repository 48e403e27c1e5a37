/// Account and profile routes

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::accounts::{Account, AccountDirectory, ProfileChanges, PublicProfile, Role};
use crate::audit::{AuditAction, AuditLog};
use crate::configuration::ApplicationSettings;
use crate::error::{AppError, AuthError, ValidationError};
use crate::middleware::AuthenticatedUser;
use crate::validators::{is_valid_bio, is_valid_image_url, is_valid_name, is_valid_username};

/// Partial profile; missing fields keep their current value
///
/// A blank `image` or `bio` clears it. Blank names and usernames are
/// ignored since those fields are required.
#[derive(Deserialize, Default)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub name_first: Option<String>,
    #[serde(default)]
    pub name_last: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Serialize)]
pub struct ProfileUpdateResponse {
    pub message: &'static str,
    /// A requested username change was dropped
    pub partial: bool,
    pub profile: PublicProfile,
}

fn provided(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Merge an optional field: absent keeps `current`, blank clears it
fn merge_optional(
    current: &Option<String>,
    update: &Option<String>,
    validate: impl Fn(&str) -> Result<String, ValidationError>,
) -> Result<Option<String>, AppError> {
    match update.as_deref().map(str::trim) {
        None => Ok(current.clone()),
        Some("") => Ok(None),
        Some(value) => Ok(Some(validate(value)?)),
    }
}

/// The caller's own account; a valid token for a vanished account is invalid
async fn load_caller(
    directory: &dyn AccountDirectory,
    user: &AuthenticatedUser,
) -> Result<Account, AppError> {
    directory
        .find_by_uid(user.uid)
        .await?
        .ok_or_else(|| AuthError::TokenInvalid.into())
}

/// Merge an update into the current profile
///
/// Returns the changes to write and whether a username change was dropped.
fn merge_profile(
    current: &Account,
    update: &ProfileUpdate,
    allow_username_change: bool,
) -> Result<(ProfileChanges, bool), AppError> {
    let requested_username = provided(&update.username)
        .map(is_valid_username)
        .transpose()?
        .filter(|username| *username != current.username);
    let dropped_rename = requested_username.is_some() && !allow_username_change;

    let username = match requested_username {
        Some(username) if allow_username_change => username,
        _ => current.username.clone(),
    };
    let name_first = match provided(&update.name_first) {
        Some(name) => is_valid_name("name_first", name)?,
        None => current.name_first.clone(),
    };
    let name_last = match provided(&update.name_last) {
        Some(name) => is_valid_name("name_last", name)?,
        None => current.name_last.clone(),
    };
    let image = merge_optional(&current.image, &update.image, is_valid_image_url)?;
    let bio = merge_optional(&current.bio, &update.bio, is_valid_bio)?;

    Ok((
        ProfileChanges {
            username,
            name_first,
            name_last,
            image,
            bio,
        },
        dropped_rename,
    ))
}

/// GET /me
pub async fn get_current_user(
    user: web::ReqData<AuthenticatedUser>,
    directory: web::Data<dyn AccountDirectory>,
) -> Result<HttpResponse, AppError> {
    let account = load_caller(directory.get_ref(), &user).await?;
    Ok(HttpResponse::Ok().json(account.summary()))
}

/// GET /users, admins only
pub async fn list_users(
    user: web::ReqData<AuthenticatedUser>,
    directory: web::Data<dyn AccountDirectory>,
) -> Result<HttpResponse, AppError> {
    let caller = load_caller(directory.get_ref(), &user).await?;
    if caller.role != Role::Admin {
        tracing::warn!(user_id = %caller.uid, role = %caller.role, "Account listing refused");
        return Err(AuthError::InsufficientRole.into());
    }

    let accounts: Vec<_> = directory
        .list()
        .await?
        .iter()
        .map(Account::summary)
        .collect();
    Ok(HttpResponse::Ok().json(accounts))
}

/// GET /users/{username}
pub async fn get_profile(
    path: web::Path<String>,
    directory: web::Data<dyn AccountDirectory>,
) -> Result<HttpResponse, AppError> {
    let account = directory
        .find_by_username(&path.into_inner())
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;
    Ok(HttpResponse::Ok().json(account.public_profile()))
}

/// POST /users/{username}
///
/// The owner or an admin may update a profile. If username changes are
/// disabled, the rest of the update is still applied and `partial` is set.
///
/// # Errors
/// - 403: caller is neither the owner nor an admin
/// - 404: no such user
/// - 409: new username already taken
pub async fn update_profile(
    path: web::Path<String>,
    user: web::ReqData<AuthenticatedUser>,
    form: web::Json<ProfileUpdate>,
    directory: web::Data<dyn AccountDirectory>,
    app_settings: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    let caller = load_caller(directory.get_ref(), &user).await?;
    let target = directory
        .find_by_username(&path.into_inner())
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;

    if target.uid != caller.uid && caller.role != Role::Admin {
        tracing::warn!(
            user_id = %caller.uid,
            target = %target.uid,
            "Profile update refused"
        );
        return Err(AuthError::InsufficientRole.into());
    }

    let (changes, partial) = merge_profile(&target, &form, app_settings.allow_username_change)?;
    let updated = directory.update_profile(target.uid, &changes).await?;

    let mut entry = AuditLog::success(AuditAction::ProfileUpdate, "Profile updated")
        .with_user_id(caller.uid);
    if updated.username != target.username {
        entry = entry.with_state_change(target.username.clone(), updated.username.clone());
    }
    entry.record();

    let message = if partial {
        "Profile updated partially. Username cannot be changed."
    } else {
        "Profile updated successfully"
    };
    Ok(HttpResponse::Ok().json(ProfileUpdateResponse {
        message,
        partial,
        profile: updated.public_profile(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn alice() -> Account {
        let now = Utc::now();
        Account {
            uid: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "hash".to_string(),
            role: Role::User,
            name_first: "Alice".to_string(),
            name_last: "Liddell".to_string(),
            bio: Some("Curious".to_string()),
            image: None,
            email_confirmed: true,
            created_at: now,
            updated_at: now,
            last_login_at: None,
            last_login_ip: None,
            login_count: 0,
        }
    }

    #[test]
    fn test_missing_and_blank_names_keep_current_values() {
        let update = ProfileUpdate {
            name_first: Some("  ".to_string()),
            ..Default::default()
        };
        let (changes, partial) = merge_profile(&alice(), &update, true).unwrap();

        assert!(!partial);
        assert_eq!(changes.name_first, "Alice");
        assert_eq!(changes.name_last, "Liddell");
        assert_eq!(changes.bio.as_deref(), Some("Curious"));
    }

    #[test]
    fn test_blank_bio_and_image_are_cleared() {
        let mut current = alice();
        current.image = Some("https://example.com/alice.png".to_string());
        let update = ProfileUpdate {
            bio: Some(String::new()),
            image: Some(" ".to_string()),
            ..Default::default()
        };
        let (changes, _) = merge_profile(&current, &update, true).unwrap();

        assert_eq!(changes.bio, None);
        assert_eq!(changes.image, None);
    }

    #[test]
    fn test_rename_dropped_when_disallowed() {
        let update = ProfileUpdate {
            username: Some("queen".to_string()),
            name_last: Some("Pleasance".to_string()),
            ..Default::default()
        };
        let (changes, partial) = merge_profile(&alice(), &update, false).unwrap();

        assert!(partial);
        assert_eq!(changes.username, "alice");
        assert_eq!(changes.name_last, "Pleasance");
    }

    #[test]
    fn test_rename_applied_when_allowed() {
        let update = ProfileUpdate {
            username: Some("queen".to_string()),
            ..Default::default()
        };
        let (changes, partial) = merge_profile(&alice(), &update, true).unwrap();

        assert!(!partial);
        assert_eq!(changes.username, "queen");
    }

    #[test]
    fn test_same_username_is_not_a_rename() {
        let update = ProfileUpdate {
            username: Some("alice".to_string()),
            ..Default::default()
        };
        let (_, partial) = merge_profile(&alice(), &update, false).unwrap();
        assert!(!partial);
    }

    #[test]
    fn test_image_must_be_http_url() {
        let update = ProfileUpdate {
            image: Some("javascript:alert(1)".to_string()),
            ..Default::default()
        };
        assert!(merge_profile(&alice(), &update, true).is_err());
    }
}
