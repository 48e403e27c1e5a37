/// Authentication routes
///
/// Registration, login, refresh token rotation, access token validation and
/// logout. Tokens are returned in the body and mirrored into the `_atk` and
/// `_rtk` cookies so browser clients never have to touch them.

use actix_web::{web, HttpRequest, HttpResponse, HttpResponseBuilder};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::accounts::{AccountDirectory, NewAccount, Role};
use crate::audit::{AuditAction, AuditLog};
use crate::auth::{validate_password, CredentialVerifier, TokenAuthority, TokenKind, TokenPair};
use crate::configuration::ApplicationSettings;
use crate::cookies::{purge_token_cookies, read_cookie, CookiePolicy, REFRESH_COOKIE};
use crate::email_client::EmailSender;
use crate::error::{AppError, AuthError, RequestContext, TokenError};
use crate::middleware::{access_token_from, AuthenticatedUser};
use crate::routes::confirmation::send_confirmation_email;
use crate::validators::{is_valid_bio, is_valid_email, is_valid_name, is_valid_username};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub name_first: String,
    pub name_last: String,
    #[serde(default)]
    pub bio: Option<String>,
}

/// `username` may also hold an email address
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Default)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Revoke every refresh token of the account, not just this one
    #[serde(default)]
    pub everywhere: bool,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub message: &'static str,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair_count: Option<i64>,
}

fn token_response(
    mut builder: HttpResponseBuilder,
    message: &'static str,
    pair: TokenPair,
    authority: &TokenAuthority,
    cookies: &CookiePolicy,
) -> HttpResponse {
    let expires_in = authority
        .ttl(TokenKind::Access)
        .map(|ttl| ttl.num_seconds())
        .unwrap_or_default();

    builder
        .cookie(cookies.access_cookie(&pair.access_token))
        .cookie(cookies.refresh_cookie(&pair.refresh_token))
        .json(TokenResponse {
            message,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer",
            expires_in,
            pair_count: pair.pair_count,
        })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn client_ip(req: &HttpRequest) -> Option<String> {
    req.connection_info().realip_remote_addr().map(str::to_string)
}

/// POST /register
///
/// Creates an account; no tokens are issued. With email confirmation
/// enabled the account starts unconfirmed and a link is mailed out; a
/// failed send is reported as `confirmation_sent: false`.
///
/// # Errors
/// - 400: invalid username, email, name or password
/// - 409: username or email already taken
pub async fn register(
    form: web::Json<RegisterRequest>,
    directory: web::Data<dyn AccountDirectory>,
    verifier: web::Data<CredentialVerifier>,
    email_sender: web::Data<dyn EmailSender>,
    app_settings: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    let context = RequestContext::new("register");
    let form = form.into_inner();

    let username = is_valid_username(&form.username)?;
    let email = is_valid_email(&form.email)?;
    let name_first = is_valid_name("name_first", &form.name_first)?;
    let name_last = is_valid_name("name_last", &form.name_last)?;
    let bio = non_empty(form.bio)
        .map(|bio| is_valid_bio(&bio))
        .transpose()?;
    validate_password(&form.password)?;

    let password = form.password;
    let verifier = verifier.into_inner();
    let password_hash = tokio::task::spawn_blocking(move || verifier.hash(&password)).await??;

    let require_confirmation = app_settings.require_email_confirmation;
    let account = directory
        .insert(NewAccount {
            username,
            email,
            password_hash,
            name_first,
            name_last,
            bio,
            role: Role::User,
            email_confirmed: !require_confirmation,
        })
        .await
        .map_err(|e| context.report(e))?;

    let mut confirmation_sent = false;
    if require_confirmation {
        match send_confirmation_email(
            directory.get_ref(),
            email_sender.get_ref(),
            &app_settings.domain,
            &account,
        )
        .await
        {
            Ok(()) => confirmation_sent = true,
            // the account stays; POST /confirm/resend mails a new link
            Err(e) => tracing::error!(
                request_id = %context.request_id,
                user_id = %account.uid,
                error = %e,
                "Failed to send confirmation email"
            ),
        }
    }

    AuditLog::success(AuditAction::Register, "Account created")
        .with_user_id(account.uid)
        .record();
    tracing::info!(
        request_id = %context.request_id,
        user_id = %account.uid,
        "User registered successfully"
    );

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "User created successfully",
        "uid": account.uid,
        "username": account.username,
        "email_confirmed": account.email_confirmed,
        "confirmation_sent": confirmation_sent,
    })))
}

/// POST /login
///
/// Unknown accounts and wrong passwords are indistinguishable, both in the
/// response and in the time taken.
///
/// # Errors
/// - 401: invalid credentials
/// - 403: email address not confirmed yet
pub async fn login(
    req: HttpRequest,
    form: web::Json<LoginRequest>,
    directory: web::Data<dyn AccountDirectory>,
    verifier: web::Data<CredentialVerifier>,
    authority: web::Data<TokenAuthority>,
    cookies: web::Data<CookiePolicy>,
    app_settings: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    let context = RequestContext::new("login");
    let ip = client_ip(&req);
    let LoginRequest { username, password } = form.into_inner();
    let identifier = username.trim();

    let account = if identifier.contains('@') {
        directory.find_by_email(&identifier.to_lowercase()).await?
    } else {
        directory.find_by_username(identifier).await?
    };

    let verifier = verifier.into_inner();
    let account = match account {
        Some(account) => {
            let stored_hash = account.password_hash.clone();
            let matches =
                tokio::task::spawn_blocking(move || verifier.verify(&stored_hash, &password))
                    .await?;
            matches.then_some(account)
        }
        None => {
            tokio::task::spawn_blocking(move || verifier.verify_dummy(&password)).await?;
            None
        }
    };

    let Some(account) = account else {
        AuditLog::failure(AuditAction::Login, "Invalid credentials")
            .with_client_ip(ip.as_deref())
            .record();
        return Err(AuthError::InvalidCredentials.into());
    };

    if app_settings.require_email_confirmation && !account.email_confirmed {
        AuditLog::failure(AuditAction::Login, "Email address not confirmed")
            .with_user_id(account.uid)
            .with_client_ip(ip.as_deref())
            .record();
        return Err(AuthError::EmailNotConfirmed.into());
    }

    directory
        .record_login(account.uid, ip.as_deref(), Utc::now())
        .await?;
    let pair = authority.mint_pair(account.uid).await?;

    AuditLog::success(AuditAction::Login, "Login succeeded")
        .with_user_id(account.uid)
        .with_client_ip(ip.as_deref())
        .record();
    tracing::info!(
        request_id = %context.request_id,
        user_id = %account.uid,
        "User logged in successfully"
    );

    Ok(token_response(
        HttpResponse::Ok(),
        "Login successful",
        pair,
        &authority,
        &cookies,
    ))
}

/// POST /token
///
/// Exchanges a refresh token, from the body or the `_rtk` cookie, for a new
/// pair. A replayed, revoked or forged token gets 401 `TOKEN_INVALID` and the
/// token cookies are cleared.
pub async fn rotate_token(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    authority: web::Data<TokenAuthority>,
    cookies: web::Data<CookiePolicy>,
) -> Result<HttpResponse, AppError> {
    let refresh_token = body
        .and_then(|body| non_empty(body.into_inner().refresh_token))
        .or_else(|| read_cookie(&req, REFRESH_COOKIE))
        .ok_or(AuthError::MissingToken)?;

    let pair = authority.rotate(&refresh_token).await?;

    Ok(token_response(
        HttpResponse::Ok(),
        "Token refreshed successfully",
        pair,
        &authority,
        &cookies,
    ))
}

/// GET /token
///
/// Reports whether the presented access token is valid. When it is missing
/// or expired and a `_rtk` cookie is present, the pair is rotated and the new
/// tokens are returned.
pub async fn validate_token(
    req: HttpRequest,
    authority: web::Data<TokenAuthority>,
    cookies: web::Data<CookiePolicy>,
) -> Result<HttpResponse, AppError> {
    let decoded = access_token_from(&req).map(|token| authority.decode(&token, TokenKind::Access));

    let fallback_error: AppError = match decoded {
        Some(Ok(uid)) => {
            return Ok(HttpResponse::Ok().json(serde_json::json!({
                "message": "Token is valid",
                "uid": uid,
            })));
        }
        Some(Err(TokenError::Invalid)) => return Err(TokenError::Invalid.into()),
        Some(Err(TokenError::Expired)) => TokenError::Expired.into(),
        None => AuthError::MissingToken.into(),
    };

    let Some(refresh_token) = read_cookie(&req, REFRESH_COOKIE) else {
        return Err(fallback_error);
    };
    let pair = authority.rotate(&refresh_token).await?;

    Ok(token_response(
        HttpResponse::Ok(),
        "Token refreshed successfully",
        pair,
        &authority,
        &cookies,
    ))
}

/// DELETE /logout
///
/// Always succeeds and clears both cookies. The presented refresh token's
/// lineage record is revoked; with `everywhere` every record of the account.
pub async fn logout(
    req: HttpRequest,
    body: Option<web::Json<LogoutRequest>>,
    authority: web::Data<TokenAuthority>,
) -> Result<HttpResponse, AppError> {
    let LogoutRequest {
        refresh_token,
        everywhere,
    } = body.map(|body| body.into_inner()).unwrap_or_default();
    let refresh_token = non_empty(refresh_token).or_else(|| read_cookie(&req, REFRESH_COOKIE));

    let mut revoked = 0;
    let mut uid = None;
    if let Some(refresh_token) = refresh_token {
        uid = authority.decode(&refresh_token, TokenKind::Refresh).ok();
        if everywhere {
            if let Some(uid) = uid {
                revoked = authority.revoke_all(uid).await?;
            }
        } else if authority.revoke(&refresh_token).await? {
            revoked = 1;
        }
    }

    let mut entry = AuditLog::success(AuditAction::Logout, "Logged out")
        .with_state_change("live", format!("{} revoked", revoked));
    if let Some(uid) = uid {
        entry = entry.with_user_id(uid);
    }
    entry.record();

    let mut response = HttpResponse::Ok().json(serde_json::json!({
        "message": "Logged out successfully",
        "revoked": revoked,
    }));
    purge_token_cookies(&mut response);
    Ok(response)
}

/// GET /me/tokens
///
/// The caller's refresh token lineage, oldest first. Digests are never
/// serialized. Empty when lineage tracking is off.
pub async fn list_token_lineage(
    user: web::ReqData<AuthenticatedUser>,
    authority: web::Data<TokenAuthority>,
) -> Result<HttpResponse, AppError> {
    let chain = authority.lineage(user.uid).await?;
    Ok(HttpResponse::Ok().json(chain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_bio_is_optional() {
        let json = r#"{
            "username": "alice",
            "email": "alice@example.com",
            "password": "wonderland",
            "name_first": "Alice",
            "name_last": "Liddell"
        }"#;
        let request: RegisterRequest = serde_json::from_str(json).unwrap();
        assert!(request.bio.is_none());
    }

    #[test]
    fn test_logout_request_defaults() {
        let request: LogoutRequest = serde_json::from_str("{}").unwrap();
        assert!(request.refresh_token.is_none());
        assert!(!request.everywhere);
    }

    #[test]
    fn test_blank_tokens_are_ignored() {
        assert_eq!(non_empty(Some("  ".to_string())), None);
        assert_eq!(non_empty(Some("abc".to_string())), Some("abc".to_string()));
    }
}
