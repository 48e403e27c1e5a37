use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;

use crate::accounts::{Account, AccountDirectory};
use crate::audit::{AuditAction, AuditLog};
use crate::auth::hash_token;
use crate::confirmation_token::ConfirmationToken;
use crate::email_client::EmailSender;
use crate::configuration::ApplicationSettings;
use crate::error::{AppError, ValidationError};
use crate::validators::is_valid_email;

#[derive(Deserialize)]
pub struct ConfirmationQuery {
    token: String,
}

#[derive(Deserialize)]
pub struct ResendRequest {
    email: String,
}

/// Store a fresh confirmation token for `account` and mail out its link
pub async fn send_confirmation_email(
    directory: &dyn AccountDirectory,
    sender: &dyn EmailSender,
    domain: &str,
    account: &Account,
) -> Result<(), AppError> {
    let token = ConfirmationToken::new(account.uid);
    directory
        .store_confirmation(token.uid(), &token.digest(), token.expires_at())
        .await?;

    let html = confirmation_html(&account.name_first, &token.link(domain));
    sender
        .send_email(&account.email, "Confirm your email address", &html)
        .await?;

    tracing::info!(user_id = %account.uid, "Confirmation email sent");
    Ok(())
}

fn confirmation_html(name_first: &str, link: &str) -> String {
    format!(
        "<p>Welcome {}!</p><p>Click <a href=\"{}\">here</a> to confirm your email address. \
         The link expires in 24 hours.</p>",
        html_escape::encode_text(name_first),
        html_escape::encode_double_quoted_attribute(link)
    )
}

/// GET /confirm?token=…
///
/// # Errors
/// - 400: unknown, already used or expired token
pub async fn confirm_email(
    query: web::Query<ConfirmationQuery>,
    directory: web::Data<dyn AccountDirectory>,
) -> Result<HttpResponse, AppError> {
    let digest = hash_token(query.token.trim());

    match directory.confirm_email(&digest, Utc::now()).await? {
        Some(uid) => {
            AuditLog::success(AuditAction::EmailConfirm, "Email address confirmed")
                .with_user_id(uid)
                .record();
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "message": "Thank you for confirming your email address!"
            })))
        }
        None => {
            tracing::warn!("Invalid or expired confirmation token");
            Err(ValidationError::InvalidFormat("confirmation token".to_string()).into())
        }
    }
}

/// POST /confirm/resend
///
/// Mails a fresh link to an unconfirmed account. The answer is the same
/// whether or not the address belongs to one.
///
/// # Errors
/// - 400: malformed email address
/// - 503: the mail service rejected the message
pub async fn resend_confirmation(
    form: web::Json<ResendRequest>,
    directory: web::Data<dyn AccountDirectory>,
    email_sender: web::Data<dyn EmailSender>,
    app_settings: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;

    match directory.find_by_email(&email).await? {
        Some(account) if !account.email_confirmed => {
            send_confirmation_email(
                directory.get_ref(),
                email_sender.get_ref(),
                &app_settings.domain,
                &account,
            )
            .await?;
        }
        Some(_) => tracing::info!("Confirmation resend for a confirmed account ignored"),
        None => tracing::info!("Confirmation resend for an unknown address ignored"),
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "If the address belongs to an unconfirmed account, a new link is on its way"
    })))
}
