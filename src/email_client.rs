use async_trait::async_trait;
use serde::Serialize;

use crate::configuration::EmailSettings;
use crate::error::{EmailError, ValidationError};
use crate::validators::is_valid_email;

/// Outbound mail, abstracted so tests can capture messages
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        html_content: &str,
    ) -> Result<(), EmailError>;
}

/// A syntactically valid, normalised address
#[derive(Clone, Debug)]
pub struct SenderAddress(String);

impl SenderAddress {
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        Ok(Self(is_valid_email(s)?))
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    #[serde(rename = "Subject")]
    subject: &'a str,
    #[serde(rename = "Html")]
    html: &'a str,
}

/// Posts messages as JSON to `{base_url}/email`
#[derive(Clone)]
pub struct EmailClient {
    http_client: reqwest::Client,
    base_url: String,
    sender: SenderAddress,
}

impl EmailClient {
    pub fn new(base_url: String, sender: SenderAddress, timeout: std::time::Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            base_url,
            sender,
        }
    }

    pub fn from_settings(settings: &EmailSettings) -> Result<Self, ValidationError> {
        let sender = SenderAddress::parse(&settings.sender)?;
        Ok(Self::new(
            settings.base_url.clone(),
            sender,
            settings.timeout(),
        ))
    }
}

#[async_trait]
impl EmailSender for EmailClient {
    async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        html_content: &str,
    ) -> Result<(), EmailError> {
        let recipient = is_valid_email(recipient)
            .map_err(|_| EmailError::InvalidRecipient(recipient.to_string()))?;
        let url = format!("{}/email", self.base_url.trim_end_matches('/'));
        let request = SendEmailRequest {
            from: self.sender.inner(),
            to: &recipient,
            subject,
            html: html_content,
        };

        self.http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to reach email service");
                EmailError::ServiceUnavailable(e.to_string())
            })?
            .error_for_status()
            .map_err(|e| {
                tracing::error!(error = %e, "Email service returned error");
                EmailError::SendFailed(e.to_string())
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_address_parse_valid_email() {
        let sender = SenderAddress::parse("Noreply@Example.com").unwrap();
        assert_eq!(sender.inner(), "noreply@example.com");
    }

    #[test]
    fn test_sender_address_parse_invalid_email() {
        assert!(SenderAddress::parse("invalid-email").is_err());
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_rejected_before_sending() {
        let client = EmailClient::new(
            "http://127.0.0.1:1".to_string(),
            SenderAddress::parse("noreply@example.com").unwrap(),
            std::time::Duration::from_millis(200),
        );

        let result = client.send_email("not-an-address", "Hi", "<p>Hi</p>").await;
        assert!(matches!(result, Err(EmailError::InvalidRecipient(_))));
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let client = EmailClient::new(
            "http://127.0.0.1:1".to_string(),
            SenderAddress::parse("noreply@example.com").unwrap(),
            std::time::Duration::from_millis(200),
        );

        let result = client
            .send_email("alice@example.com", "Hi", "<p>Hi</p>")
            .await;
        assert!(result.is_err());
    }
}
