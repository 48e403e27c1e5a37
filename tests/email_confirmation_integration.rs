mod common;

use common::{spawn_app_with, TestApp, PASSWORD};

fn confirmation_link(app: &TestApp) -> String {
    let sent = app.emails.sent.lock().unwrap();
    let email = sent.last().expect("No confirmation email was sent");
    let start = email.html.find("http").expect("No link in email");
    let end = email.html[start..].find('"').expect("Unterminated link") + start;
    email.html[start..end].to_string()
}

async fn spawn_confirming_app() -> TestApp {
    spawn_app_with(|s| s.application.require_email_confirmation = true).await
}

#[tokio::test]
async fn registration_sends_confirmation_email() {
    let app = spawn_confirming_app().await;

    let response = app.register("alice").await;

    assert_eq!(201, response.status().as_u16());
    let sent = app.emails.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "alice@example.com");
    assert!(sent[0].html.contains("/confirm?token="));
}

#[tokio::test]
async fn unconfirmed_account_cannot_log_in() {
    let app = spawn_confirming_app().await;
    app.register("alice").await;

    let response = app.login("alice", PASSWORD).await;

    assert_eq!(403, response.status().as_u16());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "EMAIL_NOT_CONFIRMED");
}

#[tokio::test]
async fn confirmation_link_enables_login_once() {
    let app = spawn_confirming_app().await;
    app.register("alice").await;
    let link = confirmation_link(&app);
    assert!(link.starts_with(&app.address));

    let confirmed = app.client.get(&link).send().await.unwrap();
    assert_eq!(200, confirmed.status().as_u16());

    let login = app.login("alice", PASSWORD).await;
    assert_eq!(200, login.status().as_u16());

    let reused = app.client.get(&link).send().await.unwrap();
    assert_eq!(400, reused.status().as_u16());
}

#[tokio::test]
async fn unknown_confirmation_token_returns_400() {
    let app = spawn_confirming_app().await;

    let response = app
        .client
        .get(app.url("/confirm?token=not-a-real-token"))
        .send()
        .await
        .unwrap();

    assert_eq!(400, response.status().as_u16());
}

#[tokio::test]
async fn missing_confirmation_token_returns_400() {
    let app = spawn_confirming_app().await;

    let response = app.client.get(app.url("/confirm")).send().await.unwrap();

    assert_eq!(400, response.status().as_u16());
}

#[tokio::test]
async fn failed_confirmation_mail_can_be_resent() {
    let app = spawn_confirming_app().await;
    app.emails.set_failing(true);

    let registered = app.register("alice").await;
    assert_eq!(201, registered.status().as_u16());
    let body: serde_json::Value = registered.json().await.unwrap();
    assert_eq!(body["confirmation_sent"], false);
    assert!(app.emails.sent.lock().unwrap().is_empty());
    assert_eq!(403, app.login("alice", PASSWORD).await.status().as_u16());

    let still_down = app.resend_confirmation("alice@example.com").await;
    assert_eq!(503, still_down.status().as_u16());

    app.emails.set_failing(false);
    let resent = app.resend_confirmation("alice@example.com").await;
    assert_eq!(200, resent.status().as_u16());

    let link = confirmation_link(&app);
    let confirmed = app.client.get(&link).send().await.unwrap();
    assert_eq!(200, confirmed.status().as_u16());
    assert_eq!(200, app.login("alice", PASSWORD).await.status().as_u16());
}

#[tokio::test]
async fn resend_does_not_reveal_accounts() {
    let app = spawn_confirming_app().await;
    app.register("alice").await;
    app.client
        .get(confirmation_link(&app))
        .send()
        .await
        .unwrap();
    let mails_before = app.emails.sent.lock().unwrap().len();

    let confirmed = app.resend_confirmation("alice@example.com").await;
    let unknown = app.resend_confirmation("nobody@example.com").await;

    assert_eq!(200, confirmed.status().as_u16());
    assert_eq!(200, unknown.status().as_u16());
    let confirmed_body: serde_json::Value = confirmed.json().await.unwrap();
    let unknown_body: serde_json::Value = unknown.json().await.unwrap();
    assert_eq!(confirmed_body, unknown_body);
    assert_eq!(app.emails.sent.lock().unwrap().len(), mails_before);
}

#[tokio::test]
async fn confirmation_mail_escapes_the_first_name() {
    let app = spawn_confirming_app().await;

    let response = app.register_with_name("mallory", "<img src=x>").await;

    assert_eq!(201, response.status().as_u16());
    let sent = app.emails.sent.lock().unwrap();
    assert!(sent[0].html.contains("&lt;img src=x&gt;"));
    assert!(!sent[0].html.contains("<img src=x>"));
}
