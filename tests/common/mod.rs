#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use authgate::accounts::{AccountDirectory, InMemoryAccountDirectory, NewAccount, Role};
use authgate::auth::{CredentialVerifier, InMemoryLineageStore, TokenAuthority};
use authgate::configuration::{
    ApplicationSettings, AuthSettings, DatabaseSettings, EmailSettings, Environment, Settings,
};
use authgate::email_client::EmailSender;
use authgate::error::EmailError;
use authgate::startup::{run, Backends};

pub const PASSWORD: &str = "wonderland";

/// Keeps every outgoing message instead of sending it
#[derive(Default)]
pub struct CapturingEmailSender {
    pub sent: Mutex<Vec<SentEmail>>,
    /// While set, every send fails as if the mail service were down
    pub failing: AtomicBool,
}

impl CapturingEmailSender {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[derive(Clone, Debug)]
pub struct SentEmail {
    pub recipient: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
impl EmailSender for CapturingEmailSender {
    async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        html_content: &str,
    ) -> Result<(), EmailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmailError::ServiceUnavailable("mail service down".to_string()));
        }
        self.sent.lock().unwrap().push(SentEmail {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            html: html_content.to_string(),
        });
        Ok(())
    }
}

pub struct TestApp {
    pub address: String,
    pub settings: Settings,
    pub directory: Arc<InMemoryAccountDirectory>,
    pub lineage: Arc<InMemoryLineageStore>,
    pub emails: Arc<CapturingEmailSender>,
    pub client: reqwest::Client,
}

pub fn test_settings() -> Settings {
    Settings {
        application: ApplicationSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            domain: "http://127.0.0.1".to_string(),
            allowed_origins: vec!["http://localhost:3000".to_string()],
            allow_username_change: false,
            require_email_confirmation: false,
        },
        database: DatabaseSettings {
            username: "postgres".to_string(),
            password: "password".to_string(),
            port: 5432,
            host: "localhost".to_string(),
            database_name: "authgate".to_string(),
            require_ssl: false,
        },
        auth: AuthSettings {
            access_token_secret: "test-access-secret-at-least-32-bytes-long".to_string(),
            refresh_token_secret: "test-refresh-secret-at-least-32-bytes-long".to_string(),
            access_token_expire_minutes: 15,
            refresh_token_expire_days: 7,
            refresh_token_expire_minutes: 0,
            session_only: false,
            track_lineage: true,
            max_refresh_token_uses: 2,
            password_hash_cost: 10,
        },
        email: EmailSettings {
            base_url: "http://127.0.0.1:1".to_string(),
            sender: "noreply@example.com".to_string(),
            timeout_milliseconds: 200,
        },
        environment: Environment::Local,
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(customise: impl FnOnce(&mut Settings)) -> TestApp {
    let mut settings = test_settings();
    customise(&mut settings);
    settings.validate().expect("Test settings are invalid");

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);
    settings.application.domain = address.clone();

    let directory = Arc::new(InMemoryAccountDirectory::new());
    let lineage = Arc::new(InMemoryLineageStore::new());
    let emails = Arc::new(CapturingEmailSender::default());

    let server = run(
        listener,
        settings.clone(),
        Backends {
            directory: directory.clone(),
            lineage: lineage.clone(),
            email_sender: emails.clone(),
        },
    )
    .expect("Failed to bind address");
    let _ = tokio::spawn(server);

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestApp {
        address,
        settings,
        directory,
        lineage,
        emails,
        client,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Authority sharing the server's secrets, for minting tokens in tests
    pub fn authority(&self) -> TokenAuthority {
        TokenAuthority::new(&self.settings.auth)
    }

    pub async fn register(&self, username: &str) -> reqwest::Response {
        self.register_with_name(username, "Test").await
    }

    pub async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Register and log in; returns the login response body
    pub async fn signed_in(&self, username: &str) -> Value {
        assert_eq!(self.register(username).await.status().as_u16(), 201);
        let response = self.login(username, PASSWORD).await;
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.expect("Failed to parse login response")
    }

    pub async fn register_with_name(&self, username: &str, name_first: &str) -> reqwest::Response {
        self.client
            .post(self.url("/register"))
            .json(&json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": PASSWORD,
                "name_first": name_first,
                "name_last": "User",
            }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn resend_confirmation(&self, email: &str) -> reqwest::Response {
        self.client
            .post(self.url("/confirm/resend"))
            .json(&json!({ "email": email }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn rotate(&self, refresh_token: &str) -> reqwest::Response {
        self.client
            .post(self.url("/token"))
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_with_bearer(&self, path: &str, access_token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(access_token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Create an admin directly in the directory and log in as it
    pub async fn signed_in_admin(&self, username: &str) -> Value {
        let verifier = CredentialVerifier::new(self.settings.auth.password_hash_cost).unwrap();
        self.directory
            .insert(NewAccount {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                password_hash: verifier.hash(PASSWORD).unwrap(),
                name_first: "Admin".to_string(),
                name_last: "User".to_string(),
                bio: None,
                role: Role::Admin,
                email_confirmed: true,
            })
            .await
            .expect("Failed to insert admin");
        let response = self.login(username, PASSWORD).await;
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.unwrap()
    }
}

pub fn token(body: &Value, field: &str) -> String {
    body[field]
        .as_str()
        .unwrap_or_else(|| panic!("{} missing from {}", field, body))
        .to_string()
}

/// Value of a cookie from the response's `Set-Cookie` headers
pub fn set_cookie(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{}=", name)))
        .map(str::to_string)
}
