use chrono::Duration;

use crate::error::ConfigError;

const MIN_SECRET_LENGTH: usize = 32;
const MIN_HASH_COST: u32 = 10;
const MAX_HASH_COST: u32 = 31;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub email: EmailSettings,
    #[serde(skip, default)]
    pub environment: Environment,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    /// Public base URL, used to build confirmation links
    pub domain: String,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub allow_username_change: bool,
    #[serde(default)]
    pub require_email_confirmation: bool,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default)]
    pub require_ssl: bool,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        let ssl_mode = if self.require_ssl { "require" } else { "prefer" };
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.username, self.password, self.host, self.port, self.database_name, ssl_mode
        )
    }
}

/// Token and credential settings
///
/// Access and refresh tokens are signed with different secrets, so a token of
/// one kind never verifies as the other.
#[derive(serde::Deserialize, Clone, Debug)]
pub struct AuthSettings {
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    #[serde(default = "default_access_minutes")]
    pub access_token_expire_minutes: i64,
    #[serde(default = "default_refresh_days")]
    pub refresh_token_expire_days: i64,
    #[serde(default)]
    pub refresh_token_expire_minutes: i64,
    /// Refresh tokens carry no `exp` and live in a session cookie
    #[serde(default)]
    pub session_only: bool,
    #[serde(default = "default_true")]
    pub track_lineage: bool,
    #[serde(default = "default_max_uses")]
    pub max_refresh_token_uses: u32,
    #[serde(default = "default_hash_cost")]
    pub password_hash_cost: u32,
}

fn default_access_minutes() -> i64 {
    60
}

fn default_refresh_days() -> i64 {
    7
}

fn default_true() -> bool {
    true
}

fn default_max_uses() -> u32 {
    2
}

fn default_hash_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

impl AuthSettings {
    pub fn access_token_ttl(&self) -> Duration {
        Duration::minutes(self.access_token_expire_minutes)
    }

    /// `None` when refresh tokens are session-scoped
    pub fn refresh_token_ttl(&self) -> Option<Duration> {
        if self.session_only {
            None
        } else {
            Some(
                Duration::days(self.refresh_token_expire_days)
                    + Duration::minutes(self.refresh_token_expire_minutes),
            )
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_token_secret.is_empty() || self.refresh_token_secret.is_empty() {
            return Err(ConfigError::MissingRequired("token secrets".to_string()));
        }
        if self.access_token_secret.len() < MIN_SECRET_LENGTH
            || self.refresh_token_secret.len() < MIN_SECRET_LENGTH
        {
            return Err(ConfigError::InvalidValue(format!(
                "token secrets must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if self.access_token_secret == self.refresh_token_secret {
            return Err(ConfigError::InvalidValue(
                "access and refresh token secrets must differ".to_string(),
            ));
        }
        if self.access_token_expire_minutes <= 0 {
            return Err(ConfigError::InvalidValue(
                "access_token_expire_minutes must be positive".to_string(),
            ));
        }
        if let Some(ttl) = self.refresh_token_ttl() {
            if ttl <= Duration::zero() {
                return Err(ConfigError::InvalidValue(
                    "refresh token lifetime must be positive unless session_only is set"
                        .to_string(),
                ));
            }
        }
        if self.max_refresh_token_uses == 0 {
            return Err(ConfigError::InvalidValue(
                "max_refresh_token_uses must be at least 1".to_string(),
            ));
        }
        if !(MIN_HASH_COST..=MAX_HASH_COST).contains(&self.password_hash_cost) {
            return Err(ConfigError::InvalidValue(format!(
                "password_hash_cost must be between {} and {}",
                MIN_HASH_COST, MAX_HASH_COST
            )));
        }
        Ok(())
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct EmailSettings {
    pub base_url: String,
    pub sender: String,
    #[serde(default = "default_email_timeout")]
    pub timeout_milliseconds: u64,
}

fn default_email_timeout() -> u64 {
    10_000
}

impl EmailSettings {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_milliseconds)
    }
}

/// Runtime environment, selected with `APP_ENVIRONMENT`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl TryFrom<String> for Environment {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" | "development" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(ConfigError::InvalidValue(format!(
                "{} is not a supported environment. Use either `local` or `production`",
                other
            ))),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.auth.validate()?;
        if self.application.require_email_confirmation && self.email.sender.is_empty() {
            return Err(ConfigError::MissingRequired("email.sender".to_string()));
        }
        for origin in &self.application.allowed_origins {
            let parsed = url::Url::parse(origin).map_err(|_| {
                ConfigError::InvalidValue(format!("allowed origin {:?} is not a URL", origin))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidValue(format!(
                    "allowed origin {:?} must use http or https",
                    origin
                )));
            }
        }
        Ok(())
    }
}

/// Load settings from `configuration/base`, `configuration/<environment>` and
/// `APP_`-prefixed environment variables, in that order of precedence.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()?;

    let base_path = std::env::current_dir()
        .map_err(|e| ConfigError::ParseError(format!("cannot read working directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base")).required(false))
        .add_source(
            config::File::from(configuration_directory.join(environment.as_str())).required(false),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("application.allowed_origins"),
        )
        .build()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    let mut settings = settings
        .try_deserialize::<Settings>()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;
    settings.environment = environment;
    settings.validate()?;

    Ok(settings)
}
