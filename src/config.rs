use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Login lockout and password reset knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub max_login_attempts: i32,
    pub lockout_minutes: i64,
    pub reset_token_ttl_minutes: i64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_login_attempts: 5,
            lockout_minutes: 10,
            reset_token_ttl_minutes: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// HTTP relay endpoint; when absent mails are only logged.
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    Production,
}

impl Mode {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Mode::Production,
            _ => Mode::Development,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub mode: Mode,
    pub public_url: String,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let mode = std::env::var("APP_ENV")
            .map(|v| Mode::parse(&v))
            .unwrap_or(Mode::Development);
        let public_url = std::env::var("PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:8080".into())
            .trim_end_matches('/')
            .to_string();
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "tourbook".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "tourbook-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES").unwrap_or(60 * 24 * 90),
        };
        let defaults = SecurityConfig::default();
        let security = SecurityConfig {
            max_login_attempts: env_parse("LOGIN_MAX_ATTEMPTS")
                .unwrap_or(defaults.max_login_attempts),
            lockout_minutes: env_parse("LOGIN_LOCKOUT_MINUTES").unwrap_or(defaults.lockout_minutes),
            reset_token_ttl_minutes: env_parse("RESET_TOKEN_TTL_MINUTES")
                .unwrap_or(defaults.reset_token_ttl_minutes),
        };
        let mail = MailConfig {
            api_url: std::env::var("MAIL_API_URL").ok().filter(|v| !v.is_empty()),
            api_key: std::env::var("MAIL_API_KEY").ok().filter(|v| !v.is_empty()),
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "Tourbook <hello@tourbook.io>".into()),
        };
        Ok(Self {
            database_url,
            mode,
            public_url,
            jwt,
            security,
            mail,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
