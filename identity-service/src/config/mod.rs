use service_core::config::{self as core_config, Environment, get_env, get_optional_env, parse_env};
use service_core::error::AppError;
use std::net::IpAddr;
use url::Url;

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// Public base URL of the issuer; also the `iss` claim.
    pub issuer_url: String,
    pub jwt: JwtConfig,
    pub tokens: TokenSettings,
    pub session: SessionConfig,
    pub database_url: Option<String>,
    pub seed_file: Option<String>,
    pub rate_limit: RateLimitConfig,
    /// Browser origins allowed to call the issuer cross-origin. Empty disables CORS.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub private_key_path: String,
    pub public_key_path: String,
    pub key_id: String,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenSettings {
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_days: i64,
    pub authorization_code_ttl_seconds: i64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            access_token_ttl_seconds: 900,
            refresh_token_ttl_days: 30,
            authorization_code_ttl_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub ttl_minutes: i64,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Per client IP.
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    /// Per authenticated OAuth client, shared by `/token` and `/revoke`.
    pub token_attempts: u32,
    pub token_window_seconds: u64,
    /// Reverse proxies whose `X-Forwarded-For` is believed.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_attempts: 10,
            login_window_seconds: 60,
            token_attempts: 600,
            token_window_seconds: 60,
            trusted_proxies: Vec::new(),
        }
    }
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let environment = Environment::from_env()?;
        let is_prod = environment.is_prod();

        let config = IdentityConfig {
            common,
            environment,
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            issuer_url: get_env("ISSUER_URL", Some("http://localhost:8080"), is_prod)?
                .trim_end_matches('/')
                .to_string(),
            jwt: JwtConfig {
                private_key_path: get_env(
                    "JWT_PRIVATE_KEY_PATH",
                    Some("fixtures/dev-signing-key.pem"),
                    is_prod,
                )?,
                public_key_path: get_env(
                    "JWT_PUBLIC_KEY_PATH",
                    Some("fixtures/dev-signing-key.pub.pem"),
                    is_prod,
                )?,
                key_id: get_env("JWT_KEY_ID", Some("dev-key-1"), is_prod)?,
            },
            tokens: TokenSettings {
                access_token_ttl_seconds: parse_env("ACCESS_TOKEN_TTL_SECONDS", Some("900"), is_prod)?,
                refresh_token_ttl_days: parse_env("REFRESH_TOKEN_TTL_DAYS", Some("30"), is_prod)?,
                authorization_code_ttl_seconds: parse_env(
                    "AUTHORIZATION_CODE_TTL_SECONDS",
                    Some("60"),
                    is_prod,
                )?,
            },
            session: SessionConfig {
                ttl_minutes: parse_env("SESSION_TTL_MINUTES", Some("480"), is_prod)?,
                cookie_secure: parse_env("COOKIE_SECURE", Some("true"), is_prod)?,
            },
            database_url: get_optional_env("DATABASE_URL"),
            seed_file: get_optional_env("SEED_FILE"),
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", Some("10"), is_prod)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", Some("60"), is_prod)?,
                token_attempts: parse_env("RATE_LIMIT_TOKEN_ATTEMPTS", Some("600"), is_prod)?,
                token_window_seconds: parse_env("RATE_LIMIT_TOKEN_WINDOW_SECONDS", Some("60"), is_prod)?,
                trusted_proxies: parse_ip_list(get_optional_env("TRUSTED_PROXIES").as_deref())?,
            },
            allowed_origins: get_optional_env("ALLOWED_ORIGINS")
                .map(|value| {
                    value
                        .split(',')
                        .map(|origin| origin.trim().to_string())
                        .filter(|origin| !origin.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Development settings with an in-memory store and non-secure cookies,
    /// used by local runs and the integration suites.
    pub fn dev_defaults(issuer_url: &str) -> Self {
        IdentityConfig {
            common: core_config::Config { port: 0 },
            environment: Environment::Dev,
            service_name: "identity-service".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            issuer_url: issuer_url.trim_end_matches('/').to_string(),
            jwt: JwtConfig {
                private_key_path: String::new(),
                public_key_path: String::new(),
                key_id: "dev-key-1".to_string(),
            },
            tokens: TokenSettings::default(),
            session: SessionConfig {
                ttl_minutes: 480,
                cookie_secure: false,
            },
            database_url: None,
            seed_file: None,
            rate_limit: RateLimitConfig::default(),
            allowed_origins: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let issuer = Url::parse(&self.issuer_url).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("ISSUER_URL must be an absolute URL: {}", e))
        })?;
        if self.environment.is_prod() && issuer.scheme() != "https" {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ISSUER_URL must use https in production"
            )));
        }

        let ttls = [
            ("ACCESS_TOKEN_TTL_SECONDS", self.tokens.access_token_ttl_seconds),
            ("REFRESH_TOKEN_TTL_DAYS", self.tokens.refresh_token_ttl_days),
            (
                "AUTHORIZATION_CODE_TTL_SECONDS",
                self.tokens.authorization_code_ttl_seconds,
            ),
            ("SESSION_TTL_MINUTES", self.session.ttl_minutes),
        ];
        for (key, value) in ttls {
            if value <= 0 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} must be positive, got {}",
                    key,
                    value
                )));
            }
        }

        if self.environment.is_prod() {
            if !self.session.cookie_secure {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "COOKIE_SECURE cannot be disabled in production"
                )));
            }
            if self.database_url.is_none() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "DATABASE_URL is required in production"
                )));
            }
            if self.allowed_origins.iter().any(|origin| origin == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "ALLOWED_ORIGINS cannot contain '*' in production"
                )));
            }
        }

        Ok(())
    }
}

fn parse_ip_list(value: Option<&str>) -> Result<Vec<IpAddr>, AppError> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry.parse::<IpAddr>().map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("TRUSTED_PROXIES entry '{}': {}", entry, e))
            })
        })
        .collect()
}
