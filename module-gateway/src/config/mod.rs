use secrecy::Secret;
use service_core::config::{self as core_config, Environment, get_env, get_optional_env, parse_env};
use service_core::error::AppError;
use service_core::identity::ModuleId;
use std::time::Duration;
use url::Url;

pub const CALLBACK_PATH: &str = "/oauth/callback";

const MIN_LICENSE_CACHE_TTL: u64 = 30;
const MAX_LICENSE_CACHE_TTL: u64 = 60;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// The module this gateway fronts. Also its OAuth client_id.
    pub module_id: ModuleId,
    pub client_secret: Secret<String>,
    /// Browser-facing base URL of this module.
    pub module_public_url: String,
    /// Browser-facing issuer URL; also the expected `iss` claim.
    pub issuer_url: String,
    /// Issuer URL for back-channel calls (token, revoke, registry).
    pub issuer_internal_url: String,
    pub jwt_public_key_path: String,
    pub issuer_timeout: Duration,
    pub license_cache_ttl_seconds: u64,
    pub access_cookie_max_age_seconds: i64,
    pub refresh_cookie_max_age_days: i64,
    pub cookie_secure: bool,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let environment = Environment::from_env()?;
        let is_prod = environment.is_prod();

        let module_id: ModuleId = get_env("MODULE_ID", None, is_prod)?
            .parse()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("MODULE_ID: {}", e)))?;
        let issuer_url = trim_url(&get_env("ISSUER_URL", Some("http://localhost:8080"), is_prod)?);
        let issuer_internal_url = get_optional_env("ISSUER_INTERNAL_URL")
            .map(|url| trim_url(&url))
            .unwrap_or_else(|| issuer_url.clone());
        let default_service_name = format!("{}-module", module_id);

        let config = GatewayConfig {
            common,
            environment,
            service_name: get_env("SERVICE_NAME", Some(default_service_name.as_str()), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            module_id,
            client_secret: Secret::new(get_env("CLIENT_SECRET", None, is_prod)?),
            module_public_url: trim_url(&get_env("MODULE_PUBLIC_URL", None, is_prod)?),
            issuer_url,
            issuer_internal_url,
            jwt_public_key_path: get_env(
                "JWT_PUBLIC_KEY_PATH",
                Some("fixtures/dev-signing-key.pub.pem"),
                is_prod,
            )?,
            issuer_timeout: Duration::from_millis(parse_env("ISSUER_TIMEOUT_MS", Some("3000"), is_prod)?),
            license_cache_ttl_seconds: parse_env("LICENSE_CACHE_TTL_SECONDS", Some("45"), is_prod)?,
            access_cookie_max_age_seconds: parse_env(
                "ACCESS_COOKIE_MAX_AGE_SECONDS",
                Some("900"),
                is_prod,
            )?,
            refresh_cookie_max_age_days: parse_env("REFRESH_COOKIE_MAX_AGE_DAYS", Some("30"), is_prod)?,
            cookie_secure: parse_env("COOKIE_SECURE", Some("true"), is_prod)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Development settings for a module at `module_public_url`, used by the
    /// integration suites.
    pub fn dev_defaults(
        module_id: ModuleId,
        module_public_url: &str,
        issuer_url: &str,
        client_secret: &str,
    ) -> Self {
        GatewayConfig {
            common: core_config::Config { port: 0 },
            environment: Environment::Dev,
            service_name: format!("{}-module", module_id),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            module_id,
            client_secret: Secret::new(client_secret.to_string()),
            module_public_url: trim_url(module_public_url),
            issuer_url: trim_url(issuer_url),
            issuer_internal_url: trim_url(issuer_url),
            jwt_public_key_path: String::new(),
            issuer_timeout: Duration::from_secs(3),
            license_cache_ttl_seconds: 45,
            access_cookie_max_age_seconds: 900,
            refresh_cookie_max_age_days: 30,
            cookie_secure: false,
        }
    }

    pub fn client_id(&self) -> &'static str {
        self.module_id.as_str()
    }

    pub fn redirect_uri(&self) -> String {
        format!("{}{}", self.module_public_url, CALLBACK_PATH)
    }

    /// Cache TTL clamped to the 30 to 60 second window.
    pub fn license_cache_ttl(&self) -> Duration {
        Duration::from_secs(
            self.license_cache_ttl_seconds
                .clamp(MIN_LICENSE_CACHE_TTL, MAX_LICENSE_CACHE_TTL),
        )
    }

    pub fn validate(&self) -> Result<(), AppError> {
        for (key, value) in [
            ("MODULE_PUBLIC_URL", &self.module_public_url),
            ("ISSUER_URL", &self.issuer_url),
            ("ISSUER_INTERNAL_URL", &self.issuer_internal_url),
        ] {
            let url = Url::parse(value).map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("{} must be an absolute URL: {}", key, e))
            })?;
            if self.environment.is_prod() && key != "ISSUER_INTERNAL_URL" && url.scheme() != "https" {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} must use https in production",
                    key
                )));
            }
        }

        if self.issuer_timeout.is_zero() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ISSUER_TIMEOUT_MS must be positive"
            )));
        }
        if self.access_cookie_max_age_seconds <= 0 || self.refresh_cookie_max_age_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "cookie max ages must be positive"
            )));
        }
        if !(MIN_LICENSE_CACHE_TTL..=MAX_LICENSE_CACHE_TTL).contains(&self.license_cache_ttl_seconds) {
            tracing::warn!(
                configured = self.license_cache_ttl_seconds,
                effective = self.license_cache_ttl().as_secs(),
                "LICENSE_CACHE_TTL_SECONDS outside 30..=60, clamping"
            );
        }
        if self.environment.is_prod() && !self.cookie_secure {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "COOKIE_SECURE cannot be disabled in production"
            )));
        }

        Ok(())
    }
}

fn trim_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
