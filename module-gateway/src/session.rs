//! Cookie-backed session store. A module keeps nothing server-side: the
//! access token and the refresh token live in two httpOnly cookies.

use crate::config::GatewayConfig;
use crate::services::TokenSet;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

#[derive(Debug, Clone, Copy)]
pub struct SessionCookies {
    secure: bool,
    refresh_max_age: time::Duration,
    access_max_age_cap: time::Duration,
}

impl SessionCookies {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            secure: config.cookie_secure,
            refresh_max_age: time::Duration::days(config.refresh_cookie_max_age_days),
            access_max_age_cap: time::Duration::seconds(config.access_cookie_max_age_seconds),
        }
    }

    pub fn access_token<'a>(&self, jar: &'a CookieJar) -> Option<&'a str> {
        jar.get(ACCESS_COOKIE)
            .map(|c| c.value())
            .filter(|v| !v.is_empty())
    }

    pub fn refresh_token<'a>(&self, jar: &'a CookieJar) -> Option<&'a str> {
        jar.get(REFRESH_COOKIE)
            .map(|c| c.value())
            .filter(|v| !v.is_empty())
    }

    /// Install a fresh token pair. The access cookie lives as long as the
    /// token itself.
    pub fn store(&self, jar: CookieJar, tokens: &TokenSet) -> CookieJar {
        let access_max_age = time::Duration::seconds(tokens.expires_in.max(0)).min(self.access_max_age_cap);

        jar.add(self.cookie(ACCESS_COOKIE, tokens.access_token.clone(), access_max_age))
            .add(self.cookie(REFRESH_COOKIE, tokens.refresh_token.clone(), self.refresh_max_age))
    }

    /// Expire both cookies, whether or not the request carried them.
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        jar.add(self.cookie(ACCESS_COOKIE, String::new(), time::Duration::ZERO))
            .add(self.cookie(REFRESH_COOKIE, String::new(), time::Duration::ZERO))
    }

    fn cookie(&self, name: &'static str, value: String, max_age: time::Duration) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(max_age)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;
    use axum::response::IntoResponse;
    use service_core::identity::ModuleId;

    fn cookies() -> SessionCookies {
        let mut config = GatewayConfig::dev_defaults(
            ModuleId::Crm,
            "http://crm.test",
            "http://issuer.test",
            "secret",
        );
        config.cookie_secure = true;
        SessionCookies::new(&config)
    }

    fn set_cookies(jar: CookieJar) -> Vec<String> {
        let response = (jar, "").into_response();
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_store_sets_hardened_cookies() {
        let tokens = TokenSet {
            access_token: "a.b.c".to_string(),
            refresh_token: "r0".to_string(),
            expires_in: 900,
            token_type: "Bearer".to_string(),
        };

        let headers = set_cookies(cookies().store(CookieJar::new(), &tokens));

        assert_eq!(headers.len(), 2);
        let access = headers.iter().find(|h| h.starts_with("access_token=a.b.c")).unwrap();
        assert!(access.contains("HttpOnly"));
        assert!(access.contains("Secure"));
        assert!(access.contains("SameSite=Lax"));
        assert!(access.contains("Max-Age=900"));

        let refresh = headers.iter().find(|h| h.starts_with("refresh_token=r0")).unwrap();
        assert!(refresh.contains(&format!("Max-Age={}", 30 * 24 * 3600)));
    }

    #[test]
    fn test_clear_expires_both_cookies() {
        let headers = set_cookies(cookies().clear(CookieJar::new()));

        assert_eq!(headers.len(), 2);
        assert!(headers.iter().all(|h| h.contains("Max-Age=0")));
    }
}
