//! Browser sign-in at the issuer.
//!
//! The `idp_session` cookie is the issuer's own session; modules never see
//! it. It only lets `/authorize` skip the login form on later requests.

use crate::AppState;
use crate::db::StoreError;
use crate::models::{User, normalize_email};
use crate::services::metrics;
use crate::services::{SESSION_AUDIENCE, SessionClaims};
use crate::utils::password::{Password, PasswordHashString, verify_dummy, verify_password};
use askama::Template;
use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use service_core::error::AppError;
use service_core::utils::found;
use uuid::Uuid;
use validator::Validate;

pub const SESSION_COOKIE: &str = "idp_session";

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub return_to: String,
    pub error: Option<&'static str>,
}

impl LoginTemplate {
    fn new(return_to: Option<&str>, error: Option<&'static str>) -> Self {
        Self {
            return_to: safe_return_to(return_to).to_string(),
            error,
        }
    }
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub email: Option<String>,
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub return_to: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct LoginForm {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 1024))]
    pub password: String,
    pub return_to: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /
pub async fn home(State(state): State<AppState>, jar: CookieJar) -> Result<HomeTemplate, AppError> {
    let user = match current_session(&state, &jar) {
        Some(session) => session_user(&state, &session).await?,
        None => None,
    };

    Ok(HomeTemplate {
        email: user.map(|u| u.email),
    })
}

/// GET /login
pub async fn login_page(Query(query): Query<LoginQuery>) -> LoginTemplate {
    LoginTemplate::new(query.return_to.as_deref(), None)
}

/// POST /login
#[tracing::instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let return_to = form.return_to.clone();

    let user = match authenticate(&state, &form).await? {
        Ok(user) => user,
        Err(reason) => {
            metrics::record_login("failure");
            tracing::warn!(reason, "Login rejected");
            return Ok((
                StatusCode::UNAUTHORIZED,
                LoginTemplate::new(return_to.as_deref(), Some("Invalid email or password.")),
            )
                .into_response());
        }
    };

    let now = state.clock.now();
    let ttl_minutes = state.config.session.ttl_minutes;
    let claims = SessionClaims {
        iss: state.config.issuer_url.clone(),
        aud: SESSION_AUDIENCE.to_string(),
        sub: user.user_id,
        tenant_id: user.tenant_id,
        iat: now.timestamp(),
        exp: now.timestamp() + ttl_minutes * 60,
        sid: Uuid::new_v4(),
    };
    let token = state.signer.sign_session(&claims)?;

    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(state.config.session.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(ttl_minutes));

    metrics::record_login("success");
    tracing::info!(user_id = %user.user_id, tenant_id = %user.tenant_id, "User signed in");

    Ok((jar.add(cookie), found(safe_return_to(return_to.as_deref()))).into_response())
}

/// POST /logout
pub async fn logout(jar: CookieJar) -> Response {
    (jar.remove(Cookie::build(SESSION_COOKIE).path("/")), found("/login")).into_response()
}

// ============================================================================
// Session helpers
// ============================================================================

pub fn current_session(state: &AppState, jar: &CookieJar) -> Option<SessionClaims> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| state.signer.verify_session(cookie.value()))
}

/// The session's user, if it still exists, is enabled and belongs to an
/// active tenant.
pub async fn session_user(state: &AppState, session: &SessionClaims) -> Result<Option<User>, StoreError> {
    let Some(user) = state.store.find_user(session.sub).await? else {
        return Ok(None);
    };
    if !user.enabled || user.tenant_id != session.tenant_id {
        return Ok(None);
    }

    let tenant_active = state
        .store
        .find_tenant(user.tenant_id)
        .await?
        .is_some_and(|t| t.is_active());

    Ok(tenant_active.then_some(user))
}

/// Outer error is infrastructure; inner error is a rejection reason for logs.
async fn authenticate(
    state: &AppState,
    form: &LoginForm,
) -> Result<Result<User, &'static str>, AppError> {
    if form.validate().is_err() {
        return Ok(Err("malformed credentials"));
    }

    let password = Password::new(form.password.clone());
    let Some(user) = state
        .store
        .find_user_by_email(&normalize_email(&form.email))
        .await?
    else {
        verify_dummy(&password);
        return Ok(Err("unknown email"));
    };

    let hash = PasswordHashString::new(user.password_hash.clone());
    if !verify_password(&password, &hash)? {
        return Ok(Err("wrong password"));
    }

    if !user.enabled {
        return Ok(Err("user disabled"));
    }

    let tenant_active = state
        .store
        .find_tenant(user.tenant_id)
        .await?
        .is_some_and(|t| t.is_active());
    if !tenant_active {
        return Ok(Err("tenant suspended"));
    }

    Ok(Ok(user))
}

/// Only a relative `/authorize?...` request may be resumed after login.
pub fn safe_return_to(return_to: Option<&str>) -> &str {
    match return_to {
        Some(rt)
            if rt.starts_with("/authorize?")
                && !rt.contains('\\')
                && !rt.chars().any(char::is_control) =>
        {
            rt
        }
        _ => "/",
    }
}
