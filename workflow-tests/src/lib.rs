//! Cross-service workflow test infrastructure.
//!
//! Each [`WorkflowTestContext`] starts its own issuer and one gateway per
//! client module on ephemeral localhost ports, all in-process, and a
//! [`Browser`] drives them over real HTTP the way a user agent would.

use anyhow::{Context, Result, anyhow};
use identity_service::{
    AppState, build_router,
    config::IdentityConfig,
    db::MemoryStore,
    services::{SeedFile, TokenSigner},
};
use module_gateway::{GatewayState, config::GatewayConfig, services::HttpIssuerClient};
use reqwest::header::{self, HeaderMap};
use secrecy::Secret;
use service_core::identity::{ModuleId, TokenVerifier};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

const PRIVATE_KEY: &str = include_str!("../../fixtures/dev-signing-key.pem");
const PUBLIC_KEY: &str = include_str!("../../fixtures/dev-signing-key.pub.pem");
const SEED: &str = include_str!("../../fixtures/dev-seed.json");

pub const ANA_EMAIL: &str = "ana@acme.test";
pub const BEN_EMAIL: &str = "ben@globex.test";
pub const PASSWORD: &str = "correct horse battery staple";

/// Modules that have an OAuth client in the dev seed.
pub const CLIENT_MODULES: [ModuleId; 3] = [ModuleId::Crm, ModuleId::Hr, ModuleId::Finance];

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("warn,workflow_tests=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn client_secret(module: ModuleId) -> String {
    format!("dev-{}-secret", module)
}

/// An issuer plus module gateways, each on its own port.
pub struct WorkflowTestContext {
    pub issuer_url: String,
    pub issuer: AppState,
    pub store: MemoryStore,
    modules: HashMap<ModuleId, String>,
}

impl WorkflowTestContext {
    pub async fn new() -> Result<Self> {
        init_tracing();

        let issuer_listener = TcpListener::bind("127.0.0.1:0").await?;
        let issuer_url = format!("http://{}", issuer_listener.local_addr()?);

        let mut module_listeners = Vec::new();
        let mut modules = HashMap::new();
        for module in CLIENT_MODULES {
            let listener = TcpListener::bind("127.0.0.1:0").await?;
            modules.insert(module, format!("http://{}", listener.local_addr()?));
            module_listeners.push((module, listener));
        }

        // Registered redirect URIs must point at the ports we just got.
        let mut seed: SeedFile = serde_json::from_str(SEED).context("invalid dev seed")?;
        for client in &mut seed.clients {
            if let Some(url) = modules.get(&client.module_id) {
                client.redirect_uris = vec![format!("{}/oauth/callback", url)];
            }
        }
        let store = MemoryStore::new();
        seed.apply(&store)?;

        let signer = TokenSigner::from_pem(
            PRIVATE_KEY.as_bytes(),
            PUBLIC_KEY.as_bytes(),
            "workflow-key",
            issuer_url.as_str(),
        )?;
        let issuer = AppState::new(
            IdentityConfig::dev_defaults(&issuer_url),
            Arc::new(store.clone()),
            signer,
        )?;
        let issuer_app = build_router(issuer.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(
                issuer_listener,
                issuer_app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            {
                tracing::error!(error = %e, "Issuer stopped");
            }
        });

        for (module, listener) in module_listeners {
            let config = GatewayConfig::dev_defaults(
                module,
                &modules[&module],
                &issuer_url,
                &client_secret(module),
            );
            let verifier = TokenVerifier::from_rsa_pem(PUBLIC_KEY.as_bytes(), issuer_url.as_str())?;
            let client = HttpIssuerClient::new(
                &issuer_url,
                module.as_str(),
                Secret::new(client_secret(module)),
                config.issuer_timeout,
            )?;
            let app = module_gateway::build_router(GatewayState::new(config, verifier, Arc::new(client)));
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(module_id = %module, error = %e, "Module gateway stopped");
                }
            });
        }

        Ok(Self {
            issuer_url,
            issuer,
            store,
            modules,
        })
    }

    pub fn module_url(&self, module: ModuleId) -> &str {
        &self.modules[&module]
    }

    pub fn browser(&self) -> Result<Browser> {
        Browser::new()
    }

    /// `POST /token` as the module's back channel would send it.
    pub async fn token_request(&self, module: ModuleId, form: &[(&str, &str)]) -> Result<reqwest::Response> {
        reqwest::Client::new()
            .post(format!("{}/token", self.issuer_url))
            .basic_auth(module.as_str(), Some(client_secret(module)))
            .form(form)
            .send()
            .await
            .map_err(Into::into)
    }
}

/// A fetched response with its body already read.
#[derive(Debug)]
pub struct Page {
    pub url: Url,
    pub status: reqwest::StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Page {
    pub fn json(&self) -> Result<serde_json::Value> {
        serde_json::from_str(&self.body).map_err(Into::into)
    }

    pub fn location(&self) -> Option<Url> {
        let location = self.headers.get(header::LOCATION)?.to_str().ok()?;
        self.url.join(location).ok()
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        self.location()?
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }
}

/// Minimal user agent: per-origin cookies, no automatic redirects.
pub struct Browser {
    client: reqwest::Client,
    cookies: Mutex<HashMap<String, HashMap<String, String>>>,
}

const MAX_REDIRECTS: usize = 10;

impl Browser {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            cookies: Mutex::new(HashMap::new()),
        })
    }

    fn origin(url: &Url) -> String {
        url.origin().ascii_serialization()
    }

    pub fn cookie(&self, url: &str, name: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        let cookies = self.cookies.lock().ok()?;
        cookies.get(&Self::origin(&url))?.get(name).cloned()
    }

    pub fn set_cookie(&self, url: &str, name: &str, value: &str) -> Result<()> {
        let url = Url::parse(url)?;
        let mut cookies = self.cookies.lock().map_err(|_| anyhow!("cookie jar poisoned"))?;
        cookies
            .entry(Self::origin(&url))
            .or_default()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn forget_cookie(&self, url: &str, name: &str) -> Result<()> {
        let url = Url::parse(url)?;
        let mut cookies = self.cookies.lock().map_err(|_| anyhow!("cookie jar poisoned"))?;
        if let Some(jar) = cookies.get_mut(&Self::origin(&url)) {
            jar.remove(name);
        }
        Ok(())
    }

    fn cookie_header(&self, url: &Url) -> Option<String> {
        let cookies = self.cookies.lock().ok()?;
        let jar = cookies.get(&Self::origin(url))?;
        if jar.is_empty() {
            return None;
        }
        Some(
            jar.iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn absorb_cookies(&self, url: &Url, headers: &HeaderMap) {
        let Ok(mut cookies) = self.cookies.lock() else {
            return;
        };
        let jar = cookies.entry(Self::origin(url)).or_default();
        for value in headers.get_all(header::SET_COOKIE) {
            let Ok(value) = value.to_str() else { continue };
            let mut attributes = value.split(';');
            let Some((name, cookie_value)) = attributes.next().and_then(|p| p.split_once('=')) else {
                continue;
            };
            let expired = attributes.any(|a| a.trim().eq_ignore_ascii_case("max-age=0"));
            if expired || cookie_value.is_empty() {
                jar.remove(name.trim());
            } else {
                jar.insert(name.trim().to_string(), cookie_value.to_string());
            }
        }
    }

    async fn send(&self, url: Url, request: reqwest::RequestBuilder) -> Result<Page> {
        let request = match self.cookie_header(&url) {
            Some(cookie) => request.header(header::COOKIE, cookie),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        self.absorb_cookies(&url, &headers);
        let body = response.text().await?;
        Ok(Page {
            url,
            status,
            headers,
            body,
        })
    }

    /// One top-level navigation request; redirects are not followed.
    pub async fn visit(&self, url: &str) -> Result<Page> {
        let url = Url::parse(url)?;
        let request = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, "text/html,application/xhtml+xml")
            .header("sec-fetch-mode", "navigate");
        self.send(url, request).await
    }

    /// A `fetch()` from page script.
    pub async fn fetch(&self, url: &str) -> Result<Page> {
        let url = Url::parse(url)?;
        let request = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, "application/json")
            .header("sec-fetch-mode", "cors");
        self.send(url, request).await
    }

    pub async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Page> {
        let url = Url::parse(url)?;
        let request = self.client.post(url.clone()).form(form);
        self.send(url, request).await
    }

    /// Follow redirects from `page` until a non-redirect response.
    pub async fn follow(&self, mut page: Page) -> Result<Page> {
        for _ in 0..MAX_REDIRECTS {
            if !page.status.is_redirection() {
                return Ok(page);
            }
            let next = page
                .location()
                .ok_or_else(|| anyhow!("redirect without Location from {}", page.url))?;
            page = self.visit(next.as_str()).await?;
        }
        Err(anyhow!("too many redirects, last at {}", page.url))
    }

    pub async fn navigate(&self, url: &str) -> Result<Page> {
        let page = self.visit(url).await?;
        self.follow(page).await
    }

    /// Open `url` and, if the issuer asks, sign in with the given credentials.
    pub async fn open_signed_in(&self, url: &str, email: &str, password: &str) -> Result<Page> {
        let page = self.navigate(url).await?;
        if page.url.path() != "/login" {
            return Ok(page);
        }

        let return_to = page
            .url
            .query_pairs()
            .find(|(k, _)| k == "return_to")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        let login_url = page.url.join("/login")?;
        let submitted = self
            .post_form(
                login_url.as_str(),
                &[("email", email), ("password", password), ("return_to", &return_to)],
            )
            .await?;
        if !submitted.status.is_redirection() {
            return Err(anyhow!("login failed with {}: {}", submitted.status, submitted.body));
        }
        self.follow(submitted).await
    }
}
