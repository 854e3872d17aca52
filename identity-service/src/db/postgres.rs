//! PostgreSQL store.
//!
//! Queries are runtime-checked (`query_as` with `FromRow` rows) and mapped to
//! domain models at the edge, so the models stay free of sqlx types.

use super::{DirectoryStore, GrantStore, RotationOutcome, Store, StoreError, TokenStore};
use crate::models::{
    AuthorizationCode, Client, GrantStatus, ModuleDefinition, ModuleGrant, RefreshToken, Tenant,
    TenantStatus, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::identity::ModuleId;
use sqlx::FromRow;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!("Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(FromRow)]
struct TenantRow {
    tenant_id: Uuid,
    name: String,
    status: String,
    created_utc: DateTime<Utc>,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = StoreError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        Ok(Tenant {
            tenant_id: row.tenant_id,
            name: row.name,
            status: row.status.parse::<TenantStatus>().map_err(StoreError::Corrupt)?,
            created_utc: row.created_utc,
        })
    }
}

#[derive(FromRow)]
struct UserRow {
    user_id: Uuid,
    tenant_id: Uuid,
    email: String,
    password_hash: String,
    display_name: String,
    roles: Vec<String>,
    enabled: bool,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            user_id: row.user_id,
            tenant_id: row.tenant_id,
            email: row.email.to_lowercase(),
            password_hash: row.password_hash,
            display_name: row.display_name,
            roles: row.roles,
            enabled: row.enabled,
        }
    }
}

#[derive(FromRow)]
struct ClientRow {
    client_id: String,
    module_id: String,
    client_secret_hash: String,
    redirect_uris: Vec<String>,
    enabled: bool,
}

impl TryFrom<ClientRow> for Client {
    type Error = StoreError;

    fn try_from(row: ClientRow) -> Result<Self, Self::Error> {
        let module_id = row.module_id.parse::<ModuleId>().map_err(|e| {
            StoreError::Corrupt(format!("client '{}': {}", row.client_id, e))
        })?;

        Ok(Client {
            client_id: row.client_id,
            module_id,
            client_secret_hash: row.client_secret_hash,
            redirect_uris: row.redirect_uris,
            enabled: row.enabled,
        })
    }
}

#[derive(FromRow)]
struct ModuleRow {
    module_id: String,
    display_name: String,
    description: Option<String>,
}

#[derive(FromRow)]
struct GrantRow {
    tenant_id: Uuid,
    module_id: String,
    plan: String,
    status: String,
    expires_utc: Option<DateTime<Utc>>,
}

impl TryFrom<GrantRow> for ModuleGrant {
    type Error = StoreError;

    fn try_from(row: GrantRow) -> Result<Self, Self::Error> {
        Ok(ModuleGrant {
            tenant_id: row.tenant_id,
            module_id: row
                .module_id
                .parse::<ModuleId>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            plan: row.plan,
            status: row.status.parse::<GrantStatus>().map_err(StoreError::Corrupt)?,
            expires_utc: row.expires_utc,
        })
    }
}

#[derive(FromRow)]
struct CodeRow {
    code_hash: String,
    client_id: String,
    redirect_uri: String,
    user_id: Uuid,
    tenant_id: Uuid,
    expires_utc: DateTime<Utc>,
    created_utc: DateTime<Utc>,
}

impl From<CodeRow> for AuthorizationCode {
    fn from(row: CodeRow) -> Self {
        AuthorizationCode {
            code_hash: row.code_hash,
            client_id: row.client_id,
            redirect_uri: row.redirect_uri,
            user_id: row.user_id,
            tenant_id: row.tenant_id,
            expires_utc: row.expires_utc,
            created_utc: row.created_utc,
        }
    }
}

#[derive(FromRow)]
struct RefreshRow {
    token_id: Uuid,
    token_hash: String,
    family_id: Uuid,
    client_id: String,
    user_id: Uuid,
    tenant_id: Uuid,
    expires_utc: DateTime<Utc>,
    created_utc: DateTime<Utc>,
    rotated_utc: Option<DateTime<Utc>>,
    revoked_utc: Option<DateTime<Utc>>,
}

impl From<RefreshRow> for RefreshToken {
    fn from(row: RefreshRow) -> Self {
        RefreshToken {
            token_id: row.token_id,
            token_hash: row.token_hash,
            family_id: row.family_id,
            client_id: row.client_id,
            user_id: row.user_id,
            tenant_id: row.tenant_id,
            expires_utc: row.expires_utc,
            created_utc: row.created_utc,
            rotated_utc: row.rotated_utc,
            revoked_utc: row.revoked_utc,
        }
    }
}

const REFRESH_COLUMNS: &str = "token_id, token_hash, family_id, client_id, user_id, tenant_id, \
     expires_utc, created_utc, rotated_utc, revoked_utc";

async fn insert_refresh(conn: &mut PgConnection, token: &RefreshToken) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens
            (token_id, token_hash, family_id, client_id, user_id, tenant_id,
             expires_utc, created_utc, rotated_utc, revoked_utc)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(token.token_id)
    .bind(&token.token_hash)
    .bind(token.family_id)
    .bind(&token.client_id)
    .bind(token.user_id)
    .bind(token.tenant_id)
    .bind(token.expires_utc)
    .bind(token.created_utc)
    .bind(token.rotated_utc)
    .bind(token.revoked_utc)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl DirectoryStore for PgStore {
    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, StoreError> {
        sqlx::query_as::<_, TenantRow>(
            "SELECT tenant_id, name, status, created_utc FROM tenants WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Tenant::try_from)
        .transpose()
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT user_id, tenant_id, email, password_hash, display_name, roles, enabled \
             FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT user_id, tenant_id, email, password_hash, display_name, roles, enabled \
             FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_client(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        sqlx::query_as::<_, ClientRow>(
            "SELECT client_id, module_id, client_secret_hash, redirect_uris, enabled \
             FROM clients WHERE client_id = $1",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Client::try_from)
        .transpose()
    }

    async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        sqlx::query_as::<_, ClientRow>(
            "SELECT client_id, module_id, client_secret_hash, redirect_uris, enabled \
             FROM clients ORDER BY client_id",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Client::try_from)
        .collect()
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert_authorization_code(&self, code: AuthorizationCode) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO authorization_codes
                (code_hash, client_id, redirect_uri, user_id, tenant_id, expires_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&code.code_hash)
        .bind(&code.client_id)
        .bind(&code.redirect_uri)
        .bind(code.user_id)
        .bind(code.tenant_id)
        .bind(code.expires_utc)
        .bind(code.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_authorization_code(
        &self,
        code_hash: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        let row = sqlx::query_as::<_, CodeRow>(
            r#"
            DELETE FROM authorization_codes WHERE code_hash = $1
            RETURNING code_hash, client_id, redirect_uri, user_id, tenant_id, expires_utc, created_utc
            "#,
        )
        .bind(code_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AuthorizationCode::from))
    }

    async fn insert_refresh_token(&self, token: RefreshToken) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_refresh(&mut conn, &token).await?;
        Ok(())
    }

    async fn find_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>, StoreError> {
        let row = sqlx::query_as::<_, RefreshRow>(&format!(
            "SELECT {REFRESH_COLUMNS} FROM refresh_tokens WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RefreshToken::from))
    }

    async fn rotate_refresh_token(
        &self,
        presented_hash: &str,
        successor: RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<RotationOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // A concurrent rotation of the same row blocks here until the winner
        // commits, then re-evaluates the predicate and matches nothing.
        let rotated = sqlx::query_as::<_, RefreshRow>(&format!(
            r#"
            UPDATE refresh_tokens SET rotated_utc = $2
            WHERE token_hash = $1
              AND rotated_utc IS NULL
              AND revoked_utc IS NULL
              AND expires_utc > $2
            RETURNING {REFRESH_COLUMNS}
            "#
        ))
        .bind(presented_hash)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(previous) = rotated {
            insert_refresh(&mut *tx, &successor).await?;
            tx.commit().await?;
            return Ok(RotationOutcome::Rotated {
                previous: previous.into(),
            });
        }

        tx.rollback().await?;

        Ok(match self.find_refresh_token(presented_hash).await? {
            None => RotationOutcome::Missing,
            Some(previous) if previous.is_dead() => RotationOutcome::Dead { previous },
            Some(previous) => RotationOutcome::Expired { previous },
        })
    }

    async fn revoke_refresh_family(
        &self,
        family_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_utc = $2 WHERE family_id = $1 AND revoked_utc IS NULL",
        )
        .bind(family_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl GrantStore for PgStore {
    async fn list_modules(&self) -> Result<Vec<ModuleDefinition>, StoreError> {
        let rows = sqlx::query_as::<_, ModuleRow>(
            "SELECT module_id, display_name, description FROM modules ORDER BY module_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ModuleDefinition {
                module_id: row.module_id,
                display_name: row.display_name,
                description: row.description,
            })
            .collect())
    }

    async fn list_grants(&self, tenant_id: Uuid) -> Result<Vec<ModuleGrant>, StoreError> {
        sqlx::query_as::<_, GrantRow>(
            "SELECT tenant_id, module_id, plan, status, expires_utc \
             FROM module_grants WHERE tenant_id = $1 ORDER BY module_id",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ModuleGrant::try_from)
        .collect()
    }

    async fn find_grant(
        &self,
        tenant_id: Uuid,
        module_id: ModuleId,
    ) -> Result<Option<ModuleGrant>, StoreError> {
        sqlx::query_as::<_, GrantRow>(
            "SELECT tenant_id, module_id, plan, status, expires_utc \
             FROM module_grants WHERE tenant_id = $1 AND module_id = $2",
        )
        .bind(tenant_id)
        .bind(module_id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(ModuleGrant::try_from)
        .transpose()
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
