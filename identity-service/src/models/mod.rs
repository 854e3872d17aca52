pub mod authorization_code;
pub mod client;
pub mod module;
pub mod refresh_token;
pub mod tenant;
pub mod user;

pub use authorization_code::AuthorizationCode;
pub use client::Client;
pub use module::{GrantStatus, ModuleDefinition, ModuleGrant};
pub use refresh_token::RefreshToken;
pub use tenant::{Tenant, TenantStatus};
pub use user::{User, UserProfile, normalize_email};
