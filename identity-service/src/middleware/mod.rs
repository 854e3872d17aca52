pub mod auth;
pub mod client_auth;

pub use auth::BearerClaims;
pub use client_auth::{AuthenticatedClient, ClientCredentials, authenticate_client, throttle_client};
