pub mod issuer_client;
pub mod metrics;
pub mod remote_registry;

pub use issuer_client::{HttpIssuerClient, IssuerApi, TokenSet};
pub use remote_registry::RemoteRegistry;
