pub mod error;
pub mod jwt;
pub mod metrics;
pub mod registry;
pub mod seed;
pub mod token;

pub use error::TokenError;
pub use jwt::{JwkSet, SESSION_AUDIENCE, SessionClaims, TokenSigner};
pub use registry::{StoreRegistry, validate_catalog};
pub use seed::SeedFile;
pub use token::{TokenResponse, TokenService};
