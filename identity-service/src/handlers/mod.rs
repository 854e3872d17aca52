pub mod authorize;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod session;
pub mod token;
pub mod userinfo;
pub mod well_known;

pub use error::OAuthError;
