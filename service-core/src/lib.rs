//! service-core: Shared infrastructure and identity contract for platform modules.
//!
//! Both the identity service and every module gateway depend on this crate, so
//! the token claim schema, the module catalog and the license cache live here.
pub mod config;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod observability;
pub mod utils;

pub use async_trait;
pub use axum;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tower;
pub use tower_http;
pub use tracing;
