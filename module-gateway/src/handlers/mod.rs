pub mod callback;
pub mod health;
pub mod host;
pub mod logout;
pub mod metrics;
