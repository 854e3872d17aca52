pub mod redirect;
pub mod secret;

pub use redirect::found;
pub use secret::{generate_token, hash_secret, verify_secret};
