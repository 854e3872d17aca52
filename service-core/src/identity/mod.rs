//! Identity contract shared by the issuer and every module gateway: the
//! module catalog, the access-token claim schema, local token verification
//! and the license registry abstraction with its cache.
pub mod cache;
pub mod claims;
pub mod clock;
pub mod module_id;
pub mod registry;
pub mod verifier;

pub use cache::{CachedRegistry, LicenseCache};
pub use claims::{AccessTokenClaims, CLAIMS_VERSION};
pub use clock::{Clock, ManualClock, SystemClock};
pub use module_id::{ModuleId, UnknownModule};
pub use registry::{ModuleRegistry, RegistryError};
pub use verifier::{TokenVerifier, VerifyError};
