pub mod gateway;
pub mod license;

pub use gateway::{authorize_url, gateway_middleware, is_navigation, sanitize_return_path};
pub use license::{LicenseGate, ModuleAccess, license_gate_middleware, require_module_access};
