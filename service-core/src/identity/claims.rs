use super::module_id::ModuleId;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Current access-token schema version. Verifiers reject any other value so
/// that a claim change can never be half-understood by an older module.
pub const CLAIMS_VERSION: u32 = 1;

/// Claims carried by every access token the issuer mints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenClaims {
    pub ver: u32,
    pub iss: String,
    /// client_id of the module the token was issued to.
    pub aud: String,
    pub sub: Uuid,
    pub email: String,
    pub tenant_id: Uuid,
    /// Snapshot of the tenant's active grants at issue time.
    #[serde(deserialize_with = "known_modules")]
    pub licensed_modules: Vec<ModuleId>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

impl AccessTokenClaims {
    pub fn has_module(&self, module: ModuleId) -> bool {
        self.licensed_modules.contains(&module)
    }
}

// A newer issuer may know modules this build does not; drop them instead
// of rejecting the whole token.
fn known_modules<'de, D>(deserializer: D) -> Result<Vec<ModuleId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(raw.iter().filter_map(|s| s.parse().ok()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> serde_json::Value {
        json!({
            "ver": 1,
            "iss": "http://issuer.test",
            "aud": "crm",
            "sub": Uuid::nil(),
            "email": "ana@acme.test",
            "tenant_id": Uuid::nil(),
            "licensed_modules": ["crm", "quantum_ledger"],
            "iat": 1_700_000_000,
            "exp": 1_700_000_900,
            "jti": Uuid::nil(),
        })
    }

    #[test]
    fn test_unknown_modules_are_dropped() {
        let claims: AccessTokenClaims = serde_json::from_value(sample()).unwrap();
        assert_eq!(claims.licensed_modules, vec![ModuleId::Crm]);
        assert!(claims.has_module(ModuleId::Crm));
        assert!(!claims.has_module(ModuleId::Hr));
    }

    #[test]
    fn test_roles_default_to_empty() {
        let claims: AccessTokenClaims = serde_json::from_value(sample()).unwrap();
        assert!(claims.roles.is_empty());
    }

    #[test]
    fn test_tenant_is_required() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("tenant_id");
        assert!(serde_json::from_value::<AccessTokenClaims>(value).is_err());
    }
}
