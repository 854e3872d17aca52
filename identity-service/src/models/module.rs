use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::identity::ModuleId;
use std::str::FromStr;
use uuid::Uuid;

/// Catalog entry as stored. `module_id` stays a raw string so that startup
/// validation can report ids this build does not know.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDefinition {
    pub module_id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    #[default]
    Active,
    Expired,
}

impl GrantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GrantStatus::Active => "active",
            GrantStatus::Expired => "expired",
        }
    }
}

impl FromStr for GrantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(GrantStatus::Active),
            "expired" => Ok(GrantStatus::Expired),
            other => Err(format!("unknown grant status '{}'", other)),
        }
    }
}

/// A tenant's entitlement to one module under a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleGrant {
    pub tenant_id: Uuid,
    pub module_id: ModuleId,
    pub plan: String,
    pub status: GrantStatus,
    pub expires_utc: Option<DateTime<Utc>>,
}

impl ModuleGrant {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == GrantStatus::Active && self.expires_utc.is_none_or(|exp| exp > now)
    }
}
