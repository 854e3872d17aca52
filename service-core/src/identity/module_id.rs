use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every module the platform can license. Adding a module is a code change,
/// and the issuer refuses to start when its catalog names an id that is not
/// listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleId {
    Crm,
    Hr,
    Finance,
    Marketing,
    Forms,
    AiChat,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown module id '{0}'")]
pub struct UnknownModule(pub String);

impl ModuleId {
    pub const ALL: [ModuleId; 6] = [
        ModuleId::Crm,
        ModuleId::Hr,
        ModuleId::Finance,
        ModuleId::Marketing,
        ModuleId::Forms,
        ModuleId::AiChat,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleId::Crm => "crm",
            ModuleId::Hr => "hr",
            ModuleId::Finance => "finance",
            ModuleId::Marketing => "marketing",
            ModuleId::Forms => "forms",
            ModuleId::AiChat => "ai_chat",
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleId {
    type Err = UnknownModule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleId::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownModule(s.to_string()))
    }
}
