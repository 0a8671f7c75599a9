//! API credential scopes.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A single permission a credential may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scope {
    DemographicsRead,
    DemographicsWrite,
    DemographicsDelete,
    DemographicsAdmin,
    WebhooksManage,
    FilesUpload,
}

impl Scope {
    /// All scopes, in the order they are documented.
    pub const ALL: [Scope; 6] = [
        Scope::DemographicsRead,
        Scope::DemographicsWrite,
        Scope::DemographicsDelete,
        Scope::DemographicsAdmin,
        Scope::WebhooksManage,
        Scope::FilesUpload,
    ];

    /// The wire representation (`demographics:read`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::DemographicsRead => "demographics:read",
            Scope::DemographicsWrite => "demographics:write",
            Scope::DemographicsDelete => "demographics:delete",
            Scope::DemographicsAdmin => "demographics:admin",
            Scope::WebhooksManage => "webhooks:manage",
            Scope::FilesUpload => "files:upload",
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown scope string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scope: {0}")]
pub struct ScopeParseError(pub String);

impl FromStr for Scope {
    type Err = ScopeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "demographics:read" => Ok(Scope::DemographicsRead),
            "demographics:write" => Ok(Scope::DemographicsWrite),
            "demographics:delete" => Ok(Scope::DemographicsDelete),
            "demographics:admin" => Ok(Scope::DemographicsAdmin),
            "webhooks:manage" => Ok(Scope::WebhooksManage),
            "files:upload" => Ok(Scope::FilesUpload),
            other => Err(ScopeParseError(other.to_string())),
        }
    }
}

impl TryFrom<String> for Scope {
    type Error = ScopeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Scope> for String {
    fn from(value: Scope) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_scope() {
        for scope in Scope::ALL {
            assert_eq!(scope.as_str().parse::<Scope>().unwrap(), scope);
        }
    }

    #[test]
    fn rejects_unknown_scope() {
        let err = "demographics:execute".parse::<Scope>().unwrap_err();
        assert_eq!(err.0, "demographics:execute");
    }

    #[test]
    fn serializes_as_wire_string() {
        let json = serde_json::to_string(&Scope::FilesUpload).unwrap();
        assert_eq!(json, "\"files:upload\"");
    }
}
