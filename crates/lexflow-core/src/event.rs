//! Outbound webhook event names.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Every event kind the platform can deliver to a tenant endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WebhookEventKind {
    DemographicsCreated,
    DemographicsUpdated,
    DemographicsDeleted,
    DemographicsProcessed,
    DemographicsBatchCompleted,
    DemographicsFailed,
    DocumentUploaded,
    DocumentValidationFailed,
}

impl WebhookEventKind {
    /// The dotted wire name (`demographics.created`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookEventKind::DemographicsCreated => "demographics.created",
            WebhookEventKind::DemographicsUpdated => "demographics.updated",
            WebhookEventKind::DemographicsDeleted => "demographics.deleted",
            WebhookEventKind::DemographicsProcessed => "demographics.processed",
            WebhookEventKind::DemographicsBatchCompleted => "demographics.batch_completed",
            WebhookEventKind::DemographicsFailed => "demographics.failed",
            WebhookEventKind::DocumentUploaded => "document.uploaded",
            WebhookEventKind::DocumentValidationFailed => "document.validation_failed",
        }
    }
}

impl Display for WebhookEventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "demographics.created" => Ok(Self::DemographicsCreated),
            "demographics.updated" => Ok(Self::DemographicsUpdated),
            "demographics.deleted" => Ok(Self::DemographicsDeleted),
            "demographics.processed" => Ok(Self::DemographicsProcessed),
            "demographics.batch_completed" => Ok(Self::DemographicsBatchCompleted),
            "demographics.failed" => Ok(Self::DemographicsFailed),
            "document.uploaded" => Ok(Self::DocumentUploaded),
            "document.validation_failed" => Ok(Self::DocumentValidationFailed),
            other => Err(format!("unknown webhook event: {other}")),
        }
    }
}

impl TryFrom<String> for WebhookEventKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WebhookEventKind> for String {
    fn from(value: WebhookEventKind) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [WebhookEventKind; 8] = [
        WebhookEventKind::DemographicsCreated,
        WebhookEventKind::DemographicsUpdated,
        WebhookEventKind::DemographicsDeleted,
        WebhookEventKind::DemographicsProcessed,
        WebhookEventKind::DemographicsBatchCompleted,
        WebhookEventKind::DemographicsFailed,
        WebhookEventKind::DocumentUploaded,
        WebhookEventKind::DocumentValidationFailed,
    ];

    #[test]
    fn round_trips_every_event_name() {
        for kind in ALL {
            assert_eq!(kind.as_str().parse::<WebhookEventKind>().unwrap(), kind);
        }
    }

    #[test]
    fn serde_uses_dotted_names() {
        let json = serde_json::to_string(&WebhookEventKind::DemographicsBatchCompleted).unwrap();
        assert_eq!(json, "\"demographics.batch_completed\"");
    }
}
