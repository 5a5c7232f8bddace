use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeAppeal {
    pub id: String,
    pub booking_id: String,
    pub customer_id: String,
    pub reason: AppealReason,
    pub description: String,
    pub status: AppealStatus,
    pub reviewer_id: Option<String>,
    pub reviewer_notes: Option<String>,
    pub refund_ref: Option<String>,
    pub resolved_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AppealReason {
    #[serde(rename = "was_present")]
    PresenceClaimed,
    #[serde(rename = "cleaner_late")]
    ProviderLate,
    #[serde(rename = "cleaner_no_show")]
    ProviderNoShow,
    #[serde(rename = "emergency")]
    Emergency,
    #[serde(rename = "miscommunication")]
    Miscommunication,
    #[serde(rename = "technical_issue")]
    TechnicalIssue,
    #[serde(rename = "other")]
    Other,
}

impl AppealReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppealReason::PresenceClaimed => "was_present",
            AppealReason::ProviderLate => "cleaner_late",
            AppealReason::ProviderNoShow => "cleaner_no_show",
            AppealReason::Emergency => "emergency",
            AppealReason::Miscommunication => "miscommunication",
            AppealReason::TechnicalIssue => "technical_issue",
            AppealReason::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "was_present" => Some(AppealReason::PresenceClaimed),
            "cleaner_late" => Some(AppealReason::ProviderLate),
            "cleaner_no_show" => Some(AppealReason::ProviderNoShow),
            "emergency" => Some(AppealReason::Emergency),
            "miscommunication" => Some(AppealReason::Miscommunication),
            "technical_issue" => Some(AppealReason::TechnicalIssue),
            "other" => Some(AppealReason::Other),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AppealReason::PresenceClaimed => "Customer was present at the scheduled time",
            AppealReason::ProviderLate => "Cleaner arrived late",
            AppealReason::ProviderNoShow => "Cleaner did not show up",
            AppealReason::Emergency => "Emergency situation",
            AppealReason::Miscommunication => "Miscommunication about timing",
            AppealReason::TechnicalIssue => "Technical issue with access",
            AppealReason::Other => "Other reason",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppealStatus {
    Pending,
    Approved,
    Rejected,
}

impl AppealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppealStatus::Pending => "pending",
            AppealStatus::Approved => "approved",
            AppealStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AppealStatus::Pending),
            "approved" => Some(AppealStatus::Approved),
            "rejected" => Some(AppealStatus::Rejected),
            _ => None,
        }
    }
}

/// A reviewer's verdict; the only two states an appeal may be resolved into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppealDecision {
    Approved,
    Rejected,
}

impl From<AppealDecision> for AppealStatus {
    fn from(decision: AppealDecision) -> Self {
        match decision {
            AppealDecision::Approved => AppealStatus::Approved,
            AppealDecision::Rejected => AppealStatus::Rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_wire_names() {
        let reason: AppealReason = serde_json::from_str("\"cleaner_late\"").unwrap();
        assert_eq!(reason, AppealReason::ProviderLate);
        assert_eq!(AppealReason::parse("was_present"), Some(AppealReason::PresenceClaimed));
        assert!(serde_json::from_str::<AppealReason>("\"too_expensive\"").is_err());
    }

    #[test]
    fn test_decision_maps_to_status() {
        assert_eq!(AppealStatus::from(AppealDecision::Approved), AppealStatus::Approved);
        assert_eq!(AppealStatus::from(AppealDecision::Rejected), AppealStatus::Rejected);
    }
}
