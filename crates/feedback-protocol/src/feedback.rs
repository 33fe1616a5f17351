use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// Lifecycle of a feedback row. Clients only ever create `Pending` rows; every
/// other transition belongs to the classification workflow.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, TS, EnumString, Display, Default,
)]
#[serde(from = "String")]
#[strum(ascii_case_insensitive)]
pub enum FeedbackStatus {
    #[default]
    Pending,
    Processed,
    Reviewed,
    Resolved,
    /// A label this build does not know about. Rendered with the neutral tier.
    Unknown,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, TS, EnumString, Display,
)]
#[serde(from = "String")]
#[strum(ascii_case_insensitive)]
pub enum FeedbackCategory {
    Bug,
    Feature,
    General,
    Urgent,
    Unknown,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, TS, EnumString, Display,
)]
#[serde(from = "String")]
#[strum(ascii_case_insensitive)]
pub enum FeedbackPriority {
    High,
    Medium,
    Low,
    Unknown,
}

macro_rules! lenient_label {
    ($ty:ty) => {
        impl $ty {
            /// Parses a stored or received label, mapping anything unrecognised to
            /// `Unknown` instead of failing.
            pub fn from_label(label: &str) -> Self {
                <$ty>::from_str(label.trim()).unwrap_or(<$ty>::Unknown)
            }

            pub fn is_known(&self) -> bool {
                !matches!(self, <$ty>::Unknown)
            }
        }

        impl From<String> for $ty {
            fn from(label: String) -> Self {
                <$ty>::from_label(&label)
            }
        }
    };
}

lenient_label!(FeedbackStatus);
lenient_label!(FeedbackCategory);
lenient_label!(FeedbackPriority);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct FeedbackItem {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Option<FeedbackCategory>,
    pub priority: Option<FeedbackPriority>,
    pub status: FeedbackStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeedbackItem {
    pub fn is_pending(&self) -> bool {
        self.status == FeedbackStatus::Pending
    }
}

/// Body of a submission. Owner, status and classification are never taken
/// from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct CreateFeedback {
    pub title: String,
    pub description: String,
}

/// Write-back from the classification workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct ClassifyFeedback {
    pub category: Option<FeedbackCategory>,
    pub priority: Option<FeedbackPriority>,
    pub status: FeedbackStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!(FeedbackStatus::from_label("resolved"), FeedbackStatus::Resolved);
        assert_eq!(FeedbackPriority::from_label(" HIGH "), FeedbackPriority::High);
        assert_eq!(FeedbackCategory::from_label("Feature"), FeedbackCategory::Feature);
    }

    #[test]
    fn unrecognised_labels_become_unknown() {
        assert_eq!(FeedbackStatus::from_label("archived"), FeedbackStatus::Unknown);
        assert_eq!(FeedbackStatus::from_label("Unknown"), FeedbackStatus::Unknown);
        assert!(!FeedbackCategory::from_label("").is_known());
    }

    #[test]
    fn wire_labels_are_capitalised_and_lenient() {
        assert_eq!(
            serde_json::to_value(FeedbackStatus::Pending).unwrap(),
            serde_json::json!("Pending")
        );
        let status: FeedbackStatus = serde_json::from_value(serde_json::json!("Escalated")).unwrap();
        assert_eq!(status, FeedbackStatus::Unknown);
        assert_eq!(FeedbackPriority::Medium.to_string(), "Medium");
    }

    #[test]
    fn wire_labels_match_any_case() {
        let status: FeedbackStatus = serde_json::from_value(serde_json::json!("processed")).unwrap();
        assert_eq!(status, FeedbackStatus::Processed);

        let classified: ClassifyFeedback = serde_json::from_value(serde_json::json!({
            "category": "bug",
            "priority": "HIGH",
            "status": "REVIEWED"
        }))
        .unwrap();
        assert_eq!(classified.category, Some(FeedbackCategory::Bug));
        assert_eq!(classified.priority, Some(FeedbackPriority::High));
        assert_eq!(classified.status, FeedbackStatus::Reviewed);

        let unclassified: ClassifyFeedback = serde_json::from_value(serde_json::json!({
            "category": null,
            "priority": null,
            "status": "Pending"
        }))
        .unwrap();
        assert!(unclassified.category.is_none());
    }
}
