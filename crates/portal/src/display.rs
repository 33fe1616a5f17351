//! View data for the feedback list: badge tiers, relative timestamps and the
//! list header. Front-ends decide how a tier looks.

use chrono::{DateTime, Utc};
use feedback_protocol::{FeedbackCategory, FeedbackItem, FeedbackPriority, FeedbackStatus};

pub const PROCESSING_BANNER: &str =
    "Being processed... Classification and prioritization in progress";
pub const LIST_HEADING: &str = "Your Feedback";
pub const EMPTY_TITLE: &str = "No feedback yet";
pub const EMPTY_HINT: &str = "Submit your first feedback using the form above!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeVariant {
    Default,
    Secondary,
    Destructive,
    Warning,
    Success,
    Outline,
}

pub fn status_variant(status: FeedbackStatus) -> BadgeVariant {
    match status {
        FeedbackStatus::Pending => BadgeVariant::Warning,
        FeedbackStatus::Processed => BadgeVariant::Success,
        FeedbackStatus::Reviewed => BadgeVariant::Default,
        FeedbackStatus::Resolved => BadgeVariant::Secondary,
        FeedbackStatus::Unknown => BadgeVariant::Outline,
    }
}

pub fn priority_variant(priority: FeedbackPriority) -> BadgeVariant {
    match priority {
        FeedbackPriority::High => BadgeVariant::Destructive,
        FeedbackPriority::Medium => BadgeVariant::Warning,
        FeedbackPriority::Low => BadgeVariant::Secondary,
        FeedbackPriority::Unknown => BadgeVariant::Outline,
    }
}

pub fn category_variant(category: FeedbackCategory) -> BadgeVariant {
    match category {
        FeedbackCategory::Bug | FeedbackCategory::Urgent => BadgeVariant::Destructive,
        FeedbackCategory::Feature => BadgeVariant::Default,
        FeedbackCategory::General | FeedbackCategory::Unknown => BadgeVariant::Secondary,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub label: String,
    pub variant: BadgeVariant,
}

/// Short age of a timestamp relative to `now`. Future timestamps read as
/// "just now"; anything a week or older shows the date.
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(at);
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if minutes < 1 {
        "just now".to_string()
    } else if hours < 1 {
        format!("{minutes}m ago")
    } else if days < 1 {
        format!("{hours}h ago")
    } else if days < 7 {
        format!("{days}d ago")
    } else {
        at.format("%b %-d, %Y").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackCard {
    pub title: String,
    pub description: String,
    pub age: String,
    /// Status first, then priority and category when classified.
    pub badges: Vec<Badge>,
    pub banner: Option<&'static str>,
}

impl FeedbackCard {
    pub fn from_item(item: &FeedbackItem, now: DateTime<Utc>) -> Self {
        let mut badges = vec![Badge {
            label: item.status.to_string(),
            variant: status_variant(item.status),
        }];
        if let Some(priority) = item.priority {
            badges.push(Badge {
                label: format!("{priority} Priority"),
                variant: priority_variant(priority),
            });
        }
        if let Some(category) = item.category {
            badges.push(Badge {
                label: category.to_string(),
                variant: category_variant(category),
            });
        }

        Self {
            title: item.title.clone(),
            description: item.description.clone(),
            age: relative_time(item.created_at, now),
            badges,
            banner: item.is_pending().then_some(PROCESSING_BANNER),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListView {
    Empty,
    Cards { total: Badge, cards: Vec<FeedbackCard> },
}

impl ListView {
    pub fn build(items: &[FeedbackItem], now: DateTime<Utc>) -> Self {
        if items.is_empty() {
            return ListView::Empty;
        }
        ListView::Cards {
            total: Badge {
                label: format!("{} Total", items.len()),
                variant: BadgeVariant::Outline,
            },
            cards: items
                .iter()
                .map(|item| FeedbackCard::from_item(item, now))
                .collect(),
        }
    }
}
