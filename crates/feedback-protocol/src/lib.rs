//! Wire contract shared by the feedback backend and the portal client.
//!
//! Everything that crosses the HTTP boundary lives here: the feedback row,
//! the owner-scoped change events, auth payloads, the response envelope and
//! the submission length rules both sides enforce.

pub mod auth;
pub mod change;
pub mod feedback;
pub mod response;
pub mod validation;

pub use auth::{Credentials, SessionInfo, UserInfo, normalize_email};
pub use change::{ChangeEvent, DeletedRecord};
pub use feedback::{
    ClassifyFeedback, CreateFeedback, FeedbackCategory, FeedbackItem, FeedbackPriority,
    FeedbackStatus,
};
pub use response::ApiResponse;
pub use validation::{SubmissionError, validate_submission};
