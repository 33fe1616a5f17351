pub mod auth_session;
pub mod event_outbox;
pub mod feedback;
pub mod ids;
pub mod user;
