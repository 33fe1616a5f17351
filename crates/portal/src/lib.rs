//! Client side of the feedback portal.
//!
//! Components talk to the backend only through [`client::PortalClient`],
//! which wraps a [`backend::Backend`] implementation. [`http::HttpBackend`]
//! is the production one.

pub mod auth_button;
pub mod backend;
pub mod client;
pub mod config;
pub mod dashboard;
pub mod display;
pub mod feedback_list;
pub mod http;
pub mod login;
pub mod navigation;
pub mod notify;
pub mod sse;
pub mod submission;

pub use backend::{Backend, BackendError, Subscription};
pub use client::PortalClient;
pub use config::PortalConfig;
