pub mod session;

pub use session::{CurrentSession, require_session};
