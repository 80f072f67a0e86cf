pub mod manager;
pub mod store;

pub use manager::{SESSION_WINDOW, Session, SessionManager};
pub use store::SessionStore;
