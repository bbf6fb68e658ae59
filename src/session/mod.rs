pub mod fingerprint;
pub mod manager;
pub mod store;
pub mod types;

pub use manager::SessionManager;
pub use store::{SessionStore, StoreError};
pub use types::{SessionEvent, SessionState};
