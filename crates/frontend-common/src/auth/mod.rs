//! Authentication module

pub mod callback;
pub mod context;
pub mod error_messages;

// Re-export commonly used items
pub use callback::{CallbackError, complete_oauth_login, deposit_tokens};
pub use context::{AuthAction, AuthState, SessionManager, SignupStatus};
pub use error_messages::user_friendly_message;
