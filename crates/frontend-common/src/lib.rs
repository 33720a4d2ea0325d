pub mod auth;
pub mod client;

pub use auth::context::{AuthState, SessionManager};
pub use client::{create_ephemeral_session, create_session_manager, create_token_store};
