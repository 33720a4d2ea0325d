//! Portcullis core: token storage, claims decoding and route guarding

pub mod claims;
pub mod config;
pub mod error;
pub mod guard;
pub mod store;
pub mod types;

pub use claims::Claims;
pub use config::{ApiConfig, PortcullisConfig, RouteConfig, SessionConfig};
pub use error::{CoreError, CoreResult};
pub use guard::{GuardDecision, RouteGuard, TokenStatus};
pub use store::{FileStorage, MemoryStorage, StorageBackend, TokenKind, TokenLifetimes, TokenStore};
pub use types::{AuthResponse, OAuthUrlResponse, Profile, TokenPair};
