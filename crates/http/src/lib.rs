//! Portcullis HTTP layer
//!
//! The `client` feature provides the identity API client and the refreshing
//! request gateway. The `server` feature provides the route guard middleware
//! for the server that hands out the front-end pages.

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "server")]
pub mod middleware;

#[cfg(feature = "client")]
pub use client::{ApiClient, ApiRequest, AuthGateway, IdentityClient, SignupOutcome, error::ClientError};
