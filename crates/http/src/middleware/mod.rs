//! Front-server middleware

pub mod guard;

pub use guard::{extract_token, route_guard_middleware, should_skip_guard};
