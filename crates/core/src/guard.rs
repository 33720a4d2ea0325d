//! Route guard: navigation decisions from the access token alone
//!
//! The guard never touches the network. A "valid" token here only means the
//! payload decodes and its expiry lies in the future.

use crate::claims::Claims;
use crate::config::RouteConfig;
use chrono::{DateTime, Utc};

/// Outcome of guarding a navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(String),
}

impl GuardDecision {
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn redirect_target(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::Redirect(target) => Some(target),
        }
    }
}

/// Local assessment of a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    Missing,
    Malformed,
    Expired,
    Valid(Claims),
}

impl TokenStatus {
    pub fn assess(token: Option<&str>, now: DateTime<Utc>) -> Self {
        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return Self::Missing;
        };

        match Claims::decode(token) {
            Ok(claims) if claims.is_expired_at(now) => Self::Expired,
            Ok(claims) => Self::Valid(claims),
            Err(_) => Self::Malformed,
        }
    }

    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// Public/protected path policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGuard {
    public_paths: Vec<String>,
    login_path: String,
    landing_path: String,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(&RouteConfig::default())
    }
}

impl RouteGuard {
    pub fn new(config: &RouteConfig) -> Self {
        Self {
            public_paths: config
                .public_paths
                .iter()
                .map(|p| normalize(p).to_string())
                .collect(),
            login_path: config.login_path.clone(),
            landing_path: config.landing_path.clone(),
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn landing_path(&self) -> &str {
        &self.landing_path
    }

    /// Exact match against the public set, ignoring a trailing slash
    pub fn is_public(&self, path: &str) -> bool {
        let path = normalize(path);
        self.public_paths.iter().any(|p| p == path)
    }

    /// Decide a navigation against the current clock
    pub fn evaluate(&self, path: &str, token: Option<&str>) -> GuardDecision {
        self.evaluate_at(path, token, Utc::now())
    }

    pub fn evaluate_at(&self, path: &str, token: Option<&str>, now: DateTime<Utc>) -> GuardDecision {
        let status = TokenStatus::assess(token, now);

        if self.is_public(path) {
            // Keep signed-in users away from the login and signup screens
            return if status.is_valid() {
                tracing::debug!(path, "Session already valid, redirecting to landing page");
                GuardDecision::Redirect(self.landing_path.clone())
            } else {
                GuardDecision::Allow
            };
        }

        match status {
            TokenStatus::Valid(_) => GuardDecision::Allow,
            TokenStatus::Missing => {
                tracing::debug!(path, "No token, redirecting to login");
                GuardDecision::Redirect(self.login_path.clone())
            }
            TokenStatus::Expired | TokenStatus::Malformed => {
                tracing::debug!(path, ?status, "Unusable token, redirecting to login");
                GuardDecision::Redirect(self.login_path.clone())
            }
        }
    }
}

fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use chrono::Duration;

    fn token_expiring_at(exp: DateTime<Utc>) -> String {
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::json!({ "sub": "1", "email": "a@b.com", "roles": ["USER"], "exp": exp.timestamp() })
                .to_string(),
        );
        format!("eyJhbGciOiJIUzI1NiJ9.{payload}.c2ln")
    }

    #[test]
    fn test_expired_token_on_protected_path_goes_to_login() {
        let guard = RouteGuard::default();
        let now = Utc::now();
        let t1 = token_expiring_at(now - Duration::seconds(1));

        assert_eq!(
            guard.evaluate_at("/dashboard", Some(&t1), now),
            GuardDecision::Redirect("/login".into())
        );
    }

    #[test]
    fn test_expired_token_on_public_path_is_allowed() {
        let guard = RouteGuard::default();
        let now = Utc::now();
        let expired = token_expiring_at(now - Duration::hours(2));

        for path in ["/login", "/signup", "/auth/callback/google"] {
            assert!(guard.evaluate_at(path, Some(&expired), now).is_allowed());
        }
    }

    #[test]
    fn test_valid_token_on_public_path_goes_to_landing() {
        let guard = RouteGuard::default();
        let now = Utc::now();
        let valid = token_expiring_at(now + Duration::hours(1));

        for path in ["/login", "/signup/", "/auth/callback/google"] {
            assert_eq!(
                guard.evaluate_at(path, Some(&valid), now).redirect_target(),
                Some("/dashboard")
            );
        }
    }

    #[test]
    fn test_fractional_expiry_on_protected_path_is_allowed() {
        let guard = RouteGuard::default();
        let now = Utc::now();
        let exp = (now + Duration::hours(1)).timestamp() as f64 + 0.5;
        let payload = URL_SAFE_NO_PAD.encode(serde_json::json!({ "sub": "1", "exp": exp }).to_string());
        let token = format!("eyJhbGciOiJIUzI1NiJ9.{payload}.c2ln");

        assert!(guard.evaluate_at("/dashboard", Some(&token), now).is_allowed());
        assert_eq!(
            guard.evaluate_at("/login", Some(&token), now).redirect_target(),
            Some("/dashboard")
        );
    }

    #[test]
    fn test_valid_token_on_protected_path_is_allowed() {
        let guard = RouteGuard::default();
        let now = Utc::now();
        let valid = token_expiring_at(now + Duration::minutes(5));

        for path in ["/dashboard", "/", "/settings/profile"] {
            assert!(guard.evaluate_at(path, Some(&valid), now).is_allowed());
        }
    }

    #[test]
    fn test_missing_or_malformed_token_on_protected_path() {
        let guard = RouteGuard::default();
        let now = Utc::now();

        for token in [None, Some(""), Some("not-a-jwt"), Some("a.b.c")] {
            assert_eq!(
                guard.evaluate_at("/dashboard", token, now),
                GuardDecision::Redirect("/login".into()),
                "token {token:?}"
            );
        }
        assert!(guard.evaluate_at("/login", Some("garbage"), now).is_allowed());
        assert!(guard.evaluate_at("/signup", None, now).is_allowed());
    }

    #[test]
    fn test_custom_routes() {
        let guard = RouteGuard::new(&RouteConfig {
            public_paths: vec!["/welcome/".into()],
            login_path: "/sign-in".into(),
            landing_path: "/home".into(),
        });
        let now = Utc::now();
        let valid = token_expiring_at(now + Duration::hours(1));

        assert!(guard.is_public("/welcome"));
        assert!(!guard.is_public("/login"));
        assert_eq!(
            guard.evaluate_at("/welcome", Some(&valid), now).redirect_target(),
            Some("/home")
        );
        assert_eq!(
            guard.evaluate_at("/login", None, now).redirect_target(),
            Some("/sign-in")
        );
    }

    #[test]
    fn test_token_status() {
        let now = Utc::now();
        assert_eq!(TokenStatus::assess(None, now), TokenStatus::Missing);
        assert_eq!(TokenStatus::assess(Some("  "), now), TokenStatus::Missing);
        assert_eq!(TokenStatus::assess(Some("x.y.z"), now), TokenStatus::Malformed);
        assert_eq!(
            TokenStatus::assess(Some(&token_expiring_at(now)), now),
            TokenStatus::Expired
        );
        assert!(TokenStatus::assess(Some(&token_expiring_at(now + Duration::seconds(30))), now).is_valid());
    }
}
