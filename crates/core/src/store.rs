//! Token store with a precedence-ordered pair of storage locations
//!
//! Reads look at the cookie-backed store first and fall back to the client-only
//! store. Writes always land in the cookie-backed store so that route guarding
//! outside the UI runtime sees them; the access token is mirrored into the
//! client-only store as well. Nothing here returns an error: a value that
//! cannot be read is simply absent.

use crate::error::CoreResult;
use crate::types::{Profile, TokenPair};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Storage key of the cached profile snapshot
pub const PROFILE_KEY: &str = "user";

/// Credential kinds kept by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    /// Cookie / storage key for this kind
    pub const fn storage_key(self) -> &'static str {
        match self {
            Self::Access => "accessToken",
            Self::Refresh => "refreshToken",
        }
    }
}

/// A key/value location with per-entry expiry
pub trait StorageBackend: Send + Sync {
    /// Current value, `None` when missing or expired
    fn get(&self, key: &str) -> Option<String>;

    /// Replace the value; `ttl` of `None` keeps it until removed
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>);

    fn remove(&self, key: &str);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredValue {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn new(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl.and_then(|ttl| {
                let now = Utc::now();
                // Out-of-range lifetimes saturate to "already expired" or "no expiry"
                match now.checked_add_signed(ttl) {
                    Some(at) => Some(at),
                    None if ttl < Duration::zero() => Some(now),
                    None => None,
                }
            }),
        }
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read a live entry, dropping it when expired
fn read_live(entries: &mut HashMap<String, StoredValue>, key: &str) -> Option<String> {
    let live = entries.get(key).map(|entry| entry.is_live(Utc::now()))?;
    if live {
        entries.get(key).map(|entry| entry.value.clone())
    } else {
        entries.remove(key);
        None
    }
}

/// In-process storage, the equivalent of a browser's local storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, StoredValue>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        read_live(&mut lock(&self.entries), key)
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        lock(&self.entries).insert(key.to_string(), StoredValue::new(value, ttl));
    }

    fn remove(&self, key: &str) {
        lock(&self.entries).remove(key);
    }
}

/// JSON-file storage with write-through persistence, used as a cookie jar by the CLI
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<HashMap<String, StoredValue>>,
}

impl FileStorage {
    /// Open (or lazily create) the jar at `path`
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            HashMap::new()
        };

        debug!(path = %path.display(), entries = entries.len(), "Opened file storage");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, StoredValue>) {
        let result = serde_json::to_string_pretty(entries)
            .map_err(std::io::Error::other)
            .and_then(|content| {
                if let Some(parent) = self.path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&self.path, content)
            });

        if let Err(e) = result {
            warn!(path = %self.path.display(), "Failed to persist storage: {e}");
        }
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        let value = read_live(&mut entries, key);
        if entries.len() != before {
            self.persist(&entries);
        }
        value
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let mut entries = lock(&self.entries);
        entries.insert(key.to_string(), StoredValue::new(value, ttl));
        self.persist(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = lock(&self.entries);
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }
}

/// Default lifetimes of the persisted values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
    pub profile: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::days(1),
            refresh: Duration::days(7),
            profile: Duration::days(1),
        }
    }
}

impl TokenLifetimes {
    const fn for_kind(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access,
            TokenKind::Refresh => self.refresh,
        }
    }
}

/// Session credential store shared by the gateway and the session manager
///
/// Cloning is cheap; clones share the same locations and generation.
#[derive(Clone)]
pub struct TokenStore {
    cookies: Arc<dyn StorageBackend>,
    local: Arc<dyn StorageBackend>,
    lifetimes: TokenLifetimes,
    /// Bumped by every `clear_all` and `store_pair`; guards conditional writes
    generation: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("lifetimes", &self.lifetimes)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl TokenStore {
    pub fn new(
        cookies: Arc<dyn StorageBackend>,
        local: Arc<dyn StorageBackend>,
        lifetimes: TokenLifetimes,
    ) -> Self {
        Self {
            cookies,
            local,
            lifetimes,
            generation: Arc::new(Mutex::new(0)),
        }
    }

    /// Store backed entirely by memory, with default lifetimes
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
            TokenLifetimes::default(),
        )
    }

    pub const fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    /// Read a credential: cookie store, then client-only store, then absent
    pub fn get(&self, kind: TokenKind) -> Option<String> {
        let key = kind.storage_key();
        self.cookies
            .get(key)
            .or_else(|| self.local.get(key))
            .filter(|value| !value.is_empty())
    }

    /// Write a credential; `ttl` of `None` uses the default lifetime for the kind
    pub fn set(&self, kind: TokenKind, value: &str, ttl: Option<Duration>) {
        let key = kind.storage_key();
        let ttl = ttl.unwrap_or_else(|| self.lifetimes.for_kind(kind));
        self.cookies.set(key, value, Some(ttl));
        if kind == TokenKind::Access {
            self.local.set(key, value, None);
        }
    }

    pub fn clear(&self, kind: TokenKind) {
        let key = kind.storage_key();
        self.cookies.remove(key);
        self.local.remove(key);
    }

    /// Cached profile, `None` when missing or unreadable
    pub fn profile_snapshot(&self) -> Option<Profile> {
        let raw = self.cookies.get(PROFILE_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!("Discarding unreadable profile snapshot: {e}");
                self.cookies.remove(PROFILE_KEY);
                None
            }
        }
    }

    pub fn set_profile_snapshot(&self, profile: &Profile) {
        match serde_json::to_string(profile) {
            Ok(raw) => self
                .cookies
                .set(PROFILE_KEY, &raw, Some(self.lifetimes.profile)),
            Err(e) => warn!("Failed to serialize profile snapshot: {e}"),
        }
    }

    /// Cache a freshly fetched profile unless the store was cleared since
    /// `generation` was observed
    pub fn set_profile_snapshot_if(&self, generation: u64, profile: &Profile) -> bool {
        let current = lock(&self.generation);
        if *current != generation {
            return false;
        }
        self.set_profile_snapshot(profile);
        true
    }

    /// Replace both credentials together, starting a new session
    ///
    /// Conditional writes observed against the previous session are dropped.
    pub fn store_pair(&self, pair: &TokenPair) {
        let mut generation = lock(&self.generation);
        *generation += 1;
        self.set(TokenKind::Access, &pair.access_token, None);
        self.set(TokenKind::Refresh, &pair.refresh_token, None);
    }

    /// Store a refreshed access token (and rotated refresh token, if any) unless
    /// the store was cleared since `generation` was observed
    ///
    /// Returns whether the write happened.
    pub fn store_refreshed(
        &self,
        generation: u64,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> bool {
        let current = lock(&self.generation);
        if *current != generation {
            debug!(
                observed = generation,
                current = *current,
                "Store cleared while refreshing; dropping refreshed tokens"
            );
            return false;
        }
        self.set(TokenKind::Access, access_token, None);
        if let Some(refresh_token) = refresh_token {
            self.set(TokenKind::Refresh, refresh_token, None);
        }
        true
    }

    /// Remove both credentials and the profile snapshot
    pub fn clear_all(&self) {
        self.clear_locked(&mut lock(&self.generation));
    }

    fn clear_locked(&self, generation: &mut u64) {
        *generation += 1;
        self.clear(TokenKind::Access);
        self.clear(TokenKind::Refresh);
        self.cookies.remove(PROFILE_KEY);
        debug!(generation = *generation, "Cleared session credentials");
    }

    /// Remove everything unless a new session started since `generation` was
    /// observed
    ///
    /// Returns whether the store was cleared.
    pub fn clear_all_if(&self, generation: u64) -> bool {
        let mut current = lock(&self.generation);
        if *current != generation {
            debug!(
                observed = generation,
                current = *current,
                "Session replaced; keeping its credentials"
            );
            return false;
        }
        self.clear_locked(&mut current);
        true
    }

    /// Number of `clear_all` and `store_pair` calls so far
    pub fn generation(&self) -> u64 {
        *lock(&self.generation)
    }

    /// Whether both credentials and the snapshot are gone
    pub fn is_empty(&self) -> bool {
        self.get(TokenKind::Access).is_none()
            && self.get(TokenKind::Refresh).is_none()
            && self.cookies.get(PROFILE_KEY).is_none()
    }
}
