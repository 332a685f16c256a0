//! Support for library configuration options

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use once_cell::sync::Lazy;
use url::Url;

use crate::error::StoreError;

/// The `User-Agent` header sent by [`HttpRemote`](crate::remote::HttpRemote).
/// Feel free to override it when initing this library.
pub static USER_AGENT: Lazy<Arc<Mutex<String>>> = Lazy::new(|| Arc::new(Mutex::new(format!("shiftbook/{}", env!("CARGO_PKG_VERSION")))));

/// Identifier values that mean "no identifier" (compared after trimming)
pub const PLACEHOLDER_IDS: [&str; 3] = ["", "undefined", "null"];

/// Reserved cache entry that records that the migration sweep has already run on this device
pub const MIGRATION_SENTINEL_KEY: &str = "__migration_done";

/// Doctors collection name
pub const DOCTORS: &str = "doctors";
/// Shifts collection name
pub const SHIFTS: &str = "shifts";
/// Every collection the migration sweep knows about
pub const KNOWN_COLLECTIONS: [&str; 2] = [DOCTORS, SHIFTS];

const DEFAULT_READY_INTERVAL_MS: u64 = 500;
const DEFAULT_READY_ATTEMPTS: u32 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CACHE_FOLDER: &str = "shiftbook_cache";

/// Time allowed to the readiness checks themselves, on top of the pauses between them
pub const READY_CHECK_SLACK: Duration = Duration::from_secs(1);

/// How long and how often the remote store is checked at startup
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReadinessPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_READY_INTERVAL_MS),
            max_attempts: DEFAULT_READY_ATTEMPTS,
        }
    }
}

impl ReadinessPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self { interval, max_attempts }
    }

    /// Never wait for the remote store: the session stays on the local cache
    pub fn never() -> Self {
        Self { interval: Duration::from_millis(0), max_attempts: 0 }
    }

    /// Upper bound for the whole readiness poll.
    /// One extra interval and [`READY_CHECK_SLACK`] leave room for the checks themselves.
    pub fn timeout(&self) -> Duration {
        if self.max_attempts == 0 {
            return Duration::from_millis(0);
        }
        self.interval * (self.max_attempts + 1) + READY_CHECK_SLACK
    }
}

/// Runtime settings of a shiftbook installation
#[derive(Clone, Debug)]
pub struct Settings {
    /// Base URL of the remote document store. `None` means "local cache only"
    pub remote_url: Option<Url>,
    /// Bearer token for the remote document store
    pub auth_token: Option<String>,
    /// Folder of the local cache
    pub cache_folder: PathBuf,
    pub readiness: ReadinessPolicy,
    pub request_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remote_url: None,
            auth_token: None,
            cache_folder: PathBuf::from(DEFAULT_CACHE_FOLDER),
            readiness: ReadinessPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    /// Build settings from `SHIFTBOOK_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, StoreError> {
        let mut settings = Self::default();

        if let Ok(raw) = std::env::var("SHIFTBOOK_REMOTE_URL") {
            let url = Url::parse(raw.trim())
                .map_err(|err| StoreError::Config(format!("invalid SHIFTBOOK_REMOTE_URL {:?}: {}", raw, err)))?;
            settings.remote_url = Some(url);
        }
        if let Ok(token) = std::env::var("SHIFTBOOK_TOKEN") {
            if token.trim().is_empty() == false {
                settings.auth_token = Some(token.trim().to_string());
            }
        }
        if let Ok(folder) = std::env::var("SHIFTBOOK_CACHE_DIR") {
            settings.cache_folder = PathBuf::from(folder);
        }
        if let Ok(raw) = std::env::var("SHIFTBOOK_READY_ATTEMPTS") {
            settings.readiness.max_attempts = raw.trim().parse()
                .map_err(|err| StoreError::Config(format!("invalid SHIFTBOOK_READY_ATTEMPTS {:?}: {}", raw, err)))?;
        }
        if let Ok(raw) = std::env::var("SHIFTBOOK_READY_INTERVAL_MS") {
            let ms: u64 = raw.trim().parse()
                .map_err(|err| StoreError::Config(format!("invalid SHIFTBOOK_READY_INTERVAL_MS {:?}: {}", raw, err)))?;
            settings.readiness.interval = Duration::from_millis(ms);
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_timeout_covers_every_attempt() {
        let policy = ReadinessPolicy::new(Duration::from_millis(100), 4);
        assert_eq!(policy.timeout(), Duration::from_millis(500) + READY_CHECK_SLACK);
        assert_eq!(ReadinessPolicy::never().timeout(), Duration::from_millis(0));
    }
}
