#![forbid(unsafe_code)]

mod cache;
mod error;
mod persistence;
mod timing;
mod workers;

pub use cache::{Cache, MIN_CACHE_SIZE};
pub use error::Error;
pub use persistence::Persistence;
pub use timing::Timing;
pub use workers::{MAX_WORKERS, Workers};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment variables overriding file settings, e.g.
/// `DCCACHE_TIMING__TIMEOUT=5`.
pub const ENV_PREFIX: &str = "DCCACHE_";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub cache: Cache,
    pub workers: Workers,
    pub timing: Timing,
    pub persistence: Persistence,
}

impl Config {
    /// Default configuration, overridden by the environment.
    pub fn new() -> Self {
        Self::figment()
            .extract::<Self>()
            .map(Self::clamp)
            .unwrap_or_default()
    }

    /// Load the configuration from a TOML file, then apply environment
    /// overrides on top of it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::InvalidPath(path.to_path_buf()));
        }
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config.clamp())
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        let config: Self = toml_edit::de::from_str(text)?;
        Ok(config.clamp())
    }

    pub fn to_toml_string(&self) -> Result<String, Error> {
        Ok(toml_edit::ser::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn clamp(self) -> Self {
        Self {
            cache: self.cache.clamp(),
            workers: self.workers.clamp(),
            timing: self.timing.clamp(),
            persistence: self.persistence,
        }
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn load_merges_file_over_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dccache.toml");
        std::fs::write(
            &path,
            "[workers]\npingers = 0\n\n[timing]\nunreachable_delay = 30\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.workers.pingers, 0);
        assert_eq!(config.workers.pollers, Workers::default().pollers);
        assert_eq!(config.timing.unreachable_delay, Duration::from_secs(30));
        assert_eq!(config.cache, Cache::default());
    }

    #[test]
    fn missing_file_is_rejected() {
        let dir = tempdir().unwrap();
        let err = Config::load(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));
    }

    #[test]
    fn toml_roundtrip_keeps_values() {
        let mut config = Config::default();
        config.workers.java_pollers = 3;
        config.timing.status_interval = Duration::from_secs(5);
        let text = config.to_toml_string().unwrap();
        assert_eq!(Config::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let config = Config::from_toml_str("[timing]\nsync_interval = 0\n").unwrap();
        assert_eq!(config.timing.sync_interval, Duration::from_secs(1));
    }
}
