//! Runtime configuration read from the environment.
//!
//! Engine knobs: `MATCHING_IO_TIMEOUT_MS` (book load and fee lookup),
//! `MATCHING_COMMIT_TIMEOUT_MS` (each commit or cancel).
//! Server knobs: `PORT`, `STATE_FILE`, `MATCH_INTERVAL_MS` (0 disables the
//! periodic matcher), `SEED_DEMO_PAIR`.

use std::path::PathBuf;
use std::time::Duration;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Timeouts applied to every ledger call made during a pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub io_timeout: Duration,
    pub commit_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_secs(5),
            commit_timeout: Duration::from_secs(2),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            io_timeout: env_parse("MATCHING_IO_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.io_timeout),
            commit_timeout: env_parse("MATCHING_COMMIT_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.commit_timeout),
        }
    }
}

/// Settings for the HTTP binary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub state_file: Option<PathBuf>,
    pub match_interval: Option<Duration>,
    pub seed_demo_pair: bool,
    pub engine: EngineConfig,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT").unwrap_or(8080),
            state_file: std::env::var("STATE_FILE").ok().filter(|s| !s.is_empty()).map(PathBuf::from),
            match_interval: env_parse::<u64>("MATCH_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            seed_demo_pair: env_parse("SEED_DEMO_PAIR").unwrap_or(true),
            engine: EngineConfig::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_bounded() {
        let c = EngineConfig::default();
        assert!(c.io_timeout > Duration::ZERO);
        assert!(c.commit_timeout > Duration::ZERO);
    }

    #[test]
    fn env_parse_ignores_garbage() {
        std::env::set_var("PAIR_MATCHING_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_parse::<u64>("PAIR_MATCHING_TEST_GARBAGE"), None);
        std::env::set_var("PAIR_MATCHING_TEST_NUMBER", " 250 ");
        assert_eq!(env_parse::<u64>("PAIR_MATCHING_TEST_NUMBER"), Some(250));
    }
}
