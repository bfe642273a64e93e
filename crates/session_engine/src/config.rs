use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scoring::ScoringRules;

pub const MAX_REJOIN_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid scoring rules: {0}")]
    Scoring(String),
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },
    #[error("{field} must not exceed {max}")]
    TooLarge { field: &'static str, max: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub reveal_interval_ms: u64,
    pub host_grace_ms: u64,
    pub rejoin_token_ttl_seconds: i64,
    /// HMAC secret for rejoin tokens; a random one is generated when unset.
    pub token_secret: Option<String>,
    pub max_players_per_session: usize,
    pub max_frame_bytes: usize,
    pub outbound_buffer: usize,
    pub scoring: ScoringRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reveal_interval_ms: 5_000,
            host_grace_ms: 30_000,
            rejoin_token_ttl_seconds: 3_600,
            token_secret: None,
            max_players_per_session: 200,
            max_frame_bytes: 16 * 1024,
            outbound_buffer: 256,
            scoring: ScoringRules::default(),
        }
    }
}

impl EngineConfig {
    pub fn reveal_interval(&self) -> Duration {
        Duration::from_millis(self.reveal_interval_ms)
    }

    pub fn host_grace(&self) -> Duration {
        Duration::from_millis(self.host_grace_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scoring.validate().map_err(ConfigError::Scoring)?;
        if self.rejoin_token_ttl_seconds <= 0 {
            return Err(ConfigError::NotPositive {
                field: "rejoin_token_ttl_seconds",
            });
        }
        if self.rejoin_token_ttl_seconds > MAX_REJOIN_TOKEN_TTL_SECONDS {
            return Err(ConfigError::TooLarge {
                field: "rejoin_token_ttl_seconds",
                max: MAX_REJOIN_TOKEN_TTL_SECONDS,
            });
        }
        if self.max_players_per_session == 0 {
            return Err(ConfigError::NotPositive {
                field: "max_players_per_session",
            });
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::NotPositive {
                field: "max_frame_bytes",
            });
        }
        if self.outbound_buffer == 0 {
            return Err(ConfigError::NotPositive {
                field: "outbound_buffer",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
