//! Configuration for the ticket economy.
//!
//! Loads configuration from environment variables with sensible defaults, or
//! from a JSON document. Both paths go through [`EconomyConfig::validate`].

use festival_core::types::BasisPoints;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

/// Configuration rejected by [`EconomyConfig::validate`] or the JSON loader.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A value is outside its permitted range
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The JSON document could not be parsed
    #[error("Malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Economy configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomyConfig {
    /// Resale marketplace settings
    pub marketplace: MarketplaceConfig,
    /// Cancellation voting settings
    pub voting: VotingConfig,
    /// Observation log settings
    pub observations: ObservationConfig,
    /// Logging settings
    pub telemetry: TelemetryConfig,
}

/// Resale marketplace configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    /// Highest fee an admin may set, in basis points (100 = 1%)
    pub fee_ceiling_bps: u32,
    /// Fee a new marketplace starts with, in basis points
    pub default_fee_bps: u32,
    /// Highest resale price relative to face value, in basis points (11 000 = 110%)
    pub resale_cap_bps: u32,
}

impl MarketplaceConfig {
    /// Fee ceiling as basis points
    #[must_use]
    pub const fn fee_ceiling(&self) -> BasisPoints {
        BasisPoints::new(self.fee_ceiling_bps)
    }

    /// Default fee as basis points
    #[must_use]
    pub const fn default_fee(&self) -> BasisPoints {
        BasisPoints::new(self.default_fee_bps)
    }

    /// Resale cap as basis points
    #[must_use]
    pub const fn resale_cap(&self) -> BasisPoints {
        BasisPoints::new(self.resale_cap_bps)
    }
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            fee_ceiling_bps: 100,
            default_fee_bps: 100,
            resale_cap_bps: 11_000,
        }
    }
}

/// Voting configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingConfig {
    /// Length of the cancellation window opened at the event date, in seconds
    pub voting_period_secs: u64,
}

impl VotingConfig {
    /// Voting period as a chrono duration (saturating at `i64::MAX` seconds)
    #[must_use]
    pub fn voting_period(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.voting_period_secs).unwrap_or(i64::MAX))
    }
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            voting_period_secs: 3 * 24 * 60 * 60,
        }
    }
}

/// Observation log configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationConfig {
    /// Entries buffered per lagging live subscriber
    pub channel_capacity: usize,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: "festival=info".to_string(),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl EconomyConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the resulting values are inconsistent.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            marketplace: MarketplaceConfig {
                fee_ceiling_bps: env_or(
                    "FESTIVAL_MARKETPLACE_FEE_CEILING_BPS",
                    defaults.marketplace.fee_ceiling_bps,
                ),
                default_fee_bps: env_or(
                    "FESTIVAL_MARKETPLACE_DEFAULT_FEE_BPS",
                    defaults.marketplace.default_fee_bps,
                ),
                resale_cap_bps: env_or(
                    "FESTIVAL_RESALE_CAP_BPS",
                    defaults.marketplace.resale_cap_bps,
                ),
            },
            voting: VotingConfig {
                voting_period_secs: env_or(
                    "FESTIVAL_VOTING_PERIOD_SECS",
                    defaults.voting.voting_period_secs,
                ),
            },
            observations: ObservationConfig {
                channel_capacity: env_or(
                    "FESTIVAL_OBSERVATION_CAPACITY",
                    defaults.observations.channel_capacity,
                ),
            },
            telemetry: TelemetryConfig {
                log_filter: env::var("FESTIVAL_LOG_FILTER")
                    .unwrap_or(defaults.telemetry.log_filter),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] for invalid JSON and
    /// [`ConfigError::Invalid`] for inconsistent values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the values are mutually consistent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let market = &self.marketplace;
        if market.fee_ceiling_bps > BasisPoints::WHOLE.get() {
            return Err(ConfigError::Invalid(format!(
                "fee ceiling {} bps exceeds 100%",
                market.fee_ceiling_bps
            )));
        }
        if market.default_fee_bps > market.fee_ceiling_bps {
            return Err(ConfigError::Invalid(format!(
                "default fee {} bps exceeds ceiling {} bps",
                market.default_fee_bps, market.fee_ceiling_bps
            )));
        }
        if market.resale_cap_bps < BasisPoints::WHOLE.get() {
            return Err(ConfigError::Invalid(format!(
                "resale cap {} bps is below face value",
                market.resale_cap_bps
            )));
        }
        if self.voting.voting_period_secs == 0 {
            return Err(ConfigError::Invalid(
                "voting period must be positive".to_string(),
            ));
        }
        if self.observations.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "observation channel capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
