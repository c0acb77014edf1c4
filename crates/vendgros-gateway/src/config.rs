//! Service configuration.
//!
//! Layered with figment: built-in defaults, then `vendgros.toml`, then
//! `VENDGROS_`-prefixed environment variables. Every load is validated
//! before use.

use std::time::Duration as StdDuration;

use anyhow::bail;
use chrono::Duration;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use vendgros_delivery::{ClientConfig, EngineConfig};

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Per-attempt HTTP timeout in seconds.
    #[serde(default = "default_delivery_timeout_seconds")]
    pub delivery_timeout_seconds: u64,

    /// User agent sent on outbound deliveries.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum redirects to follow per delivery.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Maximum ledger rows claimed per sweep.
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,

    /// Maximum delivery attempts in flight during a sweep.
    #[serde(default = "default_sweep_concurrency")]
    pub sweep_concurrency: usize,

    /// Claim lease duration in seconds.
    #[serde(default = "default_claim_lease_seconds")]
    pub claim_lease_seconds: u64,
}

fn default_delivery_timeout_seconds() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Vendgros-Webhooks/1.0".to_string()
}

fn default_max_redirects() -> u32 {
    3
}

fn default_sweep_batch_size() -> usize {
    50
}

fn default_sweep_concurrency() -> usize {
    8
}

fn default_claim_lease_seconds() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delivery_timeout_seconds: default_delivery_timeout_seconds(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
            sweep_batch_size: default_sweep_batch_size(),
            sweep_concurrency: default_sweep_concurrency(),
            claim_lease_seconds: default_claim_lease_seconds(),
        }
    }
}

impl Config {
    /// Loads configuration from defaults, `vendgros.toml`, and environment.
    pub fn load() -> anyhow::Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file("vendgros.toml"))
            .merge(Env::prefixed("VENDGROS_"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Validates invariants between the settings.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.delivery_timeout_seconds == 0 {
            bail!("delivery_timeout_seconds must be positive");
        }
        if self.sweep_batch_size == 0 {
            bail!("sweep_batch_size must be positive");
        }
        if self.sweep_concurrency == 0 {
            bail!("sweep_concurrency must be positive");
        }
        if self.claim_lease_seconds <= self.delivery_timeout_seconds {
            bail!(
                "claim_lease_seconds ({}) must exceed delivery_timeout_seconds ({}) so a live \
                 attempt never loses its claim",
                self.claim_lease_seconds,
                self.delivery_timeout_seconds
            );
        }
        Ok(())
    }

    /// Converts to the delivery client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: StdDuration::from_secs(self.delivery_timeout_seconds),
            user_agent: self.user_agent.clone(),
            max_redirects: self.max_redirects,
        }
    }

    /// Converts to the delivery engine configuration.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            sweep_batch_size: self.sweep_batch_size,
            sweep_concurrency: self.sweep_concurrency,
            claim_lease: Duration::seconds(self.claim_lease_seconds as i64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().expect("defaults validate");

        assert_eq!(config.delivery_timeout_seconds, 30);
        assert_eq!(config.sweep_batch_size, 50);
        assert_eq!(config.claim_lease_seconds, 60);
    }

    #[test]
    fn lease_must_outlast_timeout() {
        let config = Config { claim_lease_seconds: 30, ..Config::default() };
        assert!(config.validate().is_err());

        let config = Config { claim_lease_seconds: 31, ..Config::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_knobs_rejected() {
        assert!(Config { delivery_timeout_seconds: 0, ..Config::default() }.validate().is_err());
        assert!(Config { sweep_batch_size: 0, ..Config::default() }.validate().is_err());
        assert!(Config { sweep_concurrency: 0, ..Config::default() }.validate().is_err());
    }

    #[test]
    fn conversions_carry_settings() {
        let config = Config {
            delivery_timeout_seconds: 10,
            sweep_batch_size: 25,
            sweep_concurrency: 4,
            claim_lease_seconds: 45,
            ..Config::default()
        };

        let client = config.to_client_config();
        assert_eq!(client.timeout, StdDuration::from_secs(10));

        let engine = config.to_engine_config();
        assert_eq!(engine.sweep_batch_size, 25);
        assert_eq!(engine.sweep_concurrency, 4);
        assert_eq!(engine.claim_lease, Duration::seconds(45));
    }

    #[test]
    fn environment_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("VENDGROS_SWEEP_BATCH_SIZE", "10");
            jail.set_env("VENDGROS_USER_AGENT", "Test-Agent/2.0");

            let config = Config::load().expect("loads");
            assert_eq!(config.sweep_batch_size, 10);
            assert_eq!(config.user_agent, "Test-Agent/2.0");
            Ok(())
        });
    }

    #[test]
    fn toml_file_layered_under_environment() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "vendgros.toml",
                r#"
                sweep_concurrency = 2
                sweep_batch_size = 20
                "#,
            )?;
            jail.set_env("VENDGROS_SWEEP_BATCH_SIZE", "30");

            let config = Config::load().expect("loads");
            assert_eq!(config.sweep_concurrency, 2);
            assert_eq!(config.sweep_batch_size, 30);
            Ok(())
        });
    }
}
