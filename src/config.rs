// src/config.rs
//
// Run configuration: population, heterogeneity fractions, timing parameters
// and the optional adversary. Values come from defaults, an optional TOML
// file, and CLI overrides, in that order.
//

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::Result;

/// Adversary release policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AdversaryMode {
    /// Dump the whole private chain once the lead drops to two.
    Selfish,
    /// Never dump: drip one private block per received public block.
    Stubborn,
}

impl AdversaryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdversaryMode::Selfish => "selfish",
            AdversaryMode::Stubborn => "stubborn",
        }
    }
}

/// Rule applied when two chains tie at the same height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    EarlierTimestamp,
    LaterTimestamp,
}

impl Default for TieBreak {
    fn default() -> Self {
        TieBreak::LaterTimestamp
    }
}

/// Adversary parameters (`h` and `Z` in the run drivers).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdversaryConfig {
    pub mode: AdversaryMode,
    /// Fraction of global hashing power held by the adversary.
    pub hashing_share: f64,
    /// Percentage of honest peers directly linked to the adversary.
    pub connectivity_pct: f64,
}

/// Full simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Total participant count, adversary included when one is configured.
    pub population: usize,
    /// Fraction of honest peers classified as slow (`z0`).
    pub slow_fraction: f64,
    /// Fraction of honest peers classified as low-CPU (`z1`).
    pub low_cpu_fraction: f64,
    /// Mean transaction interarrival time in virtual seconds (`Ttx`).
    /// `inf` disables transaction generation entirely.
    pub tx_interarrival: f64,
    /// Target mean block interval in virtual seconds (`I`).
    pub block_interval: f64,
    /// Simulation horizon in virtual seconds.
    pub duration: f64,
    pub tie_break: TieBreak,
    /// RNG seed; drawn from entropy (and logged) when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adversary: Option<AdversaryConfig>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            population: 10,
            slow_fraction: 0.5,
            low_cpu_fraction: 0.5,
            tx_interarrival: 0.5,
            block_interval: 0.5,
            duration: 100.0,
            tie_break: TieBreak::default(),
            adversary: None,
            seed: None,
        }
    }
}

impl SimConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: SimConfig = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Number of honest peers (the adversary replaces one population slot).
    pub fn honest_population(&self) -> usize {
        if self.adversary.is_some() {
            self.population.saturating_sub(1)
        } else {
            self.population
        }
    }

    /// Total participants, i.e. the size of every balance sheet and fabric
    /// matrix.
    pub fn participants(&self) -> usize {
        self.population
    }

    /// Validate parameter ranges before a run.
    pub fn validate(&self) -> Result<()> {
        if self.honest_population() < 2 {
            return Err(SimError::InvalidParameter(
                "population must leave at least two honest peers".into(),
            ));
        }
        for (name, frac) in [
            ("slow_fraction", self.slow_fraction),
            ("low_cpu_fraction", self.low_cpu_fraction),
        ] {
            if !(0.0..=1.0).contains(&frac) {
                return Err(SimError::InvalidParameter(format!(
                    "{name} must lie in [0, 1], got {frac}"
                )));
            }
        }
        if !(self.tx_interarrival > 0.0) {
            return Err(SimError::InvalidParameter(format!(
                "tx_interarrival must be positive, got {}",
                self.tx_interarrival
            )));
        }
        if !self.block_interval.is_finite() || self.block_interval <= 0.0 {
            return Err(SimError::InvalidParameter(format!(
                "block_interval must be positive and finite, got {}",
                self.block_interval
            )));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(SimError::InvalidParameter(format!(
                "duration must be positive and finite, got {}",
                self.duration
            )));
        }
        if let Some(adv) = &self.adversary {
            if !adv.hashing_share.is_finite()
                || adv.hashing_share <= 0.0
                || adv.hashing_share >= 1.0
            {
                return Err(SimError::InvalidParameter(format!(
                    "adversary hashing share must lie in (0, 1), got {}",
                    adv.hashing_share
                )));
            }
            if !(0.0..=100.0).contains(&adv.connectivity_pct) {
                return Err(SimError::InvalidParameter(format!(
                    "adversary connectivity must lie in [0, 100], got {}",
                    adv.connectivity_pct
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_tiny_population() {
        let cfg = SimConfig {
            population: 1,
            ..SimConfig::default()
        };
        assert!(cfg.validate().is_err());

        // Two participants with an adversary leaves a single honest peer.
        let cfg = SimConfig {
            population: 2,
            adversary: Some(AdversaryConfig {
                mode: AdversaryMode::Selfish,
                hashing_share: 0.3,
                connectivity_pct: 50.0,
            }),
            ..SimConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_fractions_and_intervals() {
        let mut cfg = SimConfig::default();
        cfg.slow_fraction = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = SimConfig::default();
        cfg.block_interval = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = SimConfig::default();
        cfg.tx_interarrival = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn infinite_ttx_is_allowed() {
        let cfg = SimConfig {
            tx_interarrival: f64::INFINITY,
            ..SimConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn adversary_share_bounds() {
        let mut cfg = SimConfig::default();
        cfg.adversary = Some(AdversaryConfig {
            mode: AdversaryMode::Stubborn,
            hashing_share: 1.0,
            connectivity_pct: 50.0,
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn toml_round_trip() {
        let cfg = SimConfig {
            population: 25,
            adversary: Some(AdversaryConfig {
                mode: AdversaryMode::Stubborn,
                hashing_share: 0.3,
                connectivity_pct: 50.0,
            }),
            ..SimConfig::default()
        };
        let text = toml::to_string(&cfg).unwrap();
        let back: SimConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.population, 25);
        assert_eq!(back.adversary.unwrap().mode, AdversaryMode::Stubborn);
    }
}
