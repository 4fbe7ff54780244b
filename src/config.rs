use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::{EngineConfig, EngineError};
use crate::model::{ActiveSet, Minor};
use crate::tax::{RateTable, TaxEngine};

/// Process settings, read from `BEDPULSE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// JSON rate table replacing the built-in one.
    pub tax_rates: Option<PathBuf>,
    pub default_tax_rate: Option<Minor>,
    pub active_states: String,
    pub compact_threshold: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            tax_rates: None,
            default_tax_rate: None,
            active_states: "pending,confirmed,checked_in".into(),
            compact_threshold: 1000,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("BEDPULSE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: lookup("BEDPULSE_METRICS_PORT").and_then(|s| s.parse().ok()),
            tax_rates: lookup("BEDPULSE_TAX_RATES").map(PathBuf::from),
            default_tax_rate: lookup("BEDPULSE_DEFAULT_TAX_RATE").and_then(|s| s.parse().ok()),
            active_states: lookup("BEDPULSE_ACTIVE_STATES").unwrap_or(defaults.active_states),
            compact_threshold: lookup("BEDPULSE_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
        }
    }

    /// Resolve the engine configuration, loading the rate table if one is configured.
    pub fn engine_config(&self) -> Result<EngineConfig, EngineError> {
        let active = ActiveSet::parse(&self.active_states)?;
        let table = match &self.tax_rates {
            Some(path) => RateTable::load(path)?,
            None => RateTable::builtin(),
        };
        let mut tax = TaxEngine::new(table);
        if let Some(rate) = self.default_tax_rate {
            tax = tax.with_default_rate(rate)?;
        }
        Ok(EngineConfig {
            active,
            tax: Arc::new(tax),
        })
    }
}
