use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::limits::MAX_TAX_RATE;
use crate::model::Minor;

/// Municipal per-guest per-night rates in minor units, keyed by normalized name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    /// Applied to municipalities missing from `rates`.
    pub default: Minor,
    pub rates: BTreeMap<String, Minor>,
}

/// 2025 municipal rates.
const BUILTIN_RATES: &[(&str, Minor)] = &[
    ("lisbon", 400),
    ("lisboa", 400),
    ("cascais", 300),
    ("oeiras", 300),
    ("sintra", 300),
    ("porto", 200),
    ("vila_nova_de_gaia", 200),
    ("matosinhos", 200),
    ("faro", 200),
    ("albufeira", 200),
    ("lagoa", 200),
    ("lagos", 200),
    ("algarve", 200),
    ("funchal", 200),
    ("calheta", 200),
    ("madeira", 200),
    ("ponta_delgada", 200),
    ("ribeira_grande", 200),
    ("angra_do_heroismo", 200),
    ("coimbra", 150),
    ("evora", 150),
    ("obidos", 200),
    ("setubal", 150),
    ("aveiro", 150),
];

const REGIONS: &[(&str, &[&str])] = &[
    ("Lisbon", &["lisbon", "lisboa", "cascais", "oeiras", "sintra"]),
    ("Porto", &["porto", "vila_nova_de_gaia", "matosinhos"]),
    ("Algarve", &["faro", "albufeira", "lagoa", "lagos", "algarve"]),
    ("Madeira", &["funchal", "calheta", "madeira"]),
    ("Azores", &["ponta_delgada", "ribeira_grande", "angra_do_heroismo"]),
    ("Center", &["coimbra", "evora", "obidos", "setubal", "aveiro"]),
];

pub const BUILTIN_DEFAULT_RATE: Minor = 200;

impl Default for RateTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RateTable {
    pub fn builtin() -> Self {
        Self {
            default: BUILTIN_DEFAULT_RATE,
            rates: BUILTIN_RATES
                .iter()
                .map(|(name, rate)| (name.to_string(), *rate))
                .collect(),
        }
    }

    /// Load `{"default": 200, "rates": {"lisbon": 400, ...}}`. Keys are normalized on load.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let raw: RateTable = serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("invalid rate table: {e}")))?;
        check_rate(raw.default)?;
        for rate in raw.rates.values() {
            check_rate(*rate)?;
        }
        Ok(Self {
            default: raw.default,
            rates: raw
                .rates
                .into_iter()
                .map(|(name, rate)| (normalize(&name), rate))
                .collect(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// `Some(rate)` for a known municipality.
    pub fn get(&self, municipality: &str) -> Option<Minor> {
        self.rates.get(&normalize(municipality)).copied()
    }
}

/// Rates must lie in `0..=MAX_TAX_RATE`.
pub fn check_rate(rate: Minor) -> Result<Minor, EngineError> {
    if rate < 0 {
        return Err(EngineError::Config("tax rates must not be negative".into()));
    }
    if rate > MAX_TAX_RATE {
        return Err(EngineError::Config(format!(
            "tax rate {rate} exceeds the maximum of {MAX_TAX_RATE}"
        )));
    }
    Ok(rate)
}

/// Lowercase, whitespace runs become underscores.
pub fn normalize(municipality: &str) -> String {
    municipality
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

pub fn display_name(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn region(key: &str) -> &'static str {
    REGIONS
        .iter()
        .find(|(_, members)| members.contains(&key))
        .map_or("Other", |(region, _)| region)
}
