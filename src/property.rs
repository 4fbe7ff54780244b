use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::compactor;
use crate::engine::{Engine, EngineConfig};
use crate::limits::*;

/// Per-property engines. Each property gets its own Engine, journal and compactor.
pub struct PropertyManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    config: EngineConfig,
    compact_threshold: u64,
}

/// Keep only characters that are safe in a file name.
fn sanitize(property: &str) -> String {
    property
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

impl PropertyManager {
    pub fn new(data_dir: PathBuf, config: EngineConfig, compact_threshold: u64) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            config,
            compact_threshold,
        }
    }

    /// Map a property name onto its engine key. Names that sanitize to the
    /// same string share one journal, so they must share one engine too.
    fn property_key(property: &str) -> std::io::Result<String> {
        if property.len() > MAX_PROPERTY_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "property name too long",
            ));
        }
        let safe_name = sanitize(property);
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty property name",
            ));
        }
        Ok(safe_name)
    }

    pub fn journal_path(&self, property: &str) -> std::io::Result<PathBuf> {
        let key = Self::property_key(property)?;
        Ok(self.data_dir.join(format!("{key}.journal")))
    }

    /// Get or lazily load the engine for `property`.
    pub fn get_or_create(&self, property: &str) -> std::io::Result<Arc<Engine>> {
        let key = Self::property_key(property)?;
        if let Some(engine) = self.engines.get(&key) {
            return Ok(engine.value().clone());
        }
        if self.engines.len() >= MAX_PROPERTIES {
            return Err(std::io::Error::other("too many properties"));
        }
        let journal_path = self.data_dir.join(format!("{key}.journal"));

        // Entry lock so two callers can't load the same journal twice
        let entry = self.engines.entry(key.clone());
        let engine = match entry {
            Entry::Occupied(e) => return Ok(e.get().clone()),
            Entry::Vacant(v) => {
                let engine = Arc::new(Engine::new(journal_path, self.config.clone())?);
                v.insert(engine.clone());
                engine
            }
        };

        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            compactor::run_compactor(compactor_engine, threshold).await;
        });

        metrics::gauge!(crate::observability::PROPERTIES_ACTIVE).set(self.engines.len() as f64);
        tracing::info!(property = %key, "property loaded");
        Ok(engine)
    }
}
