//! Engine configuration.
//!
//! Loaded with precedence: env vars > config file > defaults.
//!
//! # Example config file (varledger.toml)
//! ```toml
//! [storage]
//! path = "/var/lib/varledger/ledger.db"
//! busy_timeout_ms = 10000
//!
//! [reconcile]
//! verify_hashes = true
//! ```
//!
//! Environment variables use the `VARLEDGER_` prefix and `__` between
//! sections, e.g. `VARLEDGER_STORAGE__BUSY_TIMEOUT_MS=2000`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use varledger_core::ids::Accession;

use crate::error::EngineError;

pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
pub const ENV_PREFIX: &str = "VARLEDGER_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub reconcile: ReconcileConfig,
}

impl EngineConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self, EngineError> {
        let mut figment = Figment::new().merge(Serialized::defaults(EngineConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: EngineConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.storage.busy_timeout_ms == 0 {
            return Err(EngineError::Config(
                "storage.busy_timeout_ms must be greater than zero".into(),
            ));
        }
        for (name, template) in [
            ("merge_reason", &self.reconcile.merge_reason),
            ("redundant_reason", &self.reconcile.redundant_reason),
            ("rewrite_reason", &self.reconcile.rewrite_reason),
            ("update_reason", &self.reconcile.update_reason),
        ] {
            if template.trim().is_empty() {
                return Err(EngineError::Config(format!("reconcile.{name} is empty")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Database file. `None` keeps the ledger in memory.
    pub path: Option<PathBuf>,
    /// How long a write waits on a locked database before giving up.
    pub busy_timeout_ms: u64,
}

impl StorageConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Reason templates accept `{from}` and `{into}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileConfig {
    /// Recompute each incoming content hash and reject units that disagree.
    pub verify_hashes: bool,
    /// Group that lost its hash to an earlier accession.
    pub merge_reason: String,
    /// Member whose content is already held by another accession.
    pub redundant_reason: String,
    /// Member relinked because its group was merged.
    pub rewrite_reason: String,
    /// Member whose flags or link changed in place.
    pub update_reason: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            verify_hashes: true,
            merge_reason: "Identical clustered variant {from} merged into {into}".into(),
            redundant_reason: "Submitted variant {from} is redundant with {into}".into(),
            rewrite_reason: "Original {from} was merged into {into}".into(),
            update_reason: "Submitted variant {from} updated".into(),
        }
    }
}

/// Fills `{from}` and `{into}` in a reason template.
pub fn render_reason(template: &str, prefix: &str, from: Accession, into: Option<Accession>) -> String {
    let rendered = template.replace("{from}", &format!("{prefix}{from}"));
    match into {
        Some(into) => rendered.replace("{into}", &format!("{prefix}{into}")),
        None => rendered,
    }
}
