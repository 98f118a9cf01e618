//! Portfolio persistence
//!
//! The snapshot is plain serde data so any backend can store it. The
//! shipped [`JsonFileStore`] writes atomically (temp file + rename) and
//! treats a missing or corrupt file as "no snapshot" so startup never
//! fails on bad state.

use crate::accounting::PaperPosition;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// JSON-serializable portfolio state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// Per-asset totals
    pub balances: HashMap<String, Decimal>,
    /// Per-asset reservations
    #[serde(default)]
    pub reserved: HashMap<String, Decimal>,
    /// Positions by instrument key
    #[serde(default)]
    pub positions: HashMap<String, PaperPosition>,
    /// Last funding application per instrument key
    #[serde(default)]
    pub funding_timestamps: HashMap<String, DateTime<Utc>>,
    /// Peak equity seen before the snapshot
    #[serde(default)]
    pub peak_equity: Decimal,
}

/// Pluggable snapshot backend
pub trait StateStore {
    /// Load the last snapshot; `None` when absent or unreadable
    fn load(&self) -> anyhow::Result<Option<PortfolioSnapshot>>;
    /// Persist a snapshot
    fn save(&mut self, snapshot: &PortfolioSnapshot) -> anyhow::Result<()>;
}

/// File-backed JSON snapshot store
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store writing to the given path
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> anyhow::Result<Option<PortfolioSnapshot>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Corrupt snapshot ignored, starting from empty state"
                );
                Ok(None)
            }
        }
    }

    fn save(&mut self, snapshot: &PortfolioSnapshot) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
