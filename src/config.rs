use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::dispatch::{Dispatcher, PermissiveDispatcher, StrictDispatcher};

pub const TARGET_RELEASE_ENV: &str = "JARSCOPE_TARGET_RELEASE";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    /// Only `.class` names are decoded.
    Strict,
    /// Every non-archive entry is a candidate; the magic number decides.
    #[default]
    Permissive,
}

impl Tolerance {
    pub fn dispatcher(self) -> Box<dyn Dispatcher> {
        match self {
            Tolerance::Strict => Box::new(StrictDispatcher),
            Tolerance::Permissive => Box::new(PermissiveDispatcher),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Each session is reconciled against the previous one; classes that
    /// disappear are reported as removed.
    #[default]
    Closed,
    /// Sessions accumulate; nothing is removed and skipped files are
    /// re-announced from the last decoded descriptor.
    Open,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub tolerance: Tolerance,
    /// Release used to pick multi-release JAR entries. `None` picks the
    /// newest version present.
    pub target_release: Option<u16>,
    /// File name suffixes kept when walking directories; empty keeps all.
    pub directory_suffixes: Vec<String>,
    /// Decode the class files of one archive level on the rayon pool.
    pub parallel_decode: bool,
}

impl LoaderConfig {
    pub fn strict() -> Self {
        Self {
            tolerance: Tolerance::Strict,
            ..Self::default()
        }
    }

    pub fn permissive() -> Self {
        Self::default()
    }

    pub fn with_target_release(mut self, release: Option<u16>) -> Self {
        self.target_release = release;
        self
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read loader config: {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("Failed to parse loader config: {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Explicit value, then `JARSCOPE_TARGET_RELEASE`, then the configured
    /// default.
    pub fn resolve_target_release(&self, explicit: Option<u16>) -> Result<Option<u16>> {
        if explicit.is_some() {
            return Ok(explicit);
        }
        if let Ok(raw) = env::var(TARGET_RELEASE_ENV) {
            return parse_release(&raw)
                .map(Some)
                .with_context(|| format!("Invalid {TARGET_RELEASE_ENV}: {raw:?}"));
        }
        Ok(self.target_release)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub session_mode: SessionMode,
}

impl MonitorConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read monitor config: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse monitor config: {}", path.display()))
    }
}

pub fn parse_release(raw: &str) -> Result<u16> {
    let release: u16 = raw.trim().parse()?;
    anyhow::ensure!(release >= 1, "release must be positive");
    Ok(release)
}
