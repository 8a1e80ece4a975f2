use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::layout::CellSize;

/// Where data comes from. Exactly one of `base_url` / `fixture` is used;
/// a fixture wins when both are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: Option<String>,
    pub fixture: Option<PathBuf>,
    /// Artificial delay for fixture responses
    pub latency_ms: u64,
    /// Enrich detail records with an image lookup
    pub images: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub cell: CellSize,
    /// Depth from which subtrees start collapsed
    pub initial_depth: usize,
    pub side_panel_width: u16,
    pub search_width: u16,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            cell: CellSize::default(),
            initial_depth: 2,
            side_panel_width: 40,
            search_width: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeybindingConfig {
    pub quit: char,
    /// Opens search; Ctrl+K always works as well
    pub search: char,
    pub reroot: char,
    pub back: char,
    pub reset_view: char,
}

impl Default for KeybindingConfig {
    fn default() -> Self {
        Self {
            quit: 'q',
            search: '/',
            reroot: 't',
            back: 'b',
            reset_view: '0',
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub display: DisplayConfig,
    pub keys: KeybindingConfig,
}

impl Config {
    /// Load from a JSON file, or defaults when no path is given. Missing
    /// fields fall back to their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                let config = serde_json::from_str(&content)?;
                log::info!("config: loaded {}", path.display());
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
