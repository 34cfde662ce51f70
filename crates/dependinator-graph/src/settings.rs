use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub layout: LayoutSettings,
    pub refresh: RefreshSettings,
    pub snapshot: SnapshotSettings,
    pub tiles: TileSettings,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            layout: LayoutSettings::default(),
            refresh: RefreshSettings::default(),
            snapshot: SnapshotSettings::default(),
            tiles: TileSettings::default(),
        }
    }
}

impl ModelSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings {}", path.display()))?;
        let settings = serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Default placement of nodes that arrive without an explicit boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    pub root_width: f64,
    pub root_height: f64,
    pub node_width: f64,
    pub node_height: f64,
    pub margin: f64,
    /// Scale of a new node's children relative to the node itself.
    pub container_zoom: f64,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            root_width: 1000.0,
            root_height: 1000.0,
            node_width: 200.0,
            node_height: 100.0,
            margin: 40.0,
            container_zoom: 1.0 / 7.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSettings {
    /// Parsed items applied per model lock acquisition.
    pub batch_size: usize,
    /// Capacity of the bounded parser queue, in batches.
    pub queue_capacity: usize,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            queue_capacity: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    /// Entities copied per model lock acquisition.
    pub batch_size: usize,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_attempts: 5,
            retry_delay_ms: 50,
        }
    }
}

impl SnapshotSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileSettings {
    pub tile_size: f64,
    /// Zoom ratio between two consecutive tile levels.
    pub level_factor: f64,
}

impl Default for TileSettings {
    fn default() -> Self {
        Self {
            tile_size: 512.0,
            level_factor: 7.0,
        }
    }
}
