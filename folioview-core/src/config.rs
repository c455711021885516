use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Rendered pages stay resident until the document closes.
    #[default]
    Never,
    /// Pages leaving the buffer window drop their raster and text layer.
    OutsideWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Upper bound for the layout width handed to a page, in css pixels.
    pub max_page_width: f64,
    /// Buffer margin above and below the visible area, in viewport heights.
    pub buffer_ratio: f64,
    /// Vertical gap between stacked pages, in css pixels.
    pub page_gap: f64,
    pub scroll_debounce_ms: u64,
    pub current_page_tolerance: f64,
    pub min_fragment_width: f64,
    pub min_fragment_height: f64,
    pub min_region_size: f64,
    pub eviction: EvictionPolicy,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            max_page_width: 1200.0,
            buffer_ratio: 2.0,
            page_gap: 16.0,
            scroll_debounce_ms: 150,
            current_page_tolerance: 100.0,
            min_fragment_width: 1.0,
            min_fragment_height: 1.0,
            min_region_size: 3.0,
            eviction: EvictionPolicy::Never,
        }
    }
}

impl ViewerConfig {
    pub fn scroll_debounce(&self) -> Duration {
        Duration::from_millis(self.scroll_debounce_ms)
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).context("failed to parse viewer configuration")
    }

    /// Reads the configuration file if it exists; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml_str(&source).with_context(|| format!("invalid config file {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_toml_keeps_defaults_for_missing_keys() {
        let config = ViewerConfig::from_toml_str(
            "buffer_ratio = 1.5\neviction = \"outside-window\"\n",
        )
        .unwrap();
        assert_eq!(config.buffer_ratio, 1.5);
        assert_eq!(config.eviction, EvictionPolicy::OutsideWindow);
        assert_eq!(config.scroll_debounce(), Duration::from_millis(150));
        assert_eq!(config.max_page_width, 1200.0);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = ViewerConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "buffer_ratio = [").unwrap();
        assert!(ViewerConfig::load(&path).is_err());
    }
}
