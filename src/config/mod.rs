//! Application Configuration
//!
//! User settings stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::fixture::ExportOptions;
use crate::vision::PassKind;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,
    /// Detection pass settings
    #[serde(default)]
    pub detection: DetectionConfig,
    /// Duplicate image detection
    #[serde(default)]
    pub comparison: ComparisonConfig,
    /// Fixture corpus settings
    #[serde(default)]
    pub corpus: CorpusConfig,
}

impl AppConfig {
    /// Export options derived from the comparison and corpus sections
    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            tolerance_percent: self.comparison.tolerance_percent,
            skip_duplicate_images: self.comparison.skip_duplicate_images,
            image_extension_fallback: self.corpus.image_extension_fallback.clone(),
        }
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Detection pass settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Passes to run; always scheduled in canonical order
    pub passes: Vec<PassKind>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            passes: PassKind::ALL.to_vec(),
        }
    }
}

/// Duplicate image detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonConfig {
    /// Share of pixels (0-100) that may differ for two images to count as equal
    pub tolerance_percent: f32,
    /// Skip the export when the image is already in the corpus
    pub skip_duplicate_images: bool,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            tolerance_percent: 0.0,
            skip_duplicate_images: true,
        }
    }
}

/// Fixture corpus settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Archive to append to; defaults to one in the data directory
    pub archive_path: Option<PathBuf>,
    /// Image extension used when the format cannot be guessed
    pub image_extension_fallback: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            archive_path: None,
            image_extension_fallback: "jpg".to_string(),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
