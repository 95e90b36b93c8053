//! Storage Layer
//!
//! Platform directories for settings and the default fixture archive.

use anyhow::Result;
use std::path::PathBuf;

use crate::config::AppConfig;

/// File name of the default corpus archive
pub const DEFAULT_ARCHIVE_NAME: &str = "Test Data.tar.gz";

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "labelfixtures", "LabelFixtureStudio")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = project_dirs()?.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;

    Ok(data_dir)
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = project_dirs()?.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Archive to export into: the configured path, else one in the data directory
pub fn default_archive_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.corpus.archive_path {
        Some(path) => Ok(path.clone()),
        None => Ok(get_data_dir()?.join(DEFAULT_ARCHIVE_NAME)),
    }
}
