use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::reader::{DEFAULT_PREFETCH_CONCURRENCY, DEFAULT_PREFETCH_RADIUS, MAX_CACHED_PAGES};
use crate::reader::{ReaderConfig, Zoom};
use crate::retry::RetryPolicy;

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "folio";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Document opened when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_path: Option<PathBuf>,

    /// Where progress, bookmarks and cached pages are kept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_max_cached_pages")]
    pub max_cached_pages: usize,

    #[serde(default = "default_prefetch_radius")]
    pub prefetch_radius: u32,

    #[serde(default = "default_prefetch_concurrency")]
    pub prefetch_concurrency: usize,

    #[serde(default = "default_zoom")]
    pub default_zoom: f32,

    #[serde(default = "default_device_pixel_ratio")]
    pub device_pixel_ratio: f32,

    #[serde(default = "RetryPolicy::document_open")]
    pub open_retry: RetryPolicy,

    #[serde(default = "RetryPolicy::remote_sync")]
    pub sync_retry: RetryPolicy,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_max_cached_pages() -> usize {
    MAX_CACHED_PAGES
}

fn default_prefetch_radius() -> u32 {
    DEFAULT_PREFETCH_RADIUS
}

fn default_prefetch_concurrency() -> usize {
    DEFAULT_PREFETCH_CONCURRENCY
}

fn default_zoom() -> f32 {
    1.0
}

fn default_device_pixel_ratio() -> f32 {
    1.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            document_path: None,
            data_dir: None,
            max_cached_pages: default_max_cached_pages(),
            prefetch_radius: default_prefetch_radius(),
            prefetch_concurrency: default_prefetch_concurrency(),
            default_zoom: default_zoom(),
            device_pixel_ratio: default_device_pixel_ratio(),
            open_retry: RetryPolicy::document_open(),
            sync_retry: RetryPolicy::remote_sync(),
        }
    }
}

/// `<config dir>/folio/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// `<data dir>/folio`
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|data| data.join(APP_NAME))
}

impl Settings {
    /// Load from `path`. A missing file yields defaults and is created.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            info!("Settings file not found, creating with defaults at {path:?}");
            let settings = Self::default();
            settings.save_to(path)?;
            return Ok(settings);
        }

        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: Self =
            serde_yaml::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Loaded settings from {path:?}");

        if settings.version < CURRENT_VERSION {
            migrate_settings(&mut settings);
            settings.save_to(path)?;
        }
        settings.sanitize();
        Ok(settings)
    }

    /// Load settings, falling back to defaults on any error
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
            warn!("Could not determine config directory, using default settings");
            return Self::default();
        };
        Self::load_from(&path).unwrap_or_else(|e| {
            warn!("{e}; using default settings");
            Self::default()
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Saved settings to {path:?}");
        Ok(())
    }

    fn sanitize(&mut self) {
        if self.max_cached_pages == 0 {
            warn!("max_cached_pages must be at least 1");
            self.max_cached_pages = 1;
        }
        let zoom = Zoom::clamp_factor(self.default_zoom);
        if (zoom - self.default_zoom).abs() > f32::EPSILON {
            warn!("default_zoom {} clamped to {zoom}", self.default_zoom);
            self.default_zoom = zoom;
        }
    }

    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            max_cached_pages: self.max_cached_pages,
            prefetch_radius: self.prefetch_radius,
            prefetch_concurrency: self.prefetch_concurrency,
            default_zoom: self.default_zoom,
            device_pixel_ratio: self.device_pixel_ratio,
            open_retry: self.open_retry,
            sync_retry: self.sync_retry,
        }
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );
    settings.version = CURRENT_VERSION;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILENAME);

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(path.exists());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(
            &path,
            "version: 1\nprefetch_radius: 4\nsync_retry:\n  max_attempts: 5\n",
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.prefetch_radius, 4);
        assert_eq!(settings.max_cached_pages, 50);
        assert_eq!(settings.sync_retry.max_attempts, 5);
        assert_eq!(settings.sync_retry.multiplier, 2.0);
    }

    #[test]
    fn old_version_is_migrated_and_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "version: 0\ndefault_zoom: 9.0\nmax_cached_pages: 0\n").unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.version, CURRENT_VERSION);
        assert_eq!(settings.default_zoom, Zoom::MAX_SCALE);
        assert_eq!(settings.max_cached_pages, 1);

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("version: 1"));
    }

    #[test]
    fn garbage_is_an_error_and_load_or_default_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "prefetch_radius: [not a number").unwrap();

        assert!(matches!(
            Settings::load_from(&path),
            Err(SettingsError::Parse { .. })
        ));
        assert_eq!(Settings::load_or_default(Some(&path)), Settings::default());
    }
}
