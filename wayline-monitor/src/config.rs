//! Navigation settings persistence
//!
//! Settings path: `--config <path>`, else `settings.json` in the project
//! config directory (`~/.config/wayline/settings.json` on Linux).

use directories::ProjectDirs;
use log::{debug, info, warn};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use wayline_core::NavigationSettings;

use crate::MonitorError;

const SETTINGS_FILE: &str = "settings.json";

pub fn get_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "wayline", "wayline")
}

/// Settings file to use, `None` when no explicit path was given and the
/// platform has no config directory
pub fn settings_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| get_project_dirs().map(|dirs| dirs.config_dir().join(SETTINGS_FILE)))
}

/// Load settings, falling back to defaults when the file is missing or
/// can't be parsed
pub fn load_settings(path: &Path) -> NavigationSettings {
    if !path.exists() {
        debug!("No settings at {}, using defaults", path.display());
        return NavigationSettings::default();
    }

    match fs::File::open(path) {
        Ok(file) => match serde_json::from_reader(BufReader::new(file)) {
            Ok(settings) => {
                info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("Failed to parse settings {}: {}, using defaults", path.display(), e);
                NavigationSettings::default()
            }
        },
        Err(e) => {
            warn!("Failed to open settings {}: {}, using defaults", path.display(), e);
            NavigationSettings::default()
        }
    }
}

pub fn save_settings(path: &Path, settings: &NavigationSettings) -> Result<(), MonitorError> {
    let io_error = |source| MonitorError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(io_error)?;
    }
    let file = fs::File::create(path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, settings)?;
    writer.flush().map_err(io_error)?;

    info!("Saved settings to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wayline_core::{EtaCalculationMode, PartialRouteFilter};

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = load_settings(&dir.path().join("nope.json"));
        assert_eq!(settings, NavigationSettings::default());
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_settings(&path), NavigationSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);

        let settings = NavigationSettings {
            min_waypoint_radius: 0.35,
            relaxed_waypoint_change: false,
            eta_calculation_mode: EtaCalculationMode::Dynamic,
            partial_route_filter: PartialRouteFilter::by_duration(120, 10),
            ..Default::default()
        };
        save_settings(&path, &settings).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"etaCalculationMode\": \"dynamic\""));
        assert_eq!(load_settings(&path), settings);
    }

    #[test]
    fn test_explicit_path_wins() {
        let explicit = Path::new("/tmp/wayline-test.json");
        assert_eq!(settings_path(Some(explicit)), Some(explicit.to_path_buf()));
    }
}
