use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use super::core::NarrowscopeConfig;
use crate::core::{Error, Result};

pub const CONFIG_FILE_NAME: &str = ".narrowscope.toml";

/// Pure function to read config file contents
pub(crate) fn read_config_file(path: &Path) -> std::result::Result<String, std::io::Error> {
    let file = fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut contents = String::new();
    reader.read_to_string(&mut contents)?;
    Ok(contents)
}

/// Pure function to parse and validate config from TOML string
pub fn parse_and_validate_config(contents: &str) -> Result<NarrowscopeConfig> {
    let config = toml::from_str::<NarrowscopeConfig>(contents).map_err(|e| {
        Error::Configuration(format!("Failed to parse {}: {}", CONFIG_FILE_NAME, e))
    })?;

    // Patterns are compiled again by the risk policy; reject bad ones early
    for pattern in &config.risk.patterns {
        regex::Regex::new(pattern)?;
    }

    if let Some(format) = config.output.as_ref().and_then(|o| o.format.as_deref()) {
        if !matches!(format, "terminal" | "json") {
            return Err(Error::Configuration(format!(
                "Unknown output format `{}` (expected terminal or json)",
                format
            )));
        }
    }

    Ok(config)
}

/// Pure function to try loading config from a specific path
pub(crate) fn try_load_config_from_path(config_path: &Path) -> Option<NarrowscopeConfig> {
    let contents = match read_config_file(config_path) {
        Ok(contents) => contents,
        Err(e) => {
            handle_read_error(config_path, &e);
            return None;
        }
    };

    match parse_and_validate_config(&contents) {
        Ok(config) => {
            log::debug!("Loaded config from {}", config_path.display());
            Some(config)
        }
        Err(e) => {
            log::warn!("{}. Using defaults.", e);
            None
        }
    }
}

/// Handle file read errors with appropriate logging
pub(crate) fn handle_read_error(config_path: &Path, error: &std::io::Error) {
    // Only log actual errors, not "file not found"
    if error.kind() != std::io::ErrorKind::NotFound {
        log::warn!(
            "Failed to read config file {}: {}",
            config_path.display(),
            error
        );
    }
}

/// Pure function to generate directory ancestors up to a depth limit
pub fn directory_ancestors(start: PathBuf, max_depth: usize) -> impl Iterator<Item = PathBuf> {
    std::iter::successors(Some(start), |dir| {
        let mut parent = dir.clone();
        if parent.pop() {
            Some(parent)
        } else {
            None
        }
    })
    .take(max_depth)
}

/// Load an explicitly named config file, failing loudly if it is unusable.
pub fn load_config_from(path: &Path) -> Result<NarrowscopeConfig> {
    let contents = read_config_file(path).map_err(|e| Error::FileSystem {
        message: format!("Failed to read config file {}", path.display()),
        path: Some(path.to_path_buf()),
        source: Some(e),
    })?;
    parse_and_validate_config(&contents)
}

pub fn load_config() -> NarrowscopeConfig {
    const MAX_TRAVERSAL_DEPTH: usize = 10;

    let current = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            log::warn!(
                "Failed to get current directory: {}. Using default config.",
                e
            );
            return NarrowscopeConfig::default();
        }
    };

    directory_ancestors(current, MAX_TRAVERSAL_DEPTH)
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find_map(|path| try_load_config_from_path(&path))
        .unwrap_or_else(|| {
            log::debug!(
                "No config found after checking {} directories. Using default config.",
                MAX_TRAVERSAL_DEPTH
            );
            NarrowscopeConfig::default()
        })
}

/// Default configuration file contents written by `narrowscope init`.
pub fn default_config_toml() -> String {
    let template = NarrowscopeConfig {
        output: Some(super::core::OutputConfig {
            format: Some("terminal".into()),
        }),
        ..NarrowscopeConfig::default()
    };
    toml::to_string_pretty(&template).unwrap_or_default()
}
