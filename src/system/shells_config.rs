// src/system/shells_config.rs

use crate::{
    constants::{CONFIG_DIR_NAME, SHELLS_CONFIG_FILENAME},
    models::{ShellProfile, ShellsConfig},
};
use std::{
    collections::HashMap,
    env, fs,
    path::{MAIN_SEPARATOR, Path, PathBuf},
};
use thiserror::Error;

/// Shells looked up on `PATH` when `shells.toml` is generated.
const KNOWN_SHELLS: &[&str] = &["bash", "sh", "zsh"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not find the system config directory.")]
    ConfigDirNotFound,
    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse shells.toml: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize shells config to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Requested shell '{0}' is not defined in shells.toml.")]
    ShellNotDefined(String),
    #[error("Could not expand shell path '{path}': {message}")]
    Expansion { path: String, message: String },
}

/// Returns `<config dir>/pershell`, creating it if needed.
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join(CONFIG_DIR_NAME);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Loads `shells.toml` from the user's config directory, generating it on first use.
pub fn load_shells_config() -> Result<ShellsConfig, ConfigError> {
    let shells_path = get_config_dir()?.join(SHELLS_CONFIG_FILENAME);
    load_shells_config_from(&shells_path)
}

/// Loads the shells config at `shells_path`. If the file does not exist, a
/// default one is generated from the shells found on `PATH` and written there.
pub fn load_shells_config_from(shells_path: &Path) -> Result<ShellsConfig, ConfigError> {
    if !shells_path.exists() {
        let default_config = generate_default_shells_config();
        let toml_string = toml::to_string_pretty(&default_config)?;
        fs::write(shells_path, toml_string)?;
        log::debug!(
            "Generated default shells config at '{}'",
            shells_path.display()
        );
        Ok(default_config)
    } else {
        let content = fs::read_to_string(shells_path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// Resolves a `--shell` argument to an executable path.
///
/// Anything containing a path separator is taken as a path; anything else is
/// looked up as a profile name. `~` and environment variables are expanded
/// either way.
pub fn resolve_shell(config: &ShellsConfig, name_or_path: &str) -> Result<PathBuf, ConfigError> {
    if name_or_path.contains(MAIN_SEPARATOR) {
        return expand(name_or_path);
    }
    let profile = config
        .shells
        .get(name_or_path)
        .ok_or_else(|| ConfigError::ShellNotDefined(name_or_path.to_string()))?;
    expand(&profile.path.to_string_lossy())
}

fn expand(path: &str) -> Result<PathBuf, ConfigError> {
    shellexpand::full(path)
        .map(|expanded| PathBuf::from(expanded.into_owned()))
        .map_err(|e| ConfigError::Expansion {
            path: path.to_string(),
            message: e.to_string(),
        })
}

fn generate_default_shells_config() -> ShellsConfig {
    let shells: HashMap<String, ShellProfile> = KNOWN_SHELLS
        .iter()
        .filter_map(|name| {
            find_executable_in_path(name).map(|path| (name.to_string(), ShellProfile { path }))
        })
        .collect();
    ShellsConfig { shells }
}

fn find_executable_in_path(executable_name: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(executable_name))
        .find(|candidate| candidate.is_file())
}
