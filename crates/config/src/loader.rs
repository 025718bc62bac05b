use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::HotlineConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "hotline.toml",
    "hotline.yaml",
    "hotline.yml",
    "hotline.json",
];

/// Override for the config directory, set via `set_config_dir()`.
static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

fn override_slot() -> MutexGuard<'static, Option<PathBuf>> {
    CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Restrict config discovery to `path`. Project-local and user-global
/// locations are skipped while an override is set.
pub fn set_config_dir(path: PathBuf) {
    *override_slot() = Some(path);
}

fn config_dir_override() -> Option<PathBuf> {
    override_slot().clone()
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<HotlineConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    parse_config(&substitute_env(&raw), path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./hotline.{toml,yaml,yml,json}`
/// 2. `~/.config/hotline/hotline.{toml,yaml,yml,json}`
///
/// When nothing is found the defaults are written to the user config dir and
/// returned. A file that fails to parse is reported and replaced by defaults
/// for this run only.
pub fn discover_and_load() -> HotlineConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, writing default config");
        let config = HotlineConfig::default();
        if let Err(e) = write_default_config(&config) {
            warn!(error = %e, "failed to write default config file");
        }
        return config;
    };

    debug!(path = %path.display(), "loading config");
    load_config(&path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
        HotlineConfig::default()
    })
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        return find_in(&dir);
    }

    find_in(Path::new(".")).or_else(|| find_in(&user_config_dir()?))
}

fn user_config_dir() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".config").join("hotline"))
}

/// Returns the config directory: override, or `~/.config/hotline/`.
pub fn config_dir() -> Option<PathBuf> {
    config_dir_override().or_else(user_config_dir)
}

/// Returns the data directory: `~/.hotline/`.
pub fn data_dir() -> PathBuf {
    home_dir()
        .map(|h| h.join(".hotline"))
        .unwrap_or_else(|| PathBuf::from(".hotline"))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    find_config_file().unwrap_or_else(|| {
        config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hotline.toml")
    })
}

fn write_default_config(config: &HotlineConfig) -> anyhow::Result<()> {
    let path = find_or_default_config_path();
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serialize config: {e}"))?;
    std::fs::write(&path, toml_str)?;
    debug!(path = %path.display(), "wrote default config file");
    Ok(())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<HotlineConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
