use crate::config::Config;
use crate::utils::get_hostbridge_home;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variables that override config values, applied after the file is read.
const ENV_OVERRIDES: &[&str] = &[
    "HOSTBRIDGE_API_KEY",
    "HOSTBRIDGE_API_BASE",
    "HOSTBRIDGE_WEBHOOK_URL",
];

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_hostbridge_home()?.join("config.json"))
}

/// Load `config.json` (or defaults when absent), apply environment overrides, validate.
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    let mut config = if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        check_file_permissions(path);
        serde_json::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse config JSON from {}", path.display()))?
    } else {
        debug!("no config at {}, using defaults", path.display());
        Config::default()
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok());

    config
        .validate()
        .with_context(|| "Configuration validation failed")?;
    Ok(config)
}

/// Apply overrides from `lookup`. Empty values are ignored.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    for key in ENV_OVERRIDES {
        let Some(value) = lookup(key).filter(|v| !v.is_empty()) else {
            continue;
        };
        debug!("config override from {}", key);
        match *key {
            "HOSTBRIDGE_API_KEY" => config.provider.api_key = value,
            "HOSTBRIDGE_API_BASE" => config.provider.api_base = value,
            "HOSTBRIDGE_WEBHOOK_URL" => config.channels.webhook_url = Some(value),
            _ => {}
        }
    }
}

/// Warn once if the config file is readable by other users; it may hold an API key.
#[cfg(unix)]
fn check_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Once;

    static WARNED: Once = Once::new();
    WARNED.call_once(|| {
        if let Ok(meta) = fs::metadata(path) {
            let mode = meta.permissions().mode();
            if mode & 0o077 != 0 {
                warn!(
                    "config file {} has permissions {:o}, recommend 0600",
                    path.display(),
                    mode & 0o777
                );
            }
        }
    });
}

#[cfg(not(unix))]
fn check_file_permissions(_path: &Path) {}
