//! Layered settings loading.
//!
//! Layers, lowest priority first:
//! 1. compiled [`PomoSettings::default()`]
//! 2. the JSON settings file, deep-merged key by key
//! 3. `POMOSYNC_*` environment variables
//!
//! When merging the file, nested objects combine recursively, arrays and
//! scalars replace, and `null` leaves the lower layer untouched.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{IdentityBackend, PomoSettings};

/// Accepted range for `POMOSYNC_PORT`.
const PORT_RANGE: RangeInclusive<u16> = 1..=u16::MAX;
/// Accepted range for `POMOSYNC_MAX_CONNECTIONS`.
const MAX_CONNECTIONS_RANGE: RangeInclusive<usize> = 1..=1_000_000;

/// `~/.pomosync/settings.json`, falling back to `/tmp` without `HOME`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
    home.join(".pomosync").join("settings.json")
}

/// Load from [`settings_path`] with environment overrides.
pub fn load_settings() -> Result<PomoSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` with environment overrides, then validate.
///
/// A missing file is not an error; the defaults are used.
pub fn load_settings_from_path(path: &Path) -> Result<PomoSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults with the file at `path` merged over them. No env, no validation.
pub fn load_file_layer(path: &Path) -> Result<PomoSettings> {
    let parse_error = |source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    };

    let mut layered = serde_json::to_value(PomoSettings::default()).map_err(parse_error)?;
    if path.exists() {
        debug!(path = %path.display(), "reading settings file");
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: Value = serde_json::from_str(&raw).map_err(parse_error)?;
        layered = deep_merge(layered, file);
    } else {
        debug!(path = %path.display(), "no settings file, using defaults");
    }
    serde_json::from_value(layered).map_err(parse_error)
}

/// Merge `overlay` into `base`; see the module docs for the rules.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut merged), Value::Object(overlay)) => {
            for (key, value) in overlay.into_iter().filter(|(_, v)| !v.is_null()) {
                let combined = match merged.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = merged.insert(key, combined);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay,
    }
}

/// Apply `POMOSYNC_*` variables from the process environment.
pub fn apply_env_overrides(settings: &mut PomoSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// | Variable                   | Field                                   |
/// |----------------------------|-----------------------------------------|
/// | `POMOSYNC_HOST`            | `server.host`                           |
/// | `POMOSYNC_PORT`            | `server.port`                           |
/// | `POMOSYNC_MAX_CONNECTIONS` | `server.maxConnections`                 |
/// | `POMOSYNC_LOG_LEVEL`       | `logging.level`                         |
/// | `POMOSYNC_LOG_JSON`        | `logging.json`                          |
/// | `POMOSYNC_IDENTITY_URL`    | `identity.baseUrl`, selects `http`      |
///
/// Empty strings are treated as unset. Unparsable values are logged and
/// skipped.
pub fn apply_overrides_from<F>(settings: &mut PomoSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(host) = var("POMOSYNC_HOST") {
        settings.server.host = host;
    }
    if let Some(port) = var("POMOSYNC_PORT").and_then(|v| checked("POMOSYNC_PORT", &v, parse_in_range(&v, PORT_RANGE))) {
        settings.server.port = port;
    }
    if let Some(max) = var("POMOSYNC_MAX_CONNECTIONS").and_then(|v| {
        checked("POMOSYNC_MAX_CONNECTIONS", &v, parse_in_range(&v, MAX_CONNECTIONS_RANGE))
    }) {
        settings.server.max_connections = max;
    }
    if let Some(level) = var("POMOSYNC_LOG_LEVEL") {
        settings.logging.level = level;
    }
    if let Some(json) = var("POMOSYNC_LOG_JSON").and_then(|v| checked("POMOSYNC_LOG_JSON", &v, parse_bool(&v))) {
        settings.logging.json = json;
    }
    if let Some(url) = var("POMOSYNC_IDENTITY_URL") {
        settings.identity.base_url = Some(url);
        settings.identity.backend = IdentityBackend::Http;
    }
}

fn checked<T>(name: &str, raw: &str, parsed: Option<T>) -> Option<T> {
    if parsed.is_none() {
        warn!(key = name, value = raw, "ignoring invalid environment override");
    }
    parsed
}

/// `true/yes/on/1` or `false/no/off/0`, any case.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse `raw` and keep it only if it falls inside `range`.
pub fn parse_in_range<T>(raw: &str, range: RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    raw.trim().parse().ok().filter(|n| range.contains(n))
}
