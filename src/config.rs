//! Config file loading and validation. Search order: `--config` path, then ./listscrape.toml, then
//! $XDG_CONFIG_HOME/listscrape/config.toml (or ~/.config/listscrape/config.toml).
//!
//! Targets are validated here into [Target]s; the pipeline never sees an ill-formed target.

use crate::extract::{Css, SelectorError, SelectorSpec};
use crate::fetch::RetryPolicy;
use crate::model::{FieldSpecs, Target, TargetMode};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "listscrape.toml";

const DEFAULT_TIMEOUT_SECS: f64 = 10.0;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Config errors. All map to the config-contract exit status.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No config file found. Pass --config or create ./{CONFIG_FILE_NAME}.")]
    NotFound,

    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Config must contain a non-empty [[targets]] list.")]
    NoTargets,

    #[error("Target at index {index}: {message}")]
    InvalidTarget { index: usize, message: String },

    #[error("Duplicate target name '{name}'.")]
    DuplicateTarget { name: String },

    #[error("Invalid setting {key}: {message}")]
    InvalidSetting { key: &'static str, message: String },

    #[error("No target named '{name}' in config. Available: {available}.")]
    UnknownTarget { name: String, available: String },
}

/// Config file contents. All sections optional except `targets`, which is checked at validation.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    pub http: HttpConfig,
    pub validation: ValidationConfig,
    pub logging: LoggingConfig,
    pub output: OutputConfig,
    pub targets: Vec<TargetConfig>,
}

/// `[http]`: fetcher and politeness settings. Durations are in seconds.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct HttpConfig {
    /// Per-request timeout (default 10).
    pub timeout_secs: Option<f64>,
    /// Total attempts per fetch, including the first (default 3).
    #[serde(alias = "max_retries")]
    pub max_attempts: Option<u32>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// First retry delay; 0 disables backoff (default 0).
    pub backoff_initial_secs: Option<f64>,
    /// Growth factor per retry (default 2).
    pub backoff_multiplier: Option<f64>,
    /// Random extra delay bound added to each backoff (default 0).
    pub jitter_max_secs: Option<f64>,
    /// Delay between successive detail-page fetches (default 0).
    #[serde(alias = "delay_seconds")]
    pub delay_secs: Option<f64>,
}

/// `[validation]`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ValidationConfig {
    /// Print the quality report after a run (default true).
    pub enabled: Option<bool>,
}

/// `[logging]`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, or error. Unknown values fall back to info.
    pub level: Option<String>,
}

/// `[output]`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct OutputConfig {
    /// Directory for derived output paths when -o is not set. Relative to CWD.
    pub dir: Option<PathBuf>,
}

/// One `[[targets]]` entry as written. Mode is decided by which keys are present.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct TargetConfig {
    pub name: Option<String>,
    pub list_url: Option<String>,
    pub item_selector: Option<String>,
    pub item_fields: Option<FieldTable>,
    pub link_selector: Option<String>,
    pub detail_selectors: Option<FieldTable>,
}

/// A table of field name to selector expression, kept in file order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldTable(pub Vec<(String, String)>);

impl<'de> Deserialize<'de> for FieldTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldTableVisitor;

        impl<'de> Visitor<'de> for FieldTableVisitor {
            type Value = FieldTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of field name to selector expression")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<FieldTable, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, spec)) = map.next_entry::<String, String>()? {
                    entries.push((name, spec));
                }
                Ok(FieldTable(entries))
            }
        }

        deserializer.deserialize_map(FieldTableVisitor)
    }
}

/// Validated operational settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub user_agent: Option<String>,
    pub delay_between_requests: Duration,
    pub validation_enabled: bool,
    pub log_level: String,
    pub output_dir: PathBuf,
}

impl Config {
    pub fn from_toml_str(s: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Validate every target. Names must be unique; each target must have exactly one mode.
    pub fn targets(&self) -> Result<Vec<Target>, ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(self.targets.len());
        for (index, raw) in self.targets.iter().enumerate() {
            let target = validate_target(index, raw)?;
            if !seen.insert(target.name.clone()) {
                return Err(ConfigError::DuplicateTarget { name: target.name });
            }
            targets.push(target);
        }
        Ok(targets)
    }

    /// Resolve `[http]`, `[validation]`, `[logging]`, and `[output]` with defaults applied.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let http = &self.http;
        let timeout = seconds(
            "http.timeout_secs",
            http.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        )?;
        if timeout.is_zero() {
            return Err(ConfigError::InvalidSetting {
                key: "http.timeout_secs",
                message: "must be greater than 0".to_string(),
            });
        }
        let defaults = RetryPolicy::default();
        let backoff_multiplier = http
            .backoff_multiplier
            .unwrap_or(defaults.backoff_multiplier);
        if !backoff_multiplier.is_finite() || backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidSetting {
                key: "http.backoff_multiplier",
                message: format!("must be at least 1.0, got {}", backoff_multiplier),
            });
        }
        let retry = RetryPolicy {
            max_attempts: http.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            backoff_initial: seconds(
                "http.backoff_initial_secs",
                http.backoff_initial_secs.unwrap_or(0.0),
            )?,
            backoff_multiplier,
            jitter_max: seconds("http.jitter_max_secs", http.jitter_max_secs.unwrap_or(0.0))?,
        };
        Ok(Settings {
            timeout,
            retry,
            user_agent: http.user_agent.clone().filter(|ua| !ua.trim().is_empty()),
            delay_between_requests: seconds("http.delay_secs", http.delay_secs.unwrap_or(0.0))?,
            validation_enabled: self.validation.enabled.unwrap_or(true),
            log_level: normalize_level(self.logging.level.as_deref()),
            output_dir: self
                .output
                .dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
        })
    }
}

/// Non-negative, finite seconds to a [Duration].
pub fn seconds(key: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidSetting {
        key,
        message: format!("expected a non-negative number of seconds, got {}", secs),
    })
}

/// Map a configured level name to a tracing level; unknown names give "info".
pub fn normalize_level(level: Option<&str>) -> String {
    let level = level.map(|s| s.trim().to_ascii_lowercase());
    match level.as_deref() {
        Some(l @ ("trace" | "debug" | "info" | "warn" | "error")) => l.to_string(),
        Some("warning") => "warn".to_string(),
        Some("critical") => "error".to_string(),
        _ => DEFAULT_LOG_LEVEL.to_string(),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn validate_target(index: usize, raw: &TargetConfig) -> Result<Target, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidTarget { index, message };

    let name = non_empty(raw.name.as_deref())
        .ok_or_else(|| invalid("must have a non-empty 'name'".to_string()))?
        .to_string();
    let list_url = non_empty(raw.list_url.as_deref())
        .ok_or_else(|| invalid(format!("'{}' is missing a non-empty 'list_url'", name)))?
        .to_string();

    let has_item_mode = raw.item_selector.is_some() || raw.item_fields.is_some();
    let has_link_mode = raw.link_selector.is_some() || raw.detail_selectors.is_some();
    let mode = match (has_item_mode, has_link_mode) {
        (true, true) => {
            return Err(invalid(format!(
                "'{}' mixes list-only keys (item_selector, item_fields) with detail-follow keys (link_selector, detail_selectors)",
                name
            )))
        }
        (true, false) => TargetMode::ListOnly {
            item_selector: required_css(raw.item_selector.as_deref(), "item_selector")
                .map_err(|m| invalid(format!("'{}' {}", name, m)))?,
            item_fields: field_specs(raw.item_fields.as_ref(), "item_fields")
                .map_err(|m| invalid(format!("'{}' {}", name, m)))?,
        },
        (false, _) => TargetMode::DetailFollow {
            link_selector: required_css(raw.link_selector.as_deref(), "link_selector")
                .map_err(|m| invalid(format!("'{}' {}", name, m)))?,
            detail_fields: field_specs(raw.detail_selectors.as_ref(), "detail_selectors")
                .map_err(|m| invalid(format!("'{}' {}", name, m)))?,
        },
    };

    Ok(Target {
        name,
        list_url,
        mode,
    })
}

fn required_css(value: Option<&str>, key: &str) -> Result<Css, String> {
    let css = non_empty(value).ok_or_else(|| format!("is missing a non-empty '{}'", key))?;
    Css::parse(css).map_err(|e| format!("has an invalid '{}': {}", key, e))
}

fn field_specs(table: Option<&FieldTable>, key: &str) -> Result<FieldSpecs, String> {
    let table = table
        .filter(|t| !t.0.is_empty())
        .ok_or_else(|| format!("has a missing or empty '{}' table", key))?;
    let mut specs = FieldSpecs::new();
    for (field, expr) in &table.0 {
        if field.trim().is_empty() {
            return Err(format!("has an empty field name in '{}'", key));
        }
        let spec = SelectorSpec::parse(expr).map_err(|e| match e {
            SelectorError::Empty => format!("has an empty selector for field '{}'", field),
            other => format!("has an invalid selector for field '{}': {}", field, other),
        })?;
        specs.push(field.as_str(), spec);
    }
    Ok(specs)
}

/// Candidate config locations, most specific first.
pub fn config_search_paths() -> Result<Vec<PathBuf>, ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::Read {
        path: PathBuf::from("."),
        source: e,
    })?;
    let mut paths = vec![cwd.join(CONFIG_FILE_NAME)];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("listscrape").join("config.toml"));
    }
    Ok(paths)
}

/// Load the config from `explicit` if given (must exist), else the first file found on the
/// search path. Returns the path actually read.
pub fn load_config(explicit: Option<&Path>) -> Result<(PathBuf, Config), ConfigError> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => config_search_paths()?
            .into_iter()
            .find(|p| p.exists())
            .ok_or(ConfigError::NotFound)?,
    };
    let s = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read {
        path: path.clone(),
        source: e,
    })?;
    let config = Config::from_toml_str(&s, &path)?;
    Ok((path, config))
}

/// Pick a target by name, or the first one when no name is given.
pub fn select_target<'a>(
    targets: &'a [Target],
    name: Option<&str>,
) -> Result<&'a Target, ConfigError> {
    match name {
        Some(name) => targets
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ConfigError::UnknownTarget {
                name: name.to_string(),
                available: targets
                    .iter()
                    .map(|t| t.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        None => targets.first().ok_or(ConfigError::NoTargets),
    }
}
