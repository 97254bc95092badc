//! Application configuration.
//!
//! [`Config`] is deserialized from JSON once at startup and passed, immutable,
//! into every task and pipeline at construction. Nothing re-reads
//! configuration mid-run, so a task can never observe a half-applied settings
//! change. Every field defaults sensibly so an empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::ids::ItemId;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the reference user whose watch state gates remuxing and
    /// cleanup. When unset, watch state is ignored and cleanup is disabled.
    pub primary_user: Option<String>,
    /// Comma-separated catalog ids (library, show, season...) that processing
    /// is restricted to. Empty means the whole catalog.
    pub include_ancestor_ids: Option<String>,
    /// Whether Profile 7 sources are downmuxed to 8.1. When disabled they are
    /// skipped rather than remuxed as-is, since the dual-layer stream is the
    /// thing most devices choke on.
    pub downmux_enabled: bool,
    pub tools: ToolsConfig,
    /// Directory for intermediate pipeline files and pre-rename remux output.
    pub temp_dir: PathBuf,
    /// Directory where per-tool stderr logs are written.
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            primary_user: None,
            include_ancestor_ids: None,
            downmux_enabled: true,
            tools: ToolsConfig::default(),
            temp_dir: std::env::temp_dir().join("dovimux"),
            log_dir: std::env::temp_dir().join("dovimux/logs"),
        }
    }
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Parsed form of [`Config::include_ancestor_ids`]. Unparseable entries
    /// are dropped here and surfaced by [`Config::validate`].
    pub fn include_ancestors(&self) -> Vec<ItemId> {
        self.include_ancestor_ids
            .as_deref()
            .unwrap_or("")
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect()
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(ref ids) = self.include_ancestor_ids {
            for entry in ids.split(',') {
                let entry = entry.trim();
                if !entry.is_empty() && entry.parse::<ItemId>().is_err() {
                    warnings.push(format!(
                        "include_ancestor_ids entry '{entry}' is not a valid id and will be ignored"
                    ));
                }
            }
        }

        if let Some(ref user) = self.primary_user {
            if user.trim().is_empty() {
                warnings.push("primary_user is set but empty".into());
            }
        }

        for (name, path) in [
            ("ffmpeg_path", &self.tools.ffmpeg_path),
            ("ffprobe_path", &self.tools.ffprobe_path),
            ("dovi_tool_path", &self.tools.dovi_tool_path),
            ("mp4box_path", &self.tools.mp4box_path),
        ] {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!(
                        "tools.{name} '{}' does not exist; falling back to PATH lookup",
                        p.display()
                    ));
                }
            }
        }

        warnings
    }
}

/// Paths to external CLI tools. Unset entries are discovered on `PATH`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub dovi_tool_path: Option<PathBuf>,
    pub mp4box_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.primary_user.is_none());
        assert!(cfg.downmux_enabled);
        assert!(cfg.include_ancestors().is_empty());
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert!(cfg.downmux_enabled);
    }

    #[test]
    fn parse_json_config() {
        let json = r#"{"primary_user": "katie", "downmux_enabled": false}"#;
        let cfg = Config::from_json(json).unwrap();
        assert_eq!(cfg.primary_user.as_deref(), Some("katie"));
        assert!(!cfg.downmux_enabled);
    }

    #[test]
    fn ancestor_ids_parse_and_trim() {
        let a = ItemId::new();
        let b = ItemId::new();
        let cfg = Config {
            include_ancestor_ids: Some(format!(" {a}, {b} ,")),
            ..Config::default()
        };
        assert_eq!(cfg.include_ancestors(), vec![a, b]);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn bad_ancestor_id_warns_but_parses() {
        let a = ItemId::new();
        let cfg = Config {
            include_ancestor_ids: Some(format!("{a},not-an-id")),
            ..Config::default()
        };
        assert_eq!(cfg.include_ancestors(), vec![a]);
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("not-an-id")));
    }

    #[test]
    fn missing_tool_path_warns() {
        let cfg = Config {
            tools: ToolsConfig {
                ffmpeg_path: Some(PathBuf::from("/nonexistent/ffmpeg")),
                ..ToolsConfig::default()
            },
            ..Config::default()
        };
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("ffmpeg_path")));
    }

    #[test]
    fn load_or_default_with_none() {
        let cfg = Config::load_or_default(None);
        assert!(cfg.primary_user.is_none());
    }
}
