//! TOML-based application configuration.
//!
//! Stores engine settings:
//! - Reminder lead time and overdue alert cadence
//! - Pomodoro durations and long-break cadence
//! - Focus guard grace period, polling and allow/deny patterns
//! - Notification preferences and quiet hours
//!
//! Configuration is stored at `~/.config/focuskeeper/config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::notify::QuietHoursPolicy;

/// Reminder and overdue-sweep settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderConfig {
    #[serde(default = "default_lead_minutes")]
    pub lead_minutes: u32,
    #[serde(default = "default_alert_interval_minutes")]
    pub alert_interval_minutes: u32,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Pomodoro cycle settings. Durations are in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PomodoroConfig {
    #[serde(default = "default_work_duration")]
    pub work_duration: u32,
    #[serde(default = "default_break_duration")]
    pub break_duration: u32,
    #[serde(default = "default_long_break_duration")]
    pub long_break_duration: u32,
    #[serde(default = "default_cycles_before_long_break")]
    pub cycles_before_long_break: u32,
}

/// Focus guard settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusGuardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_grace_countdown_ms")]
    pub grace_countdown_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Longest a single foreground query may take before it is abandoned.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Only start countdowns while a focus session is running.
    #[serde(default = "default_true")]
    pub require_active_session: bool,
    /// Our own app name; being in front counts as focused.
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub blacklist: Vec<String>,
    /// Command printing `app<TAB>title[<TAB>url]` for the foreground window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_command: Option<Vec<String>>,
}

/// Notification configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub quiet_hours: QuietHoursPolicy,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub reminders: ReminderConfig,
    #[serde(default)]
    pub pomodoro: PomodoroConfig,
    #[serde(default)]
    pub focus_guard: FocusGuardConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

// Default functions
fn default_lead_minutes() -> u32 {
    5
}
fn default_alert_interval_minutes() -> u32 {
    15
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_work_duration() -> u32 {
    25
}
fn default_break_duration() -> u32 {
    5
}
fn default_long_break_duration() -> u32 {
    15
}
fn default_cycles_before_long_break() -> u32 {
    4
}
fn default_grace_countdown_ms() -> u64 {
    10_000
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_probe_timeout_ms() -> u64 {
    2_000
}
fn default_app_name() -> String {
    "FocusKeeper".into()
}
fn default_true() -> bool {
    true
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            lead_minutes: default_lead_minutes(),
            alert_interval_minutes: default_alert_interval_minutes(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for PomodoroConfig {
    fn default() -> Self {
        Self {
            work_duration: default_work_duration(),
            break_duration: default_break_duration(),
            long_break_duration: default_long_break_duration(),
            cycles_before_long_break: default_cycles_before_long_break(),
        }
    }
}

impl Default for FocusGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_countdown_ms: default_grace_countdown_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            require_active_session: true,
            app_name: default_app_name(),
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            probe_command: None,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quiet_hours: QuietHoursPolicy::default(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => value
                        .parse::<u64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?,
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Path of the config file inside `dir`.
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join("config.toml")
    }

    /// Load from `dir`, writing defaults there if no file exists yet.
    pub fn load_from(dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_in(dir);
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(dir)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
        }
    }

    /// Persist to `dir`.
    pub fn save_to(&self, dir: &Path) -> Result<(), ConfigError> {
        let path = Self::path_in(dir);
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.clone(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::create_dir_all(dir).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Load from the default data directory.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&data_dir()?)
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key in memory. Returns error if key is unknown.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |e: serde_json::Error| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        };
        let mut json = serde_json::to_value(&*self).map_err(invalid)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(invalid)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn empty_file_gets_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.reminders.lead_minutes, 5);
        assert_eq!(cfg.reminders.alert_interval_minutes, 15);
        assert_eq!(cfg.reminders.sweep_interval_secs, 60);
        assert_eq!(cfg.pomodoro.work_duration, 25);
        assert_eq!(cfg.pomodoro.cycles_before_long_break, 4);
        assert_eq!(cfg.focus_guard.grace_countdown_ms, 10_000);
        assert!(cfg.focus_guard.require_active_session);
    }

    #[test]
    fn quiet_hours_keys_are_snake_case() {
        let cfg: Config = toml::from_str(
            r#"
            [notifications.quiet_hours]
            enabled = true
            start_hour = 21
            end_hour = 6
            "#,
        )
        .unwrap();
        assert!(cfg.notifications.quiet_hours.enabled);
        assert_eq!(cfg.notifications.quiet_hours.start_hour, 21);
        assert_eq!(
            cfg.get("notifications.quiet_hours.end_hour").as_deref(),
            Some("6")
        );
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [focus_guard]
            blacklist = ["*youtube*", "Steam"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.focus_guard.blacklist.len(), 2);
        assert_eq!(cfg.focus_guard.poll_interval_ms, 1_000);
        assert_eq!(cfg.focus_guard.probe_timeout_ms, 2_000);
        assert!(cfg.focus_guard.whitelist.is_empty());
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("pomodoro.work_duration").as_deref(), Some("25"));
        assert_eq!(cfg.get("focus_guard.enabled").as_deref(), Some("true"));
        assert_eq!(cfg.get("focus_guard.app_name").as_deref(), Some("FocusKeeper"));
        assert!(cfg.get("pomodoro.missing_key").is_none());
    }

    #[test]
    fn set_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.set("pomodoro.cycles_before_long_break", "3").unwrap();
        cfg.set("focus_guard.enabled", "false").unwrap();
        cfg.set("focus_guard.whitelist", r#"["Code", "*.rs"]"#).unwrap();
        assert_eq!(cfg.pomodoro.cycles_before_long_break, 3);
        assert!(!cfg.focus_guard.enabled);
        assert_eq!(cfg.focus_guard.whitelist, vec!["Code", "*.rs"]);
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_type() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("pomodoro.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            cfg.set("focus_guard.enabled", "not_a_bool"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(dir.path()).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(Config::path_in(dir.path()).exists());

        let mut changed = cfg.clone();
        changed.reminders.lead_minutes = 10;
        changed.save_to(dir.path()).unwrap();
        assert_eq!(Config::load_from(dir.path()).unwrap().reminders.lead_minutes, 10);
    }
}
