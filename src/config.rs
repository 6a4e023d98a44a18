use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::LogConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application metadata
    pub metadata: ConfigMetadata,

    /// General application settings
    pub settings: AppSettings,

    /// Session recording and sample filtering
    pub tracking: TrackingConfig,

    /// Athlete data used by the calorie estimate
    pub athlete: AthleteSettings,

    /// Logging output
    #[serde(default)]
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Data directory path
    pub data_dir: PathBuf,

    /// SQLite file name inside the data directory
    pub database_file: String,
}

/// Session recording settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Fixes with a larger accuracy radius (meters) are discarded
    pub max_horizontal_accuracy_meters: f64,

    /// Movement below this (meters) counts as GPS jitter
    pub min_movement_meters: f64,

    /// Movement above this (meters) counts as a spurious fix
    pub max_jump_meters: f64,

    /// Elapsed-time refresh period
    pub tick_interval_ms: u64,

    /// Heart-rate sampling period
    pub heart_rate_interval_ms: u64,

    /// Keep sampling heart rate while the session is paused
    pub sample_heart_rate_while_paused: bool,

    /// Seed value for the first simulated heart-rate sample
    pub initial_heart_rate_bpm: u32,

    /// Requested interval between location updates
    pub location_interval_ms: u64,

    /// Requested minimum movement between location updates
    pub location_distance_filter_meters: f64,
}

/// Athlete settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthleteSettings {
    /// Display name
    pub name: Option<String>,

    /// Weight in kilograms
    pub weight_kg: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();

        AppConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            settings: AppSettings::default(),
            tracking: TrackingConfig::default(),
            athlete: AthleteSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            data_dir: PathBuf::from("./data"),
            database_file: "activities.db".to_string(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            max_horizontal_accuracy_meters: 20.0,
            min_movement_meters: 1.0,
            max_jump_meters: 100.0,
            tick_interval_ms: 1000,
            heart_rate_interval_ms: 2000,
            sample_heart_rate_while_paused: false,
            initial_heart_rate_bpm: 140,
            location_interval_ms: 2000,
            location_distance_filter_meters: 5.0,
        }
    }
}

impl Default for AthleteSettings {
    fn default() -> Self {
        AthleteSettings {
            name: None,
            weight_kg: 70.0,
        }
    }
}

impl TrackingConfig {
    /// Reject settings the accumulator cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.min_movement_meters < 0.0 {
            anyhow::bail!("tracking.min_movement_meters must not be negative");
        }
        if self.max_jump_meters <= self.min_movement_meters {
            anyhow::bail!("tracking.max_jump_meters must exceed tracking.min_movement_meters");
        }
        if self.max_horizontal_accuracy_meters <= 0.0 {
            anyhow::bail!("tracking.max_horizontal_accuracy_meters must be positive");
        }
        if self.tick_interval_ms == 0 || self.heart_rate_interval_ms == 0 {
            anyhow::bail!("tracking intervals must be non-zero");
        }
        Ok(())
    }
}

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;

        config.tracking.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".trackrs")
            .join("config.toml")
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::debug!(path = %config_path.display(), error = %err, "Using default configuration");
                Self::default()
            }
        }
    }

    /// Full path of the activity database
    pub fn database_path(&self) -> PathBuf {
        self.settings.data_dir.join(&self.settings.database_file)
    }

    /// Read a setting by dotted key, e.g. `tracking.max_jump_meters`
    pub fn get(&self, key: &str) -> Result<String> {
        let value = toml::Value::try_from(self).context("Failed to serialize configuration")?;
        let mut current = &value;
        for part in key.split('.') {
            current = current
                .get(part)
                .ok_or_else(|| anyhow::anyhow!("Unknown configuration key: {}", key))?;
        }
        Ok(match current {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Set a setting by dotted key. The value is parsed as TOML first and
    /// falls back to a plain string.
    pub fn set(&mut self, key: &str, raw_value: &str) -> Result<()> {
        let mut root = toml::Value::try_from(&*self).context("Failed to serialize configuration")?;

        let parts: Vec<&str> = key.split('.').collect();
        let (last, parents) = parts
            .split_last()
            .ok_or_else(|| anyhow::anyhow!("Empty configuration key"))?;

        let mut table = root
            .as_table_mut()
            .ok_or_else(|| anyhow::anyhow!("Configuration root is not a table"))?;
        for part in parents {
            table = table
                .get_mut(*part)
                .and_then(toml::Value::as_table_mut)
                .ok_or_else(|| anyhow::anyhow!("Unknown configuration key: {}", key))?;
        }
        if !table.contains_key(*last) {
            anyhow::bail!("Unknown configuration key: {}", key);
        }

        let parsed = format!("v = {}", raw_value)
            .parse::<toml::Table>()
            .ok()
            .and_then(|mut t| t.remove("v"))
            .unwrap_or_else(|| toml::Value::String(raw_value.to_string()));
        table.insert((*last).to_string(), parsed);

        let updated: AppConfig = root
            .try_into()
            .with_context(|| format!("Invalid value for {}: {}", key, raw_value))?;
        updated.tracking.validate()?;

        *self = updated;
        self.metadata.updated_at = Utc::now();
        Ok(())
    }

    /// Flattened `key = value` listing of every setting
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        fn walk(prefix: &str, value: &toml::Value, out: &mut Vec<(String, String)>) {
            match value {
                toml::Value::Table(table) => {
                    for (k, v) in table {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{}.{}", prefix, k)
                        };
                        walk(&key, v, out);
                    }
                }
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let value = toml::Value::try_from(self).context("Failed to serialize configuration")?;
        let mut out = Vec::new();
        walk("", &value, &mut out);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.metadata.version, deserialized.metadata.version);
        assert_eq!(config.tracking, deserialized.tracking);
        assert_eq!(config.athlete, deserialized.athlete);
    }

    #[test]
    fn test_config_file_io() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original = AppConfig::default();
        original.athlete.weight_kg = 82.5;
        original.tracking.max_jump_meters = 60.0;

        original.save_to_file(&config_path).unwrap();
        let loaded = AppConfig::load_from_file(&config_path).unwrap();

        assert_eq!(loaded.athlete.weight_kg, 82.5);
        assert_eq!(loaded.tracking.max_jump_meters, 60.0);
    }

    #[test]
    fn test_partial_tracking_section_uses_defaults() {
        let mut config = AppConfig::default();
        let mut value = toml::Value::try_from(&config).unwrap();
        let tracking = toml::toml! { max_jump_meters = 75.0 };
        value
            .as_table_mut()
            .unwrap()
            .insert("tracking".to_string(), toml::Value::Table(tracking));

        config = value.try_into().unwrap();
        assert_eq!(config.tracking.max_jump_meters, 75.0);
        assert_eq!(config.tracking.min_movement_meters, 1.0);
        assert_eq!(config.tracking.heart_rate_interval_ms, 2000);
    }

    #[test]
    fn test_get_and_set_dotted_keys() {
        let mut config = AppConfig::default();
        assert_eq!(config.get("athlete.weight_kg").unwrap(), "70.0");

        config.set("athlete.weight_kg", "64.5").unwrap();
        assert_eq!(config.athlete.weight_kg, 64.5);

        config.set("tracking.sample_heart_rate_while_paused", "true").unwrap();
        assert!(config.tracking.sample_heart_rate_while_paused);

        config.set("settings.database_file", "runs.db").unwrap();
        assert_eq!(config.get("settings.database_file").unwrap(), "runs.db");

        assert!(config.set("tracking.unknown", "1").is_err());
        assert!(config.get("nope").is_err());
    }

    #[test]
    fn test_set_rejects_invalid_thresholds() {
        let mut config = AppConfig::default();
        assert!(config.set("tracking.max_jump_meters", "0.5").is_err());
        assert_eq!(config.tracking.max_jump_meters, 100.0);
    }

    #[test]
    fn test_list_contains_nested_keys() {
        let config = AppConfig::default();
        let keys: Vec<String> = config.list().unwrap().into_iter().map(|(k, _)| k).collect();
        assert!(keys.contains(&"tracking.min_movement_meters".to_string()));
        assert!(keys.contains(&"logging.level".to_string()));
    }
}
