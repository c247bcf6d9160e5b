use std::path::{Path, PathBuf};

use meshsplice_common::DEFAULT_TABLE_CAPACITY;
use serde::{Deserialize, Serialize};

use crate::tables::Verbosity;

/// Top-level configuration for meshsplice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Correlation table sizing and pinning.
    #[serde(default)]
    pub tables: TableConfig,

    /// Initial contents of the debug table.
    #[serde(default)]
    pub debug: DebugConfig,

    /// Location of the kernel maps.
    #[serde(default)]
    pub bpf: BpfConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    /// Maximum entries per correlation table. Inserts past this fail.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Name the table set is pinned under.
    #[serde(default = "default_pin_name")]
    pub pin_name: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            pin_name: default_pin_name(),
        }
    }
}

fn default_capacity() -> usize {
    DEFAULT_TABLE_CAPACITY as usize
}

fn default_pin_name() -> String {
    "meshsplice".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugConfig {
    /// 0 = off, 1 = per-message records, 2+ = records and redirect counting.
    #[serde(default)]
    pub verbosity: Verbosity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BpfConfig {
    /// bpffs directory the kernel maps are pinned in.
    #[serde(default = "default_pin_dir")]
    pub pin_dir: PathBuf,
}

impl Default for BpfConfig {
    fn default() -> Self {
        Self {
            pin_dir: default_pin_dir(),
        }
    }
}

fn default_pin_dir() -> PathBuf {
    PathBuf::from("/sys/fs/bpf")
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Generate a default configuration.
    pub fn default_config() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tables.capacity == 0 {
            anyhow::bail!("tables.capacity must be greater than zero");
        }
        if self.tables.pin_name.is_empty() {
            anyhow::bail!("tables.pin_name must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.tables.capacity, 1_000_000);
        assert_eq!(config.tables.pin_name, "meshsplice");
        assert_eq!(config.debug.verbosity, Verbosity::OFF);
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.bpf.pin_dir, PathBuf::from("/sys/fs/bpf"));
    }

    #[test]
    fn test_partial_document() {
        let yaml = "tables:\n  capacity: 16\ndebug:\n  verbosity: 2\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tables.capacity, 16);
        assert_eq!(config.tables.pin_name, "meshsplice");
        assert!(config.debug.verbosity.counts());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = Config::default_config();
        config.tables.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_round_trips_default() {
        let path =
            std::env::temp_dir().join(format!("meshsplice-config-{}.yaml", std::process::id()));
        std::fs::write(&path, serde_yaml::to_string(&Config::default_config()).unwrap()).unwrap();
        let config = Config::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.tables.capacity, 1_000_000);
    }
}
