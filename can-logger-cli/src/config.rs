//! Configuration loading and command-line overrides

use anyhow::{Context, Result};
use can_logger::gpio::{Edge, DEFAULT_SYSFS_ROOT};
use can_logger::{LoggerConfig, RecordLayout};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub logger: LoggerConfig,
    #[serde(default)]
    pub gpio: GpioConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BusConfig {
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
    /// Reset the interface with `ip link` at startup and take it down on exit
    #[serde(default = "default_true")]
    pub manage_interface: bool,
    #[serde(default = "default_true")]
    pub use_sudo: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            bitrate: default_bitrate(),
            manage_interface: true,
            use_sudo: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub dbc_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GpioConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
    #[serde(default = "default_button_pin")]
    pub button_pin: u32,
    #[serde(default = "default_led_pin")]
    pub led_pin: u32,
    /// Button transition that toggles logging
    #[serde(default)]
    pub edge: Edge,
    /// Button pulls the line low when pressed
    #[serde(default = "default_true")]
    pub active_low: bool,
    #[serde(default)]
    pub led_active_low: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sysfs_root: default_sysfs_root(),
            button_pin: default_button_pin(),
            led_pin: default_led_pin(),
            edge: Edge::default(),
            active_low: true,
            led_active_low: false,
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_channel() -> String {
    "can0".to_string()
}

fn default_bitrate() -> u32 {
    1_000_000
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from(DEFAULT_SYSFS_ROOT)
}

fn default_button_pin() -> u32 {
    27
}

fn default_led_pin() -> u32 {
    17
}

fn default_poll_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

/// Values given on the command line, applied over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub dbc_files: Vec<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub channel: Option<String>,
    pub bitrate: Option<u32>,
    pub layout: Option<RecordLayout>,
    pub no_gpio: bool,
    pub no_link_setup: bool,
}

impl AppConfig {
    /// Apply command-line values; `--dbc` replaces the configured list
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if !overrides.dbc_files.is_empty() {
            self.schema.dbc_files = overrides.dbc_files.clone();
        }
        if let Some(dir) = &overrides.output_dir {
            self.logger.output_dir = dir.clone();
        }
        if let Some(channel) = &overrides.channel {
            self.bus.channel = channel.clone();
        }
        if let Some(bitrate) = overrides.bitrate {
            self.bus.bitrate = bitrate;
        }
        if let Some(layout) = overrides.layout {
            self.logger.layout = layout;
        }
        if overrides.no_gpio {
            self.gpio.enabled = false;
        }
        if overrides.no_link_setup {
            self.bus.manage_interface = false;
        }
    }

    /// Expand `~/` and `$VAR/` in every configured path
    pub fn expand_paths(&mut self) {
        self.logger.output_dir = expand(&self.logger.output_dir);
        self.gpio.sysfs_root = expand(&self.gpio.sysfs_root);
        for path in &mut self.schema.dbc_files {
            *path = expand(path);
        }
    }
}

fn expand(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(text) => expand_path(text),
        None => path.to_path_buf(),
    }
}

/// Expand a leading `~/` to the home directory and `$VAR/` to its value
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        let (var_name, rest) = match stripped.find('/') {
            Some(pos) => (&stripped[..pos], Some(&stripped[pos + 1..])),
            None => (stripped, None),
        };
        if let Ok(value) = std::env::var(var_name) {
            let base = PathBuf::from(value);
            return match rest {
                Some(rest) => base.join(rest),
                None => base,
            };
        }
    }
    PathBuf::from(path)
}

/// Load configuration from a TOML file, or defaults when no file is given
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let Some(path) = path else {
        return Ok(AppConfig::default());
    };

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [bus]
            channel = "can1"
            bitrate = 500000
            use_sudo = false

            [schema]
            dbc_files = ["vehicle.dbc", "body.dbc"]

            [logger]
            output_dir = "/data/can_logs"
            layout = "wide"
            debounce_ms = 200

            [gpio]
            button_pin = 22
            edge = "both"
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.bus.channel, "can1");
        assert_eq!(config.bus.bitrate, 500_000);
        assert!(!config.bus.use_sudo);
        assert!(config.bus.manage_interface);
        assert_eq!(config.schema.dbc_files.len(), 2);
        assert_eq!(config.logger.output_dir, PathBuf::from("/data/can_logs"));
        assert_eq!(config.logger.layout, RecordLayout::Wide);
        assert_eq!(config.logger.debounce_ms, 200);
        assert_eq!(config.logger.file_prefix, "can_log");
        assert_eq!(config.gpio.button_pin, 22);
        assert_eq!(config.gpio.led_pin, 17);
        assert_eq!(config.gpio.edge, Edge::Both);
    }

    #[test]
    fn test_empty_config_uses_deployment_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.bus.channel, "can0");
        assert_eq!(config.bus.bitrate, 1_000_000);
        assert!(config.gpio.enabled);
        assert_eq!(config.gpio.button_pin, 27);
        assert_eq!(config.gpio.led_pin, 17);
        assert!(config.gpio.active_low);
        assert_eq!(config.gpio.sysfs_root, PathBuf::from("/sys/class/gpio"));
        assert!(config.schema.dbc_files.is_empty());
    }

    #[test]
    fn test_overrides() {
        let mut config = AppConfig::default();
        config.schema.dbc_files = vec![PathBuf::from("old.dbc")];

        config.apply_overrides(&Overrides {
            dbc_files: vec![PathBuf::from("new.dbc")],
            output_dir: Some(PathBuf::from("/tmp/out")),
            channel: Some("vcan0".to_string()),
            bitrate: Some(250_000),
            layout: Some(RecordLayout::Wide),
            no_gpio: true,
            no_link_setup: true,
        });

        assert_eq!(config.schema.dbc_files, vec![PathBuf::from("new.dbc")]);
        assert_eq!(config.logger.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.bus.channel, "vcan0");
        assert_eq!(config.bus.bitrate, 250_000);
        assert_eq!(config.logger.layout, RecordLayout::Wide);
        assert!(!config.gpio.enabled);
        assert!(!config.bus.manage_interface);
    }

    #[test]
    fn test_empty_overrides_keep_file_values() {
        let mut config = AppConfig::default();
        config.schema.dbc_files = vec![PathBuf::from("vehicle.dbc")];
        config.apply_overrides(&Overrides::default());

        assert_eq!(config.schema.dbc_files, vec![PathBuf::from("vehicle.dbc")]);
        assert!(config.gpio.enabled);
        assert!(config.bus.manage_interface);
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_path("relative"), PathBuf::from("relative"));

        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            assert_eq!(expand_path("~/can_logs"), home.join("can_logs"));
        }
    }

    #[test]
    fn test_load_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[bus]\nchannel = \"vcan0\"").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.bus.channel, "vcan0");
        assert!(load_config(Some(Path::new("/nonexistent/config.toml"))).is_err());
        assert_eq!(load_config(None).unwrap().bus.channel, "can0");
    }

    #[test]
    fn test_example_config_parses() {
        let content = include_str!("../config.example.toml");
        let config: AppConfig = toml::from_str(content).unwrap();
        assert_eq!(config.bus.channel, "can0");
        assert_eq!(config.schema.dbc_files.len(), 1);
        assert!(config.logger.validate().is_ok());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[bus\nchannel = ").unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }
}
