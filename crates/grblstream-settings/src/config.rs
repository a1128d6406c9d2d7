//! Machine configuration for grblstream
//!
//! A [`MachineConfig`] describes one controller model: serial parameters, the
//! gcode each named instruction maps to, which instructions are single-byte
//! real-time commands, and the firmware upload handshake timings. Clients
//! send it as camelCase JSON; it can also be stored as JSON or TOML.
//!
//! [`MachineTimings`] holds the driver-side delays that are not part of the
//! client-facing configuration.

use crate::error::{SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_baud() -> u32 {
    115200
}

fn default_separator() -> String {
    "\n".to_string()
}

fn default_keep_alive_interval() -> u64 {
    250
}

/// Bootloader handshake parameters used before a firmware upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareUploadConfig {
    /// Total time to keep the bootloader alive before handing over, in ms
    #[serde(default)]
    pub reset_delay: u64,
    /// Interval between keep-alive writes, in ms
    #[serde(default = "default_keep_alive_interval")]
    pub reset_keep_alive_interval: u64,
    /// Send the bootloader-entry line before the keep-alive loop
    #[serde(default)]
    pub pre_reset: bool,
    /// Uploader-specific keys, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for FirmwareUploadConfig {
    fn default() -> Self {
        Self {
            reset_delay: 0,
            reset_keep_alive_interval: default_keep_alive_interval(),
            pre_reset: false,
            extra: Map::new(),
        }
    }
}

/// Description of one controller model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfig {
    /// Display name
    pub name: String,
    /// Serial baud rate
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Line separator used by the controller's output
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Instruction name to gcode. A value of the form `\uNN` stands for the
    /// single character with decimal code NN.
    #[serde(default)]
    pub gcode: BTreeMap<String, String>,
    /// Instructions written raw, bypassing the command queue
    #[serde(default)]
    pub real_time_commands: Vec<String>,
    /// Replaces the `liftToSafeHeight` instruction during a stop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lift_to_custom_safety_height: Option<String>,
    /// Present when the machine supports firmware upload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_upload: Option<FirmwareUploadConfig>,
    /// Keys this driver does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MachineConfig {
    /// Create an empty config with defaults for everything but the name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            baud: default_baud(),
            separator: default_separator(),
            gcode: BTreeMap::new(),
            real_time_commands: Vec::new(),
            lift_to_custom_safety_height: None,
            firmware_upload: None,
            extra: Map::new(),
        }
    }

    /// Builder-style helper to map an instruction
    pub fn with_instruction(mut self, instruction: &str, gcode: &str) -> Self {
        self.gcode.insert(instruction.to_string(), gcode.to_string());
        self
    }

    /// Builder-style helper to mark an instruction as real-time
    pub fn with_real_time(mut self, instruction: &str) -> Self {
        self.real_time_commands.push(instruction.to_string());
        self
    }

    /// Parse a config from JSON text
    pub fn from_json_str(content: &str) -> SettingsResult<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a config from an already parsed JSON value
    pub fn from_value(value: Value) -> SettingsResult<Self> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::LoadError(format!("{}: {}", path.display(), e)))?;

        let config: Self = match extension(path) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            other => {
                return Err(SettingsError::UnsupportedFormat(
                    other.unwrap_or("<none>").to_string(),
                ))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match extension(path) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string_pretty(self)?,
            other => {
                return Err(SettingsError::UnsupportedFormat(
                    other.unwrap_or("<none>").to_string(),
                ))
            }
        };

        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.baud == 0 {
            return Err(invalid("baud", "must be > 0"));
        }

        if self.separator.is_empty() {
            return Err(invalid("separator", "must not be empty"));
        }

        if let Some(upload) = &self.firmware_upload {
            if upload.reset_delay > 0 && upload.reset_keep_alive_interval == 0 {
                return Err(invalid(
                    "firmwareUpload.resetKeepAliveInterval",
                    "must be > 0 when resetDelay is set",
                ));
            }
        }

        Ok(())
    }

    /// Apply a partial update. Each top-level key of `partial` replaces the
    /// field of the same (camelCase) name; the result must still validate.
    pub fn update(&mut self, partial: &Value) -> SettingsResult<()> {
        let patch = partial
            .as_object()
            .ok_or_else(|| invalid("<update>", "expected a JSON object"))?;

        let mut current = serde_json::to_value(&*self)?;
        if let Value::Object(fields) = &mut current {
            for (key, value) in patch {
                fields.insert(key.clone(), value.clone());
            }
        }

        let updated: Self = serde_json::from_value(current)?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// The gcode for an instruction, with `\uNN` escapes decoded
    pub fn gcode_for(&self, instruction: &str) -> Option<String> {
        let gcode = self.gcode.get(instruction)?;
        if !gcode.contains("\\u") {
            return Some(gcode.clone());
        }

        let code = gcode.replace("\\u", "");
        match code.trim().parse::<u32>().ok().and_then(char::from_u32) {
            Some(c) => Some(c.to_string()),
            None => {
                tracing::warn!(
                    "Instruction {} has an undecodable escape {:?}",
                    instruction,
                    gcode
                );
                Some(gcode.clone())
            }
        }
    }

    /// Whether an instruction is written raw instead of queued
    pub fn is_real_time(&self, instruction: &str) -> bool {
        self.real_time_commands.iter().any(|c| c == instruction)
    }
}

/// Driver-side delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineTimings {
    /// Status poll interval while connected, in ms
    pub heartbeat_interval_ms: u64,
    /// Settle time between the stages of a stop, in ms
    pub stop_stage_delay_ms: u64,
    /// Grace period before disconnecting once the last client leaves, in ms
    pub idle_disconnect_delay_ms: u64,
}

impl MachineTimings {
    /// Heartbeat interval
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Stop stage delay
    pub fn stop_stage_delay(&self) -> Duration {
        Duration::from_millis(self.stop_stage_delay_ms)
    }

    /// Idle disconnect delay
    pub fn idle_disconnect_delay(&self) -> Duration {
        Duration::from_millis(self.idle_disconnect_delay_ms)
    }
}

impl Default for MachineTimings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 500,
            stop_stage_delay_ms: 1000,
            idle_disconnect_delay_ms: 10_000,
        }
    }
}

/// Platform location of the default machine config
pub fn default_config_path() -> SettingsResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("grblstream").join("machine.json"))
        .ok_or_else(|| SettingsError::ConfigDirectory("no config directory on this platform".into()))
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

fn invalid(key: &str, reason: &str) -> SettingsError {
    SettingsError::InvalidSetting {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn carve_config() -> Value {
        json!({
            "name": "Carve",
            "baud": 115200,
            "separator": "\n",
            "gcode": {
                "flush": "\\u24",
                "pause": "!",
                "resume": "~",
                "status": "?",
                "park": "G0 X0 Y0",
                "spindleOff": "M5"
            },
            "realTimeCommands": ["flush", "pause", "resume", "status"],
            "firmwareUpload": {
                "resetDelay": 1000,
                "resetKeepAliveInterval": 100,
                "preReset": true,
                "protocol": "stk500v1"
            },
            "vendorField": 7
        })
    }

    #[test]
    fn test_parse_camel_case_config() {
        let config = MachineConfig::from_value(carve_config()).unwrap();
        assert_eq!(config.name, "Carve");
        assert!(config.is_real_time("pause"));
        assert!(!config.is_real_time("park"));

        let upload = config.firmware_upload.as_ref().unwrap();
        assert_eq!(upload.reset_delay, 1000);
        assert!(upload.pre_reset);
        assert_eq!(upload.extra.get("protocol"), Some(&json!("stk500v1")));
        assert_eq!(config.extra.get("vendorField"), Some(&json!(7)));
    }

    #[test]
    fn test_gcode_for_decodes_escape() {
        let config = MachineConfig::from_value(carve_config()).unwrap();
        assert_eq!(config.gcode_for("flush").as_deref(), Some("\u{18}"));
        assert_eq!(config.gcode_for("park").as_deref(), Some("G0 X0 Y0"));
        assert_eq!(config.gcode_for("home"), None);
    }

    #[test]
    fn test_update_replaces_top_level_keys() {
        let mut config = MachineConfig::from_value(carve_config()).unwrap();
        config
            .update(&json!({ "liftToCustomSafetyHeight": "G53 G0 Z-2" }))
            .unwrap();
        assert_eq!(
            config.lift_to_custom_safety_height.as_deref(),
            Some("G53 G0 Z-2")
        );
        assert_eq!(config.name, "Carve");

        config.update(&json!({ "liftToCustomSafetyHeight": null })).unwrap();
        assert_eq!(config.lift_to_custom_safety_height, None);
    }

    #[test]
    fn test_update_rejects_non_object() {
        let mut config = MachineConfig::new("x");
        assert!(config.update(&Value::Null).is_err());
        assert!(config.update(&json!({ "baud": 0 })).is_err());
        assert_eq!(config.baud, 115200);
    }

    #[test]
    fn test_validate_keep_alive_interval() {
        let mut config = MachineConfig::new("x");
        config.firmware_upload = Some(FirmwareUploadConfig {
            reset_delay: 500,
            reset_keep_alive_interval: 0,
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine.toml");

        let config = MachineConfig::new("Shapeoko")
            .with_instruction("status", "?")
            .with_real_time("status");
        config.save_to_file(&path).unwrap();

        let loaded = MachineConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine.yaml");
        std::fs::write(&path, "name: x").unwrap();
        assert!(matches!(
            MachineConfig::load_from_file(&path),
            Err(SettingsError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_default_timings() {
        let timings = MachineTimings::default();
        assert_eq!(timings.heartbeat_interval(), Duration::from_millis(500));
        assert_eq!(timings.stop_stage_delay(), Duration::from_secs(1));
        assert_eq!(timings.idle_disconnect_delay(), Duration::from_secs(10));
    }
}
