use grblstream::MachineConfig;

const CARVEY_TOML: &str = r#"
name = "Carvey"
baud = 115200
separator = "\n"
realTimeCommands = ["status", "flush", "pause", "resume"]
liftToCustomSafetyHeight = "G53 G0 Z-1"

[gcode]
status = "?"
flush = "\\u24"
pause = "!"
resume = "~"
spindleOff = "M5"

[firmwareUpload]
resetDelay = 2000
resetKeepAliveInterval = 250
preReset = true
"#;

#[test]
fn test_load_toml_machine_profile() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("carvey.toml");
    std::fs::write(&path, CARVEY_TOML).unwrap();

    let config = MachineConfig::load_from_file(&path).unwrap();
    assert_eq!(config.name, "Carvey");
    assert_eq!(config.gcode_for("flush").as_deref(), Some("\u{18}"));
    assert!(config.is_real_time("pause"));
    assert!(!config.is_real_time("spindleOff"));

    let upload = config.firmware_upload.unwrap();
    assert_eq!(upload.reset_delay, 2000);
    assert!(upload.pre_reset);
}

#[test]
fn test_version_is_set() {
    assert!(!grblstream::VERSION.is_empty());
    assert!(!grblstream::BUILD_DATE.is_empty());
}
