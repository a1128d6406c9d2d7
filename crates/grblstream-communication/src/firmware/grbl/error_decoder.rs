//! GRBL error and alarm descriptions
//!
//! Maps the numeric code carried by an `error:N` or `ALARM:N` line to a short
//! human-readable description for log output.

/// Describe the code of an `error:N` line. Returns `None` for lines that do
/// not carry a known numeric code.
pub fn describe_error(line: &str) -> Option<&'static str> {
    let code = code_after(line, "error:")?;
    let text = match code {
        1 => "Expected command letter",
        2 => "Bad number format",
        3 => "Invalid '$' statement",
        4 => "Negative value",
        5 => "Homing not enabled",
        6 => "Step pulse time too short",
        7 => "EEPROM read failed, defaults restored",
        8 => "'$' command requires idle state",
        9 => "G-code locked out during alarm or jog",
        10 => "Soft limits require homing",
        11 => "Line too long",
        12 => "Step rate too high",
        13 => "Safety door opened",
        14 => "Build info or startup line too long",
        15 => "Jog target exceeds machine travel",
        16 => "Invalid jog command",
        17 => "Laser mode requires PWM output",
        20 => "Unsupported g-code command",
        21 => "Modal group violation",
        22 => "Undefined feed rate",
        23 => "Integer value required",
        24 => "Axis words required by two commands",
        25 => "Repeated g-code word",
        26 => "Missing axis words",
        27 => "Invalid line number",
        28 => "Missing P or L value",
        29 => "Unsupported work coordinate system",
        30 => "G53 requires G0 or G1",
        31 => "Unused axis words",
        32 => "Arc without axis words in plane",
        33 => "Invalid motion target",
        34 => "Arc radius error",
        35 => "Arc missing offset word",
        36 => "Unused g-code words",
        37 => "Tool length offset axis mismatch",
        38 => "Tool number too large",
        _ => return None,
    };
    Some(text)
}

/// Describe the code of an `ALARM:N` line. Returns `None` for lines that do
/// not carry a known numeric code.
pub fn describe_alarm(line: &str) -> Option<&'static str> {
    let code = code_after(line, "alarm:")?;
    let text = match code {
        1 => "Hard limit triggered",
        2 => "Soft limit exceeded",
        3 => "Reset while in motion",
        4 => "Probe already triggered before cycle",
        5 => "Probe did not make contact",
        6 => "Homing reset",
        7 => "Homing door opened",
        8 => "Homing pull-off failed",
        9 => "Homing switch not found",
        _ => return None,
    };
    Some(text)
}

fn code_after(line: &str, prefix: &str) -> Option<u8> {
    let line = line.trim();
    let head = line.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    line[prefix.len()..].trim().parse().ok()
}
