//! GRBL Response Parser
//!
//! Classifies GRBL 1.1 output lines: acknowledgments, errors, alarms, the
//! startup banner, status reports, probe results, echo lines, build info and
//! settings.

use crate::firmware::{parse_axes, ControllerMessage, LineClassifier};
use grblstream_core::{ControllerStatus, PositionReport, ProbeResult};

/// GRBL 1.1 line classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct GrblLineClassifier;

impl GrblLineClassifier {
    /// Create a new classifier
    pub fn new() -> Self {
        Self
    }

    /// Parse a status report body (without the angle brackets)
    fn parse_status_report(&self, body: &str) -> Vec<ControllerMessage> {
        let mut parts = body.split('|');

        let state = parts.next().unwrap_or_default().trim();
        let (word, substate) = match state.split_once(':') {
            Some((word, sub)) => (word, Some(sub.to_string())),
            None => (state, None),
        };

        let mut messages = vec![ControllerMessage::State {
            status: ControllerStatus::from_word(word),
            substate,
        }];

        let mut position = PositionReport::default();
        let mut probe_triggered = false;

        for part in parts {
            let part = part.trim();

            if let Some(pos_str) = part.strip_prefix("MPos:") {
                position.machine = parse_axes(pos_str);
            } else if let Some(pos_str) = part.strip_prefix("WPos:") {
                position.work = parse_axes(pos_str);
            } else if let Some(offset_str) = part.strip_prefix("WCO:") {
                position.work_coordinate_offset = parse_axes(offset_str);
            } else if let Some(pins) = part.strip_prefix("Pn:") {
                probe_triggered = pins.contains('P');
            }
        }

        if position != PositionReport::default() {
            messages.push(ControllerMessage::Position(position));
        }
        messages.push(ControllerMessage::ProbeStatus(probe_triggered));
        messages
    }

    /// Parse a `[...]` feedback message body
    fn parse_feedback(&self, line: &str, body: &str) -> ControllerMessage {
        if let Some(probe) = body.strip_prefix("PRB:") {
            let (coords, success) = probe.rsplit_once(':').unwrap_or((probe, "0"));
            if let Some(position) = parse_axes(coords) {
                return ControllerMessage::ProbeResult(ProbeResult {
                    position,
                    success: success.trim() == "1",
                });
            }
        } else if let Some(echoed) = body.strip_prefix("echo:") {
            return ControllerMessage::Echo(echoed.to_string());
        } else if body.starts_with("VER:") || body.starts_with("OPT:") {
            return ControllerMessage::BuildInfo(line.to_string());
        }
        ControllerMessage::Unknown(line.to_string())
    }

    /// Parse a setting response (`$n=value`)
    fn parse_setting(&self, line: &str) -> Option<ControllerMessage> {
        let (number, value) = line.strip_prefix('$')?.split_once('=')?;
        let number = number.trim().parse::<u16>().ok()?;
        Some(ControllerMessage::Setting {
            number,
            value: value.trim().to_string(),
        })
    }
}

impl LineClassifier for GrblLineClassifier {
    fn classify(&self, line: &str) -> Vec<ControllerMessage> {
        let line = line.trim();

        if line.is_empty() {
            return Vec::new();
        }

        if line == "ok" {
            return vec![ControllerMessage::Ok];
        }

        if line.starts_with("error:") {
            return vec![ControllerMessage::Error(line.to_string())];
        }

        if line
            .get(..6)
            .is_some_and(|head| head.eq_ignore_ascii_case("alarm:"))
        {
            return vec![ControllerMessage::Alarm(line.to_string())];
        }

        if line.starts_with("Grbl ") {
            return vec![ControllerMessage::Ready {
                identification: line.to_string(),
            }];
        }

        if let Some(body) = line.strip_prefix('<').and_then(|l| l.strip_suffix('>')) {
            return self.parse_status_report(body);
        }

        if let Some(body) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            return vec![self.parse_feedback(line, body)];
        }

        if line.starts_with('$') {
            if let Some(setting) = self.parse_setting(line) {
                return vec![setting];
            }
        }

        vec![ControllerMessage::Unknown(line.to_string())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grblstream_core::Axes;

    #[test]
    fn test_substate_is_split_off() {
        let messages = GrblLineClassifier::new().classify("<Hold:1|MPos:0.000,0.000,0.000>");
        assert_eq!(
            messages[0],
            ControllerMessage::State {
                status: ControllerStatus::Hold,
                substate: Some("1".to_string()),
            }
        );
    }

    #[test]
    fn test_probe_pin() {
        let classifier = GrblLineClassifier::new();
        let messages = classifier.classify("<Idle|MPos:1,2,3|FS:0,0|Pn:PZ>");
        assert_eq!(messages.last(), Some(&ControllerMessage::ProbeStatus(true)));

        let messages = classifier.classify("<Idle|MPos:1,2,3|FS:0,0>");
        assert_eq!(messages.last(), Some(&ControllerMessage::ProbeStatus(false)));
    }

    #[test]
    fn test_probe_result() {
        let messages = GrblLineClassifier::new().classify("[PRB:1.000,2.000,-3.500:1]");
        assert_eq!(
            messages,
            vec![ControllerMessage::ProbeResult(ProbeResult {
                position: Axes::new(1.0, 2.0, -3.5),
                success: true,
            })]
        );
    }
}
