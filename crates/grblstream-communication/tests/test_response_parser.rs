use grblstream_communication::firmware::grbl::{describe_error, GrblLineClassifier};
use grblstream_communication::{ControllerMessage, LineClassifier};
use grblstream_core::{Axes, ControllerStatus};

fn classify(line: &str) -> Vec<ControllerMessage> {
    GrblLineClassifier::new().classify(line)
}

#[test]
fn test_parse_ok() {
    assert_eq!(classify("ok"), vec![ControllerMessage::Ok]);
    assert_eq!(classify("  ok\r"), vec![ControllerMessage::Ok]);
}

#[test]
fn test_blank_line_yields_nothing() {
    assert!(classify("").is_empty());
    assert!(classify("   ").is_empty());
}

#[test]
fn test_parse_error() {
    assert_eq!(
        classify("error:9"),
        vec![ControllerMessage::Error("error:9".to_string())]
    );
    assert_eq!(
        describe_error("error:9"),
        Some("G-code locked out during alarm or jog")
    );
}

#[test]
fn test_parse_alarm() {
    assert_eq!(
        classify("ALARM:1"),
        vec![ControllerMessage::Alarm("ALARM:1".to_string())]
    );
    assert_eq!(
        classify("alarm:6"),
        vec![ControllerMessage::Alarm("alarm:6".to_string())]
    );
}

#[test]
fn test_parse_banner() {
    assert_eq!(
        classify("Grbl 1.1h ['$' for help]"),
        vec![ControllerMessage::Ready {
            identification: "Grbl 1.1h ['$' for help]".to_string()
        }]
    );
}

#[test]
fn test_parse_status_report() {
    let messages = classify("<Run|MPos:10.000,5.000,-1.000|FS:500,0|WCO:2.000,1.000,0.000>");

    assert_eq!(
        messages[0],
        ControllerMessage::State {
            status: ControllerStatus::Run,
            substate: None
        }
    );

    match &messages[1] {
        ControllerMessage::Position(report) => {
            assert_eq!(report.machine, Some(Axes::new(10.0, 5.0, -1.0)));
            assert_eq!(report.work, None);
            assert_eq!(report.work_coordinate_offset, Some(Axes::new(2.0, 1.0, 0.0)));
        }
        other => panic!("expected position, got {:?}", other),
    }

    assert_eq!(messages[2], ControllerMessage::ProbeStatus(false));
}

#[test]
fn test_parse_door_status() {
    let messages = classify("<Door:0|WPos:0.000,0.000,0.000>");
    assert_eq!(
        messages[0],
        ControllerMessage::State {
            status: ControllerStatus::Door,
            substate: Some("0".to_string())
        }
    );
}

#[test]
fn test_parse_setting() {
    assert_eq!(
        classify("$110=500.000"),
        vec![ControllerMessage::Setting {
            number: 110,
            value: "500.000".to_string()
        }]
    );
    assert_eq!(
        classify("$N0="),
        vec![ControllerMessage::Unknown("$N0=".to_string())]
    );
}

#[test]
fn test_parse_feedback_messages() {
    assert_eq!(
        classify("[echo:G1X10]"),
        vec![ControllerMessage::Echo("G1X10".to_string())]
    );
    assert_eq!(
        classify("[VER:1.1h.20190825:]"),
        vec![ControllerMessage::BuildInfo("[VER:1.1h.20190825:]".to_string())]
    );
    assert_eq!(
        classify("[MSG:Caution: Unlocked]"),
        vec![ControllerMessage::Unknown("[MSG:Caution: Unlocked]".to_string())]
    );
}

#[test]
fn test_unrecognized_line() {
    assert_eq!(
        classify("garbage"),
        vec![ControllerMessage::Unknown("garbage".to_string())]
    );
}
