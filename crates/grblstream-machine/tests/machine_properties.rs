use grblstream_communication::{Transport, TransportEvent, DEFAULT_BYTE_BUDGET};
use grblstream_core::Result;
use grblstream_machine::Machine;
use grblstream_settings::MachineConfig;
use proptest::prelude::*;

/// Accepts every write while open
#[derive(Default)]
struct SinkTransport {
    open: bool,
}

impl Transport for SinkTransport {
    fn open(&mut self, _port_name: &str, _config: &MachineConfig) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn write(&mut self, _data: &str) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.open
    }

    fn port_name(&self) -> Option<String> {
        Some("/dev/ttySINK".to_string())
    }
}

fn connected_machine() -> Machine {
    let mut machine = Machine::new(Box::<SinkTransport>::default());
    machine.set_config(
        MachineConfig::new("Sink")
            .with_instruction("status", "?")
            .with_instruction("flush", "\\u24")
            .with_real_time("status")
            .with_real_time("flush"),
    );
    machine
        .init_port("/dev/ttySINK")
        .expect("sink transport always opens");
    machine.handle_transport_event(TransportEvent::Opened);
    machine.handle_line("Grbl 1.1h ['$' for help]");
    machine
}

fn line() -> impl Strategy<Value = String> {
    "G1 X[0-9]{1,40}"
}

#[derive(Debug, Clone)]
enum Step {
    Console(String),
    Job(Vec<String>),
    Ack(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        line().prop_map(Step::Console),
        prop::collection::vec(line(), 0..30).prop_map(Step::Job),
        (1usize..6).prop_map(Step::Ack),
    ]
}

proptest! {
    #[test]
    fn prop_in_flight_bytes_stay_within_budget(steps in prop::collection::vec(step(), 1..60)) {
        let mut machine = connected_machine();
        for step in steps {
            match step {
                Step::Console(command) => machine.enqueue_command(command),
                Step::Job(lines) => machine.stream_gcode_lines(lines, "Random"),
                Step::Ack(n) => {
                    for _ in 0..n {
                        machine.handle_line("ok");
                        prop_assert!(machine.queue().in_flight_bytes() <= DEFAULT_BYTE_BUDGET);
                    }
                }
            }
            prop_assert!(machine.queue().in_flight_bytes() <= DEFAULT_BYTE_BUDGET);
        }
    }

    #[test]
    fn prop_progress_never_falls_and_ends_at_one_hundred(
        lines in prop::collection::vec(line(), 1..80),
    ) {
        let mut machine = connected_machine();
        let total = lines.len();
        machine.stream_gcode_lines(lines, "Random");

        let mut last = machine.percent_complete();
        for _ in 0..total {
            machine.handle_line("ok");
            let percent = machine.percent_complete();
            prop_assert!(percent >= last, "{} fell to {}", last, percent);
            prop_assert_eq!(machine.queue().unprocessed_count() == 0, percent == 100.0);
            last = percent;
        }

        prop_assert_eq!(last, 100.0);
        prop_assert!(!machine.is_running());
    }
}
