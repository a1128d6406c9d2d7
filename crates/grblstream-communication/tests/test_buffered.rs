use grblstream_communication::{CommandQueue, CommandQueueConfig, Lane, DEFAULT_BYTE_BUDGET};
use proptest::prelude::*;

fn drain(queue: &mut CommandQueue) -> Vec<String> {
    let mut written = Vec::new();
    while let Some(command) = queue.admit_next() {
        written.push(command);
    }
    written
}

#[test]
fn test_queueing() {
    let mut queue = CommandQueue::default();

    queue.enqueue("G0 X0 Y0", Lane::Job);
    queue.enqueue("G1 X10 Y10", Lane::Job);
    queue.enqueue("$$", Lane::Console);

    assert_eq!(queue.job_len(), 2);
    assert_eq!(queue.console_len(), 1);
    assert_eq!(queue.unprocessed_count(), 3);
    assert_eq!(queue.next_command(), Some("$$"));
}

#[test]
fn test_streaming_respects_budget() {
    let mut queue = CommandQueue::new(CommandQueueConfig { byte_budget: 20 });

    // 10 bytes each counting the newline
    queue.enqueue("G1 X10 Y1", Lane::Job);
    queue.enqueue("G1 X10 Y2", Lane::Job);
    queue.enqueue("G1 X10 Y3", Lane::Job);

    let written = drain(&mut queue);
    assert_eq!(written, vec!["G1 X10 Y1", "G1 X10 Y2"]);
    assert_eq!(queue.in_flight_bytes(), 20);
    assert_eq!(queue.job_len(), 1);
}

#[test]
fn test_acknowledgment_frees_room() {
    let mut queue = CommandQueue::new(CommandQueueConfig { byte_budget: 20 });
    queue.load_job(["G1 X10 Y1", "G1 X10 Y2", "G1 X10 Y3"]);
    drain(&mut queue);

    assert_eq!(queue.acknowledge().as_deref(), Some("G1 X10 Y1"));
    assert_eq!(queue.in_flight_bytes(), 10);

    assert_eq!(drain(&mut queue), vec!["G1 X10 Y3"]);
    assert_eq!(queue.oldest_in_flight(), Some("G1 X10 Y2"));
}

#[test]
fn test_acknowledge_on_empty_buffer() {
    let mut queue = CommandQueue::default();
    assert_eq!(queue.acknowledge(), None);
    assert_eq!(queue.in_flight_bytes(), 0);
}

#[test]
fn test_console_lane_jumps_job_lane() {
    let mut queue = CommandQueue::default();
    queue.load_job(["G1 X1", "G1 X2"]);
    queue.enqueue("?", Lane::Console);

    assert_eq!(queue.admit_next().as_deref(), Some("?"));
    queue.enqueue("$G", Lane::Console);
    assert_eq!(queue.admit_next().as_deref(), Some("$G"));
    assert_eq!(queue.admit_next().as_deref(), Some("G1 X1"));
}

#[test]
fn test_three_line_job_fits_at_once() {
    let mut queue = CommandQueue::default();
    queue.load_job(["G1 X10", "G1 Y10", "M5"]);

    assert_eq!(drain(&mut queue).len(), 3);
    assert_eq!(queue.in_flight_bytes(), 17);
    assert_eq!(queue.unprocessed_count(), 3);
}

#[test]
fn test_two_hundred_single_character_commands() {
    let mut queue = CommandQueue::default();
    queue.load_job(std::iter::repeat("G").take(200));

    let written = drain(&mut queue);
    assert_eq!(written.len(), 63);
    assert_eq!(queue.in_flight_bytes(), 126);
    assert_eq!(queue.job_len(), 137);
}

#[test]
fn test_clear_queue() {
    let mut queue = CommandQueue::default();
    queue.load_job(["G1 X1", "G1 X2"]);
    queue.enqueue("$X", Lane::Console);
    queue.admit_next();

    queue.clear();

    assert!(queue.is_empty());
    assert_eq!(queue.in_flight_bytes(), 0);
    assert_eq!(queue.in_flight().count(), 0);
    assert_eq!(queue.buffer_usage_percent(), 0);
}

fn command() -> impl Strategy<Value = String> {
    "[ -~]{0,60}"
}

proptest! {
    #[test]
    fn prop_budget_never_exceeded(
        commands in prop::collection::vec((command(), any::<bool>()), 0..80),
        acks in prop::collection::vec(0usize..4, 0..40),
    ) {
        let mut queue = CommandQueue::default();
        for (text, console) in &commands {
            queue.enqueue(text.clone(), if *console { Lane::Console } else { Lane::Job });
        }

        drain(&mut queue);
        for n in acks {
            for _ in 0..n {
                queue.acknowledge();
            }
            drain(&mut queue);

            let joined: String = queue.in_flight().map(|c| format!("{}\n", c)).collect();
            prop_assert_eq!(joined.len(), queue.in_flight_bytes());
            prop_assert!(queue.in_flight_bytes() <= DEFAULT_BYTE_BUDGET);
        }
    }

    #[test]
    fn prop_console_lane_has_priority(
        job in prop::collection::vec(command(), 1..20),
        console in prop::collection::vec(command(), 1..20),
    ) {
        let mut queue = CommandQueue::new(CommandQueueConfig { byte_budget: usize::MAX });
        queue.load_job(job.clone());
        for text in &console {
            queue.enqueue(text.clone(), Lane::Console);
        }

        let written = drain(&mut queue);
        let expected: Vec<String> = console.into_iter().chain(job).collect();
        prop_assert_eq!(written, expected);
    }
}

#[test]
fn test_load_job_replaces_previous_job() {
    let mut queue = CommandQueue::default();
    queue.load_job(["G1 X1", "G1 X2"]);
    queue.enqueue("$X", Lane::Console);
    queue.load_job(["M5"]);

    assert_eq!(queue.job_len(), 1);
    assert_eq!(queue.console_len(), 1);
}
