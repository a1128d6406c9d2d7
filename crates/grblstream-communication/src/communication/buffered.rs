//! Two-lane command queue with byte-budgeted flow control
//!
//! Implements the GRBL character-counting streaming protocol: commands wait
//! in a console lane or a job lane, are admitted into the in-flight buffer
//! while the controller's receive buffer has room, and leave it in FIFO
//! order as the controller acknowledges them.
//!
//! The queue never writes anything itself. [`CommandQueue::admit_next`] hands
//! the caller each admitted command so it can be written to the transport.

use std::collections::VecDeque;

/// Size of the GRBL serial receive buffer, less one byte of headroom
pub const DEFAULT_BYTE_BUDGET: usize = 127;

/// Input lane a command is queued on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    /// Commands from clients and internal instructions, always sent first
    Console,
    /// Lines of the running job
    Job,
}

/// Configuration for the command queue
#[derive(Debug, Clone)]
pub struct CommandQueueConfig {
    /// Maximum bytes in flight, counting one newline per command
    pub byte_budget: usize,
}

impl Default for CommandQueueConfig {
    fn default() -> Self {
        Self {
            byte_budget: DEFAULT_BYTE_BUDGET,
        }
    }
}

/// Console and job lanes feeding a flow-controlled in-flight buffer
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    config: CommandQueueConfig,
    console: VecDeque<String>,
    job: VecDeque<String>,
    in_flight: VecDeque<String>,
    /// Bytes of `in_flight` joined by newline plus a trailing newline
    in_flight_bytes: usize,
}

impl CommandQueue {
    /// Create an empty queue
    pub fn new(config: CommandQueueConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Append a command to a lane
    pub fn enqueue(&mut self, command: impl Into<String>, lane: Lane) {
        let command = command.into();
        match lane {
            Lane::Console => self.console.push_back(command),
            Lane::Job => self.job.push_back(command),
        }
    }

    /// Replace the job lane with `lines`
    pub fn load_job<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.job.clear();
        self.job.extend(lines.into_iter().map(Into::into));
    }

    /// The command that would be admitted next, console lane first
    pub fn next_command(&self) -> Option<&str> {
        self.console
            .front()
            .or_else(|| self.job.front())
            .map(String::as_str)
    }

    /// Check if there is room in the controller buffer for a command
    fn has_room_in_buffer(&self, command_size: usize) -> bool {
        let used_space = self.in_flight_bytes + command_size + 1; // +1 for newline
        used_space <= self.config.byte_budget
    }

    /// Whether the next command fits in the remaining budget
    pub fn next_fits(&self) -> bool {
        self.next_command()
            .is_some_and(|command| self.has_room_in_buffer(command.len()))
    }

    /// Move the next command into the in-flight buffer if it fits.
    ///
    /// Returns the admitted command for the caller to write. Returns `None`
    /// when both lanes are empty or the next command would overflow the
    /// budget; a command that does not fit is left at the head of its lane.
    pub fn admit_next(&mut self) -> Option<String> {
        if !self.next_fits() {
            return None;
        }

        let command = match self.console.pop_front() {
            Some(command) => command,
            None => self.job.pop_front()?,
        };

        self.in_flight_bytes += command.len() + 1;
        self.in_flight.push_back(command.clone());
        Some(command)
    }

    /// Pop the oldest in-flight command
    pub fn acknowledge(&mut self) -> Option<String> {
        let command = self.in_flight.pop_front()?;
        self.in_flight_bytes = self.in_flight_bytes.saturating_sub(command.len() + 1);
        Some(command)
    }

    /// Oldest in-flight command, the one the next acknowledgment is for
    pub fn oldest_in_flight(&self) -> Option<&str> {
        self.in_flight.front().map(String::as_str)
    }

    /// Commands written but not yet acknowledged, oldest first
    pub fn in_flight(&self) -> impl Iterator<Item = &str> {
        self.in_flight.iter().map(String::as_str)
    }

    /// Number of commands in flight
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Bytes in flight, one newline per command included
    pub fn in_flight_bytes(&self) -> usize {
        self.in_flight_bytes
    }

    /// Commands waiting on the console lane
    pub fn console_len(&self) -> usize {
        self.console.len()
    }

    /// Lines waiting on the job lane
    pub fn job_len(&self) -> usize {
        self.job.len()
    }

    /// In-flight plus both lanes
    pub fn unprocessed_count(&self) -> usize {
        self.in_flight.len() + self.console.len() + self.job.len()
    }

    /// Nothing queued and nothing in flight
    pub fn is_empty(&self) -> bool {
        self.unprocessed_count() == 0
    }

    /// Discard both lanes and the in-flight buffer
    pub fn clear(&mut self) {
        self.console.clear();
        self.job.clear();
        self.in_flight.clear();
        self.in_flight_bytes = 0;
    }

    /// The configured byte budget
    pub fn byte_budget(&self) -> usize {
        self.config.byte_budget
    }

    /// Get the current buffer usage as a percentage
    pub fn buffer_usage_percent(&self) -> u32 {
        if self.config.byte_budget == 0 {
            return 0;
        }

        ((self.in_flight_bytes as f64 / self.config.byte_budget as f64) * 100.0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_bytes_match_joined_length() {
        let mut queue = CommandQueue::default();
        queue.load_job(["G1 X10", "G1 Y10", "M5"]);
        while queue.admit_next().is_some() {}

        let joined: String = queue.in_flight().map(|c| format!("{}\n", c)).collect();
        assert_eq!(queue.in_flight_bytes(), joined.len());
        assert_eq!(queue.in_flight_bytes(), 17);
    }

    #[test]
    fn test_multibyte_commands_counted_in_bytes() {
        let mut queue = CommandQueue::new(CommandQueueConfig { byte_budget: 8 });
        queue.enqueue("(µm)", Lane::Console);
        queue.enqueue("X", Lane::Console);

        // "(µm)" is five bytes, six with its newline
        assert!(queue.admit_next().is_some());
        assert_eq!(queue.in_flight_bytes(), 6);
        assert!(queue.admit_next().is_some());
        assert_eq!(queue.in_flight_bytes(), 8);
    }

    #[test]
    fn test_oversized_command_stays_queued() {
        let mut queue = CommandQueue::default();
        queue.enqueue("X".repeat(DEFAULT_BYTE_BUDGET), Lane::Job);

        assert!(!queue.next_fits());
        assert!(queue.admit_next().is_none());
        assert_eq!(queue.job_len(), 1);
    }

    #[test]
    fn test_buffer_usage_percent() {
        let mut queue = CommandQueue::new(CommandQueueConfig { byte_budget: 100 });
        queue.enqueue("X".repeat(49), Lane::Console);
        queue.admit_next();
        assert_eq!(queue.buffer_usage_percent(), 50);
    }
}
