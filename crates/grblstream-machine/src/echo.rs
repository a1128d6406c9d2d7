//! Echo resynchronization ledger
//!
//! With echo enabled the controller repeats every line it receives as
//! `[echo:...]`, with whitespace removed. The ledger holds the lines sent but
//! not yet echoed so drops and merges in the serial stream can be spotted and
//! stepped over.

use std::collections::VecDeque;

/// Number of raw echo lines kept for diagnostics
pub const ECHO_RING_SIZE: usize = 10;

/// Result of matching one echo against the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoOutcome {
    /// The echo matched the oldest sent line
    Matched,
    /// The echo matched a later line; the mismatched head and the
    /// `dropped` entries before the match were discarded
    Resynced {
        /// Lines the controller appears to have dropped or combined
        dropped: usize,
    },
    /// The echo matched nothing; only the head was consumed
    Mismatch {
        /// What the head of the ledger held
        expected: String,
    },
    /// The ledger was empty
    Unexpected,
}

fn normalize(line: &str) -> String {
    line.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Sent lines awaiting echo plus a ring of recent echoes
#[derive(Debug, Clone, Default)]
pub struct EchoLedger {
    sent: VecDeque<String>,
    ring: VecDeque<String>,
}

impl EchoLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a line about to be written
    pub fn record_sent(&mut self, line: &str) {
        self.sent.push_back(normalize(line));
    }

    /// Remember a raw echo line in the diagnostic ring
    pub fn remember(&mut self, echoed: &str) {
        self.ring.push_back(echoed.to_string());
        if self.ring.len() > ECHO_RING_SIZE {
            self.ring.pop_front();
        }
    }

    /// Match an echo against the oldest sent line, scanning ahead on a
    /// mismatch.
    pub fn reconcile(&mut self, echoed: &str) -> EchoOutcome {
        let Some(expected) = self.sent.pop_front() else {
            return EchoOutcome::Unexpected;
        };

        let received = normalize(echoed);
        if received == expected {
            return EchoOutcome::Matched;
        }

        match self.sent.iter().position(|line| *line == received) {
            Some(index) => {
                self.sent.drain(..=index);
                EchoOutcome::Resynced { dropped: index + 1 }
            }
            None => EchoOutcome::Mismatch { expected },
        }
    }

    /// Lines awaiting echo, oldest first
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.sent.iter().map(String::as_str)
    }

    /// Recent echo lines, oldest first
    pub fn ring(&self) -> impl Iterator<Item = &str> {
        self.ring.iter().map(String::as_str)
    }

    /// Whether nothing is awaiting echo
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }

    /// Forget sent lines only
    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }

    /// Forget sent lines and the ring
    pub fn clear(&mut self) {
        self.sent.clear();
        self.ring.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_ignores_whitespace() {
        let mut ledger = EchoLedger::new();
        ledger.record_sent("G1 X10 Y5");
        assert_eq!(ledger.reconcile("G1X10Y5"), EchoOutcome::Matched);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_resync_skips_dropped_lines() {
        let mut ledger = EchoLedger::new();
        for line in ["G1X1", "G1Y1", "G1Z1"] {
            ledger.record_sent(line);
        }

        assert_eq!(
            ledger.reconcile("G1Z1"),
            EchoOutcome::Resynced { dropped: 2 }
        );
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_bare_mismatch_consumes_only_head() {
        let mut ledger = EchoLedger::new();
        ledger.record_sent("G1 X1");
        ledger.record_sent("G1 Y1");

        assert_eq!(
            ledger.reconcile("M5"),
            EchoOutcome::Mismatch {
                expected: "G1X1".to_string()
            }
        );
        assert_eq!(ledger.pending().collect::<Vec<_>>(), vec!["G1Y1"]);
    }

    #[test]
    fn test_empty_ledger() {
        let mut ledger = EchoLedger::new();
        assert_eq!(ledger.reconcile("G0X0"), EchoOutcome::Unexpected);
    }

    #[test]
    fn test_ring_is_bounded() {
        let mut ledger = EchoLedger::new();
        for i in 0..15 {
            ledger.remember(&format!("N{}", i));
        }

        let ring: Vec<&str> = ledger.ring().collect();
        assert_eq!(ring.len(), ECHO_RING_SIZE);
        assert_eq!(ring[0], "N5");
        assert_eq!(ring[9], "N14");
    }
}
