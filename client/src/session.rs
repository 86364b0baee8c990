//! Stop-and-wait sending: one in-flight datagram at a time, retried with
//! a fixed timeout until acknowledged or the retry budget is exhausted.

use std::time::{Duration, Instant};

use shared::frame::Frame;

pub const MAX_RETRIES: u8 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Acknowledged; `attempts` is the total number of datagrams sent
    /// (1 if acknowledged on the first try), `latency` is measured from
    /// the very first send, not the last retransmission.
    Acknowledged { attempts: u32, latency: Duration },
    /// The retry budget was exhausted without an acknowledgment.
    Exhausted { attempts: u32 },
}

/// Tracks the next sequence number to assign to outgoing data.
pub struct ClientSession {
    next_seq: u64,
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSession {
    pub fn new() -> Self {
        ClientSession { next_seq: 1 }
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Builds the data frame for the next message, without yet committing
    /// to having sent it (the caller advances the sequence on completion).
    pub fn encode_next(&self, payload: &str) -> (u64, Vec<u8>) {
        let seq = self.next_seq;
        let bytes = Frame::Data {
            seq,
            payload: payload.to_string(),
        }
        .encode()
        .into_bytes();
        (seq, bytes)
    }

    /// Whatever happened on this attempt, the session always moves on to
    /// the next sequence number: a retry budget that runs out still frees
    /// up the slot rather than wedging the client forever.
    pub fn advance(&mut self) {
        self.next_seq += 1;
    }

    /// Decides whether a freshly-received ACK acknowledges the frame sent
    /// at sequence `seq`. Stale or future ACKs are ignored.
    pub fn acks(expected_seq: u64, frame: &Frame) -> bool {
        matches!(frame, Frame::Ack { seq } if *seq == expected_seq)
    }

    pub fn latency_since(sent_at: Instant, now: Instant) -> Duration {
        now.duration_since(sent_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_sequence_one() {
        let session = ClientSession::new();
        assert_eq!(session.next_seq(), 1);
    }

    #[test]
    fn encode_next_does_not_advance() {
        let session = ClientSession::new();
        let (seq, bytes) = session.encode_next("hi");
        assert_eq!(seq, 1);
        assert_eq!(bytes, b"1:hi");
        assert_eq!(session.next_seq(), 1);
    }

    #[test]
    fn advance_moves_to_next_sequence() {
        let mut session = ClientSession::new();
        session.advance();
        assert_eq!(session.next_seq(), 2);
        let (seq, bytes) = session.encode_next("world");
        assert_eq!(seq, 2);
        assert_eq!(bytes, b"2:world");
    }

    #[test]
    fn acks_matches_exact_sequence_only() {
        assert!(ClientSession::acks(3, &Frame::Ack { seq: 3 }));
        assert!(!ClientSession::acks(3, &Frame::Ack { seq: 2 }));
        assert!(!ClientSession::acks(3, &Frame::Terminate));
    }

    #[test]
    fn retry_budget_matches_spec() {
        assert_eq!(MAX_RETRIES, 5);
    }
}
