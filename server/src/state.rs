//! Deduplication, acknowledgment replay, and in-order delivery.
//!
//! `ServerState` is owned by a single task (the server runs no internal
//! concurrency, per the spec's single-task model) so it needs no lock.
//! `handle_datagram` is a pure state transition: it takes the previous
//! state, a received payload, and the current time, and returns the list
//! of actions (replies to send, deliveries to report, events to log) the
//! caller should perform. This keeps the reliability logic testable
//! without a real socket.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use shared::frame::Frame;

pub const CACHE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub enum ServerAction {
    /// Send `bytes` back to `to`.
    Reply { bytes: Vec<u8>, to: SocketAddr },
    /// A payload was delivered in order; report it (e.g. print it).
    Delivered { seq: u64, payload: String },
    /// A protocol event worth logging, named per the event taxonomy.
    Log { event: &'static str, detail: String },
}

fn ack_bytes(seq: u64) -> Vec<u8> {
    Frame::Ack { seq }.encode().into_bytes()
}

pub struct ServerState {
    pub expected_sequence: u64,
    pub last_acknowledged: u64,
    ack_cache: HashMap<u64, (Vec<u8>, Instant)>,
    delivered: HashSet<u64>,
    reorder_buffer: HashMap<u64, (String, SocketAddr, Instant)>,
    cache_timeout: Duration,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    pub fn new() -> Self {
        Self::with_cache_timeout(CACHE_TIMEOUT)
    }

    /// Test/tuning constructor: §9 calls for the cache window to be
    /// configurable rather than a hardcoded constant.
    pub fn with_cache_timeout(cache_timeout: Duration) -> Self {
        ServerState {
            expected_sequence: 1,
            last_acknowledged: 0,
            ack_cache: HashMap::new(),
            delivered: HashSet::new(),
            reorder_buffer: HashMap::new(),
            cache_timeout,
        }
    }

    pub fn was_delivered(&self, seq: u64) -> bool {
        self.delivered.contains(&seq)
    }

    fn reset(&mut self) {
        self.expected_sequence = 1;
        self.last_acknowledged = 0;
        self.ack_cache.clear();
        self.delivered.clear();
        self.reorder_buffer.clear();
    }

    fn prune_expired_acks(&mut self, now: Instant) {
        let timeout = self.cache_timeout;
        self.ack_cache
            .retain(|_, (_, cached_at)| now.duration_since(*cached_at) < timeout);
    }

    fn deliver_and_ack(&mut self, seq: u64, payload: String, peer: SocketAddr, now: Instant, out: &mut Vec<ServerAction>) {
        out.push(ServerAction::Delivered {
            seq,
            payload: payload.clone(),
        });
        let bytes = ack_bytes(seq);
        out.push(ServerAction::Reply {
            bytes: bytes.clone(),
            to: peer,
        });
        self.ack_cache.insert(seq, (bytes, now));
        self.delivered.insert(seq);
        self.last_acknowledged = seq;
        self.expected_sequence = seq + 1;
        out.push(ServerAction::Log {
            event: "Acknowledged",
            detail: format!("seq {seq} to {peer}"),
        });
    }

    fn drain_reorder_buffer(&mut self, out: &mut Vec<ServerAction>) {
        while let Some((payload, buffered_peer, receive_time)) =
            self.reorder_buffer.remove(&self.expected_sequence)
        {
            let seq = self.expected_sequence;
            self.deliver_and_ack(seq, payload, buffered_peer, receive_time, out);
        }
    }

    /// Processes one received datagram, returning the actions to perform.
    pub fn handle_datagram(&mut self, payload: &str, peer: SocketAddr, now: Instant) -> Vec<ServerAction> {
        let mut actions = Vec::new();

        if payload.is_empty() {
            return actions;
        }

        self.prune_expired_acks(now);

        let frame = match Frame::parse(payload) {
            Ok(frame) => frame,
            Err(_) => return actions,
        };

        match frame {
            Frame::Terminate => {
                self.reset();
                actions.push(ServerAction::Log {
                    event: "Terminate",
                    detail: format!("session reset at request of {peer}"),
                });
            }
            Frame::ResendAck { seq } => {
                if let Some((bytes, _)) = self.ack_cache.get(&seq) {
                    actions.push(ServerAction::Reply {
                        bytes: bytes.clone(),
                        to: peer,
                    });
                }
                // Unknown seq: silently ignore per spec.
            }
            Frame::Ack { .. } => {
                // Servers never receive plain ACKs in this protocol; ignore.
            }
            Frame::Data { seq, payload } => {
                if let Some((bytes, _)) = self.ack_cache.get(&seq) {
                    actions.push(ServerAction::Log {
                        event: "Duplicate",
                        detail: format!("seq {seq} from {peer}, replaying cached ack"),
                    });
                    actions.push(ServerAction::Reply {
                        bytes: bytes.clone(),
                        to: peer,
                    });
                    return actions;
                }

                if seq <= self.last_acknowledged {
                    // Duplicate under the stricter rule: cache already expired.
                    actions.push(ServerAction::Log {
                        event: "Duplicate",
                        detail: format!("seq {seq} from {peer}, no cached ack to replay"),
                    });
                    return actions;
                }

                if seq > self.expected_sequence {
                    self.reorder_buffer.insert(seq, (payload.clone(), peer, now));
                    actions.push(ServerAction::Log {
                        event: "Out-of-Order",
                        detail: format!(
                            "seq {seq} buffered, expected {}",
                            self.expected_sequence
                        ),
                    });
                    return actions;
                }

                // seq == expected_sequence: in-order delivery.
                self.deliver_and_ack(seq, payload, peer, now, &mut actions);
                self.drain_reorder_buffer(&mut actions);
            }
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn peer() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 40000)
    }

    #[test]
    fn in_order_delivery_acks_and_advances() {
        let mut state = ServerState::new();
        let actions = state.handle_datagram("1:hello", peer(), Instant::now());
        assert!(actions
            .iter()
            .any(|a| matches!(a, ServerAction::Delivered { seq: 1, .. })));
        assert!(actions.iter().any(|a| matches!(a,
            ServerAction::Reply { bytes, .. } if bytes == b"ACK:1"
        )));
        assert_eq!(state.expected_sequence, 2);
        assert_eq!(state.last_acknowledged, 1);
    }

    #[test]
    fn duplicate_in_cache_window_replays_ack_without_redelivery() {
        let mut state = ServerState::new();
        state.handle_datagram("1:hello", peer(), Instant::now());
        let actions = state.handle_datagram("1:hello", peer(), Instant::now());
        assert!(!actions
            .iter()
            .any(|a| matches!(a, ServerAction::Delivered { .. })));
        assert!(actions.iter().any(|a| matches!(a,
            ServerAction::Reply { bytes, .. } if bytes == b"ACK:1"
        )));
    }

    #[test]
    fn out_of_order_is_buffered_without_ack() {
        let mut state = ServerState::new();
        let actions = state.handle_datagram("2:world", peer(), Instant::now());
        assert!(!actions.iter().any(|a| matches!(a, ServerAction::Reply { .. })));
        assert_eq!(state.expected_sequence, 1);
    }

    #[test]
    fn reorder_buffer_drains_on_gap_fill() {
        let mut state = ServerState::new();
        state.handle_datagram("2:world", peer(), Instant::now());
        let actions = state.handle_datagram("1:hello", peer(), Instant::now());
        let delivered: Vec<u64> = actions
            .iter()
            .filter_map(|a| match a {
                ServerAction::Delivered { seq, .. } => Some(*seq),
                _ => None,
            })
            .collect();
        assert_eq!(delivered, vec![1, 2]);
        assert_eq!(state.expected_sequence, 3);
        assert_eq!(state.last_acknowledged, 2);
    }

    #[test]
    fn terminate_resets_all_state() {
        let mut state = ServerState::new();
        state.handle_datagram("1:hi", peer(), Instant::now());
        state.handle_datagram("TERMINATE", peer(), Instant::now());
        assert_eq!(state.expected_sequence, 1);
        assert_eq!(state.last_acknowledged, 0);
        assert!(!state.was_delivered(1));

        let actions = state.handle_datagram("1:again", peer(), Instant::now());
        assert!(actions
            .iter()
            .any(|a| matches!(a, ServerAction::Delivered { seq: 1, .. })));
        assert_eq!(state.expected_sequence, 2);
    }

    #[test]
    fn resend_ack_replays_cached_ack() {
        let mut state = ServerState::new();
        state.handle_datagram("1:hi", peer(), Instant::now());
        let actions = state.handle_datagram("RESEND_ACK:1", peer(), Instant::now());
        assert_eq!(actions.len(), 1);
        assert!(matches!(&actions[0], ServerAction::Reply { bytes, .. } if bytes == b"ACK:1"));
    }

    #[test]
    fn resend_ack_for_unknown_seq_is_ignored() {
        let mut state = ServerState::new();
        let actions = state.handle_datagram("RESEND_ACK:99", peer(), Instant::now());
        assert!(actions.is_empty());
    }

    #[test]
    fn empty_payload_is_ignored() {
        let mut state = ServerState::new();
        let actions = state.handle_datagram("", peer(), Instant::now());
        assert!(actions.is_empty());
    }

    #[test]
    fn malformed_payload_is_ignored() {
        let mut state = ServerState::new();
        let actions = state.handle_datagram("not-a-frame", peer(), Instant::now());
        assert!(actions.is_empty());
    }

    #[test]
    fn ack_cache_expires_after_timeout() {
        let mut state = ServerState::with_cache_timeout(Duration::from_millis(10));
        let t0 = Instant::now();
        state.handle_datagram("1:hi", peer(), t0);
        let later = t0 + Duration::from_millis(50);
        // Retransmission of seq 1 after the cache window: treated as a
        // duplicate below last_acknowledged, dropped silently (no cached ack).
        let actions = state.handle_datagram("1:hi", peer(), later);
        assert!(!actions.iter().any(|a| matches!(a, ServerAction::Reply { .. })));
        assert!(!actions.iter().any(|a| matches!(a, ServerAction::Delivered { .. })));
    }

    #[test]
    fn duplicate_below_last_acknowledged_without_cache_is_dropped() {
        let mut state = ServerState::new();
        state.handle_datagram("1:hi", peer(), Instant::now());
        state.ack_cache_clear_for_test();
        let actions = state.handle_datagram("1:hi", peer(), Instant::now());
        assert!(actions.is_empty());
    }

    impl ServerState {
        fn ack_cache_clear_for_test(&mut self) {
            self.ack_cache.clear();
        }
    }
}
