//! The per-datagram drop/delay decision, kept pure and free of I/O so it
//! can be tested without sockets: the caller supplies the random draws,
//! this function only classifies.

use std::time::Duration;

use shared::config::{Direction, ProxyConfig};
use shared::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ForwardDecision {
    Drop,
    ForwardNow,
    ForwardAfter(Duration),
    /// `TERMINATE`, `RESEND_ACK:*`, and unparseable payloads bypass fault
    /// injection entirely.
    ForwardUnconditional,
}

/// Classifies one already-received datagram. `r_drop` and `r_delay` are
/// independent uniform draws in `[0, 1)`; `delay_ms` is a uniform integer
/// draw already clamped to `config.delay_time(dir)` by the caller.
pub fn forward_one(
    parsed: &Result<Frame, shared::frame::FrameError>,
    dir: Direction,
    config: &ProxyConfig,
    r_drop: f64,
    r_delay: f64,
    delay_ms: u64,
) -> ForwardDecision {
    match parsed {
        Err(_) => return ForwardDecision::ForwardUnconditional,
        Ok(Frame::Terminate) => return ForwardDecision::ForwardUnconditional,
        Ok(Frame::ResendAck { .. }) => return ForwardDecision::ForwardUnconditional,
        Ok(Frame::Data { .. }) | Ok(Frame::Ack { .. }) => {}
    }

    if r_drop < config.drop_chance(dir) {
        return ForwardDecision::Drop;
    }
    if r_delay < config.delay_chance(dir) {
        return ForwardDecision::ForwardAfter(Duration::from_millis(delay_ms));
    }
    ForwardDecision::ForwardNow
}
