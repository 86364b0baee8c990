//! Wire format for the reliable-datagram testbed.
//!
//! Every datagram is a single UTF-8 text frame: `"<seq>:<payload>"`,
//! `"ACK:<seq>"`, `"RESEND_ACK:<seq>"`, or `"TERMINATE"`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data { seq: u64, payload: String },
    Ack { seq: u64 },
    ResendAck { seq: u64 },
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    Empty,
    MissingSeparator,
    InvalidSequence,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Empty => write!(f, "empty frame"),
            FrameError::MissingSeparator => write!(f, "frame missing ':' separator"),
            FrameError::InvalidSequence => write!(f, "frame has a non-numeric sequence number"),
        }
    }
}

impl std::error::Error for FrameError {}

const ACK_PREFIX: &str = "ACK:";
const RESEND_ACK_PREFIX: &str = "RESEND_ACK:";
const TERMINATE: &str = "TERMINATE";

impl Frame {
    /// Parses one datagram's text payload into a `Frame`.
    ///
    /// Only the first `:` is treated as a separator, so a data payload may
    /// itself contain colons.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        if text.is_empty() {
            return Err(FrameError::Empty);
        }
        if text == TERMINATE {
            return Ok(Frame::Terminate);
        }
        if let Some(rest) = text.strip_prefix(ACK_PREFIX) {
            let seq = rest.parse().map_err(|_| FrameError::InvalidSequence)?;
            return Ok(Frame::Ack { seq });
        }
        if let Some(rest) = text.strip_prefix(RESEND_ACK_PREFIX) {
            let seq = rest.parse().map_err(|_| FrameError::InvalidSequence)?;
            return Ok(Frame::ResendAck { seq });
        }
        let (seq_str, payload) = text.split_once(':').ok_or(FrameError::MissingSeparator)?;
        let seq = seq_str.parse().map_err(|_| FrameError::InvalidSequence)?;
        Ok(Frame::Data {
            seq,
            payload: payload.to_string(),
        })
    }

    /// Renders the frame back to its wire text form.
    pub fn encode(&self) -> String {
        match self {
            Frame::Data { seq, payload } => format!("{seq}:{payload}"),
            Frame::Ack { seq } => format!("ACK:{seq}"),
            Frame::ResendAck { seq } => format!("RESEND_ACK:{seq}"),
            Frame::Terminate => TERMINATE.to_string(),
        }
    }

    pub fn seq(&self) -> Option<u64> {
        match self {
            Frame::Data { seq, .. } | Frame::Ack { seq } | Frame::ResendAck { seq } => Some(*seq),
            Frame::Terminate => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_frame() {
        let frame = Frame::parse("1:hello").unwrap();
        assert_eq!(
            frame,
            Frame::Data {
                seq: 1,
                payload: "hello".to_string()
            }
        );
    }

    #[test]
    fn only_first_colon_is_a_separator() {
        let frame = Frame::parse("3:a:b:c").unwrap();
        assert_eq!(
            frame,
            Frame::Data {
                seq: 3,
                payload: "a:b:c".to_string()
            }
        );
    }

    #[test]
    fn parses_ack() {
        assert_eq!(Frame::parse("ACK:42").unwrap(), Frame::Ack { seq: 42 });
    }

    #[test]
    fn parses_resend_ack() {
        assert_eq!(
            Frame::parse("RESEND_ACK:7").unwrap(),
            Frame::ResendAck { seq: 7 }
        );
    }

    #[test]
    fn parses_terminate() {
        assert_eq!(Frame::parse("TERMINATE").unwrap(), Frame::Terminate);
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(Frame::parse("").unwrap_err(), FrameError::Empty);
    }

    #[test]
    fn rejects_missing_separator() {
        assert_eq!(
            Frame::parse("not-a-frame").unwrap_err(),
            FrameError::MissingSeparator
        );
    }

    #[test]
    fn rejects_non_numeric_sequence() {
        assert_eq!(
            Frame::parse("abc:hello").unwrap_err(),
            FrameError::InvalidSequence
        );
    }

    #[test]
    fn roundtrips_data_frame() {
        let frame = Frame::Data {
            seq: 9,
            payload: "payload with : colons".to_string(),
        };
        let encoded = frame.encode();
        assert_eq!(Frame::parse(&encoded).unwrap(), frame);
    }

    #[test]
    fn seq_accessor() {
        assert_eq!(Frame::Terminate.seq(), None);
        assert_eq!(Frame::Ack { seq: 5 }.seq(), Some(5));
    }
}
