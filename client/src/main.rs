mod session;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::time::timeout;

use shared::frame::Frame;
use shared::validation;

use session::{ClientSession, SendOutcome, MAX_RETRIES};

/// Stop-and-wait UDP client: sends one line of input at a time and waits
/// for the matching acknowledgment before moving on to the next.
#[derive(Parser, Debug)]
#[command(name = "client", about = "Reliable-datagram UDP client")]
struct Args {
    /// Server (or proxy) IP address to send to.
    #[arg(long)]
    target_ip: String,

    /// Server (or proxy) port to send to.
    #[arg(long)]
    target_port: u16,

    /// Per-attempt timeout in milliseconds.
    #[arg(long)]
    timeout: u64,
}

async fn send_one(
    socket: &UdpSocket,
    session: &mut ClientSession,
    target: SocketAddr,
    per_attempt_timeout: Duration,
    payload: &str,
) -> std::io::Result<SendOutcome> {
    let (seq, bytes) = session.encode_next(payload);
    let sent_at = Instant::now();
    let mut attempts = 0u32;
    let mut buf = [0u8; 65536];

    loop {
        attempts += 1;
        socket.send_to(&bytes, target).await?;
        shared::logger::log_event("Sent", &format!("seq {seq} (attempt {attempts})"));

        let deadline = Instant::now() + per_attempt_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, socket.recv_from(&mut buf)).await {
                Ok(Ok((len, _from))) => {
                    let text = match std::str::from_utf8(&buf[..len]) {
                        Ok(s) => s,
                        Err(_) => continue,
                    };
                    let frame = match Frame::parse(text) {
                        Ok(f) => f,
                        Err(_) => continue,
                    };
                    if ClientSession::acks(seq, &frame) {
                        let latency = ClientSession::latency_since(sent_at, Instant::now());
                        shared::logger::log_event(
                            "Acknowledged",
                            &format!("seq {seq} after {attempts} attempt(s), {latency:?}"),
                        );
                        session.advance();
                        return Ok(SendOutcome::Acknowledged { attempts, latency });
                    }
                    // Unexpected or stale frame: keep waiting within this attempt.
                }
                Ok(Err(e)) => return Err(e),
                Err(_elapsed) => break,
            }
        }

        if attempts >= MAX_RETRIES as u32 {
            shared::logger::log_event("Failed", &format!("seq {seq} exhausted retry budget"));
            session.advance();
            return Ok(SendOutcome::Exhausted { attempts });
        }
        shared::logger::log_event("Retransmit", &format!("seq {seq}, attempt {}", attempts + 1));
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = validation::validate_ipv4(&args.target_ip) {
        shared::logger::log_error(&format!("{e}"));
        return ExitCode::FAILURE;
    }
    if let Err(e) = validation::validate_port(&args.target_port.to_string()) {
        shared::logger::log_error(&format!("{e}"));
        return ExitCode::FAILURE;
    }
    if args.timeout == 0 {
        shared::logger::log_error("--timeout must be a positive number of milliseconds");
        return ExitCode::FAILURE;
    }

    let target: SocketAddr = match format!("{}:{}", args.target_ip, args.target_port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            shared::logger::log_error(&format!("invalid target address: {e}"));
            return ExitCode::FAILURE;
        }
    };
    let per_attempt_timeout = Duration::from_millis(args.timeout);

    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(s) => s,
        Err(e) => {
            shared::logger::log_error(&format!("failed to bind local socket: {e}"));
            return ExitCode::FAILURE;
        }
    };
    shared::logger::log_success(&format!("sending to {target}"));

    let mut session = ClientSession::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut exit_code = ExitCode::SUCCESS;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(l)) => l,
                    Ok(None) => break,
                    Err(e) => {
                        shared::logger::log_error(&format!("stdin read failed: {e}"));
                        break;
                    }
                };
                if line.trim().eq_ignore_ascii_case("exit") {
                    let _ = socket.send_to(b"TERMINATE", target).await;
                    break;
                }
                match send_one(&socket, &mut session, target, per_attempt_timeout, &line).await {
                    Ok(SendOutcome::Acknowledged { attempts, latency }) => {
                        shared::logger::log_success(&format!(
                            "delivered in {attempts} attempt(s), latency {latency:?}"
                        ));
                    }
                    Ok(SendOutcome::Exhausted { attempts }) => {
                        shared::logger::log_warning(&format!(
                            "gave up after {attempts} attempt(s)"
                        ));
                    }
                    Err(e) => {
                        shared::logger::log_error(&format!("send failed: {e}"));
                        exit_code = ExitCode::FAILURE;
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = socket.send_to(b"TERMINATE", target).await;
                shared::logger::log_info("interrupted, sent best-effort terminate");
                break;
            }
        }
    }

    exit_code
}
