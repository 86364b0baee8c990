mod state;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tokio::net::UdpSocket;

use shared::validation;

use state::{ServerAction, ServerState};

/// Reliable-delivery UDP server: deduplicates, reorders, and acknowledges
/// datagrams from a single client session at a time.
#[derive(Parser, Debug)]
#[command(name = "server", about = "Reliable-datagram UDP server")]
struct Args {
    /// IP address to bind to.
    #[arg(long, default_value = "0.0.0.0")]
    listen_ip: String,

    /// Port to bind to.
    #[arg(long, default_value_t = 9000)]
    listen_port: u16,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = validation::validate_ipv4(&args.listen_ip) {
        shared::logger::log_error(&format!("{e}"));
        return ExitCode::FAILURE;
    }
    if validation::is_privileged_port(args.listen_port) {
        shared::logger::log_warning(&format!(
            "port {} is below 1024 and may require elevated privileges to bind",
            args.listen_port
        ));
    }

    let bind_addr: SocketAddr = match format!("{}:{}", args.listen_ip, args.listen_port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            shared::logger::log_error(&format!("invalid bind address: {e}"));
            return ExitCode::FAILURE;
        }
    };

    let socket = match UdpSocket::bind(bind_addr).await {
        Ok(s) => s,
        Err(e) => {
            shared::logger::log_error(&format!("failed to bind {bind_addr}: {e}"));
            return ExitCode::FAILURE;
        }
    };
    shared::logger::log_success(&format!("listening on {bind_addr}"));

    let mut state = ServerState::new();
    let mut buf = [0u8; 65536];

    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                shared::logger::log_error(&format!("recv_from failed: {e}"));
                continue;
            }
        };

        let payload = match std::str::from_utf8(&buf[..len]) {
            Ok(s) => s,
            Err(_) => continue,
        };

        let actions = state.handle_datagram(payload, peer, Instant::now());
        for action in actions {
            match action {
                ServerAction::Reply { bytes, to } => {
                    if let Err(e) = socket.send_to(&bytes, to).await {
                        shared::logger::log_error(&format!("send_to {to} failed: {e}"));
                    }
                }
                ServerAction::Delivered { seq, payload } => {
                    println!("[{seq}] {payload}");
                }
                ServerAction::Log { event, detail } => {
                    shared::logger::log_event(event, &detail);
                }
            }
        }
    }
}
