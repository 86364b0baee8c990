mod control;
mod forward;
mod schedule;
mod state;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use clap::Parser;
use rand::Rng;
use tokio::net::UdpSocket;

use shared::config::{Direction, ProxyConfig};
use shared::frame::Frame;
use shared::validation;

use forward::{forward_one, ForwardDecision};
use schedule::{DelayQueue, POLL_INTERVAL_MS};
use state::ProxyState;

/// Fault-injecting UDP middlebox sitting between a client and a server,
/// with a live-reconfigurable control channel.
#[derive(Parser, Debug)]
#[command(name = "proxy", about = "Fault-injecting UDP proxy")]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    listen_ip: String,
    #[arg(long, default_value_t = 9100)]
    listen_port: u16,

    #[arg(long)]
    target_ip: String,
    #[arg(long)]
    target_port: u16,

    #[arg(long, default_value_t = 0.0)]
    client_drop: f64,
    #[arg(long, default_value_t = 0.0)]
    server_drop: f64,
    #[arg(long, default_value_t = 0.0)]
    client_delay: f64,
    #[arg(long, default_value_t = 0.0)]
    server_delay: f64,
    #[arg(long, default_value = "0")]
    client_delay_time: String,
    #[arg(long, default_value = "0")]
    server_delay_time: String,

    #[arg(long, default_value_t = 9101)]
    control_port: u16,
}

fn validate_args(args: &Args) -> Result<ProxyConfig, String> {
    validation::validate_ipv4(&args.listen_ip).map_err(|e| e.to_string())?;
    validation::validate_ipv4(&args.target_ip).map_err(|e| e.to_string())?;
    validation::validate_chance(&args.client_drop.to_string()).map_err(|e| e.to_string())?;
    validation::validate_chance(&args.server_drop.to_string()).map_err(|e| e.to_string())?;
    validation::validate_chance(&args.client_delay.to_string()).map_err(|e| e.to_string())?;
    validation::validate_chance(&args.server_delay.to_string()).map_err(|e| e.to_string())?;
    let client_delay_time =
        validation::parse_delay_range(&args.client_delay_time).map_err(|e| e.to_string())?;
    let server_delay_time =
        validation::parse_delay_range(&args.server_delay_time).map_err(|e| e.to_string())?;

    Ok(ProxyConfig {
        client_drop: args.client_drop,
        server_drop: args.server_drop,
        client_delay: args.client_delay,
        server_delay: args.server_delay,
        client_delay_time,
        server_delay_time,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let initial_config = match validate_args(&args) {
        Ok(c) => c,
        Err(e) => {
            shared::logger::log_error(&e);
            return ExitCode::FAILURE;
        }
    };
    for (label, port) in [
        ("--listen-port", args.listen_port),
        ("--control-port", args.control_port),
    ] {
        if validation::is_privileged_port(port) {
            shared::logger::log_warning(&format!(
                "{label} {port} is below 1024 and may require elevated privileges to bind"
            ));
        }
    }

    let listen_addr: SocketAddr = match format!("{}:{}", args.listen_ip, args.listen_port).parse() {
        Ok(a) => a,
        Err(e) => {
            shared::logger::log_error(&format!("invalid listen address: {e}"));
            return ExitCode::FAILURE;
        }
    };
    let control_addr: SocketAddr = match format!("{}:{}", args.listen_ip, args.control_port).parse()
    {
        Ok(a) => a,
        Err(e) => {
            shared::logger::log_error(&format!("invalid control address: {e}"));
            return ExitCode::FAILURE;
        }
    };
    let target: SocketAddr = match format!("{}:{}", args.target_ip, args.target_port).parse() {
        Ok(a) => a,
        Err(e) => {
            shared::logger::log_error(&format!("invalid target address: {e}"));
            return ExitCode::FAILURE;
        }
    };

    let data_socket = match UdpSocket::bind(listen_addr).await {
        Ok(s) => s,
        Err(e) => {
            shared::logger::log_error(&format!("failed to bind data socket {listen_addr}: {e}"));
            return ExitCode::FAILURE;
        }
    };
    let control_socket = match UdpSocket::bind(control_addr).await {
        Ok(s) => s,
        Err(e) => {
            shared::logger::log_error(&format!(
                "failed to bind control socket {control_addr}: {e}"
            ));
            return ExitCode::FAILURE;
        }
    };
    shared::logger::log_success(&format!(
        "forwarding {listen_addr} <-> {target}, control on {control_addr}"
    ));

    let config = Arc::new(Mutex::new(initial_config));
    let proxy_state = Arc::new(ProxyState::new());
    let client_to_server_queue = Arc::new(Mutex::new(DelayQueue::new()));
    let server_to_client_queue = Arc::new(Mutex::new(DelayQueue::new()));
    let data_socket = Arc::new(data_socket);

    let forwarding = tokio::spawn(forwarding_loop(
        data_socket.clone(),
        target,
        proxy_state.clone(),
        config.clone(),
        client_to_server_queue.clone(),
        server_to_client_queue.clone(),
    ));

    let scheduler = tokio::spawn(delayed_release_loop(
        data_socket.clone(),
        client_to_server_queue,
        server_to_client_queue,
    ));

    let control = tokio::spawn(control_loop(control_socket, config));

    tokio::select! {
        _ = forwarding => shared::logger::log_error("forwarding loop exited unexpectedly"),
        _ = scheduler => shared::logger::log_error("delayed-release loop exited unexpectedly"),
        _ = control => shared::logger::log_error("control loop exited unexpectedly"),
        _ = tokio::signal::ctrl_c() => shared::logger::log_info("interrupted, shutting down"),
    }

    ExitCode::SUCCESS
}

async fn forwarding_loop(
    socket: Arc<UdpSocket>,
    target: SocketAddr,
    proxy_state: Arc<ProxyState>,
    config: Arc<Mutex<ProxyConfig>>,
    client_to_server: Arc<Mutex<DelayQueue>>,
    server_to_client: Arc<Mutex<DelayQueue>>,
) {
    let mut buf = [0u8; 65536];
    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                shared::logger::log_error(&format!("proxy recv_from failed: {e}"));
                continue;
            }
        };
        let bytes = buf[..len].to_vec();
        let text = match std::str::from_utf8(&bytes) {
            Ok(s) => s,
            Err(_) => continue,
        };

        let (dir, destination) = if src == target {
            match proxy_state.client_peer() {
                Some(peer) => (Direction::ServerToClient, peer),
                None => {
                    shared::logger::log_event(
                        "Dropped",
                        "server-to-client datagram with no known client peer yet",
                    );
                    continue;
                }
            }
        } else {
            proxy_state.record_client(src);
            (Direction::ClientToServer, target)
        };

        let parsed = Frame::parse(text);
        // One lock acquisition yields a single consistent snapshot of
        // (chance, delay_time) for this decision, per the concurrency model.
        let snapshot = config.lock().unwrap().clone();
        let range = snapshot.delay_time(dir);
        let r_drop: f64 = rand::thread_rng().gen();
        let r_delay: f64 = rand::thread_rng().gen();
        let delay_ms = if range.0 == range.1 {
            range.0
        } else {
            rand::thread_rng().gen_range(range.0..=range.1)
        };
        let decision = forward_one(&parsed, dir, &snapshot, r_drop, r_delay, delay_ms);

        match decision {
            ForwardDecision::Drop => {
                shared::logger::log_event("Dropped", &format!("{dir} datagram from {src}"));
            }
            ForwardDecision::ForwardNow | ForwardDecision::ForwardUnconditional => {
                let received_at = Instant::now();
                if let Err(e) = socket.send_to(&bytes, destination).await {
                    shared::logger::log_error(&format!("forward to {destination} failed: {e}"));
                    continue;
                }
                shared::logger::log_event(
                    "Forwarded",
                    &format!(
                        "{dir} {src} -> {destination} in {:?}",
                        received_at.elapsed()
                    ),
                );
            }
            ForwardDecision::ForwardAfter(delay) => {
                let queue = match dir {
                    Direction::ClientToServer => &client_to_server,
                    Direction::ServerToClient => &server_to_client,
                };
                queue
                    .lock()
                    .unwrap()
                    .push(Instant::now() + delay, bytes, destination);
                shared::logger::log_event(
                    "Delayed",
                    &format!("{dir} datagram from {src} by {delay:?}"),
                );
            }
        }
    }
}

async fn delayed_release_loop(
    socket: Arc<UdpSocket>,
    client_to_server: Arc<Mutex<DelayQueue>>,
    server_to_client: Arc<Mutex<DelayQueue>>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(POLL_INTERVAL_MS));
    loop {
        ticker.tick().await;
        let now = Instant::now();
        let due: Vec<(Vec<u8>, SocketAddr)> = {
            let mut a = client_to_server.lock().unwrap();
            let mut b = server_to_client.lock().unwrap();
            let mut due = a.pop_due(now);
            due.extend(b.pop_due(now));
            due
        };
        for (bytes, destination) in due {
            if let Err(e) = socket.send_to(&bytes, destination).await {
                shared::logger::log_error(&format!("delayed forward to {destination} failed: {e}"));
                continue;
            }
            shared::logger::log_event("Forwarded Delayed", &format!("to {destination}"));
        }
    }
}

async fn control_loop(socket: UdpSocket, config: Arc<Mutex<ProxyConfig>>) {
    let mut buf = [0u8; 4096];
    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                shared::logger::log_error(&format!("control recv_from failed: {e}"));
                continue;
            }
        };
        let text = match std::str::from_utf8(&buf[..len]) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let response = {
            let mut cfg = config.lock().unwrap();
            control::handle_command(text, &mut cfg)
        };
        if let Err(e) = socket.send_to(response.as_bytes(), src).await {
            shared::logger::log_error(&format!("control reply to {src} failed: {e}"));
        }
    }
}
