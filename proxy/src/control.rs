//! The live-reconfiguration command grammar: `SET k=v ...` and `GET`.

use shared::config::ProxyConfig;

/// Processes one command line against an already-locked config, returning
/// the ASCII response to send back on the control socket.
pub fn handle_command(cmd: &str, config: &mut ProxyConfig) -> String {
    let cmd = cmd.trim();
    if cmd == "GET" {
        return config.to_json();
    }
    if let Some(rest) = cmd.strip_prefix("SET ") {
        return handle_set(rest, config);
    }
    if cmd == "SET" {
        return "error: SET requires at least one key=value pair".to_string();
    }
    format!("error: unrecognized command '{cmd}'")
}

fn handle_set(rest: &str, config: &mut ProxyConfig) -> String {
    let mut lines = Vec::new();
    for entry in rest.split_whitespace() {
        match entry.split_once('=') {
            Some((key, value)) => match config.set(key, value) {
                Ok((old, new)) => lines.push(format!("Updated {key} from {old} to {new}")),
                Err(e) => lines.push(format!("error: {entry}: {e}")),
            },
            None => lines.push(format!("error: malformed entry '{entry}', expected key=value")),
        }
    }
    if lines.is_empty() {
        return "error: SET requires at least one key=value pair".to_string();
    }
    lines.join("\n")
}
