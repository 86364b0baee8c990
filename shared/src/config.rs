//! The proxy's shared, mutable fault-injection configuration.

use serde::Serialize;
use std::fmt;

use crate::validation::{self, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

impl Direction {
    /// The key prefix used by both the CLI flags and the control-channel
    /// keys (`client-drop`, `server-delay-time`, ...).
    pub fn prefix(self) -> &'static str {
        match self {
            Direction::ClientToServer => "client",
            Direction::ServerToClient => "server",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToServer => write!(f, "client-to-server"),
            Direction::ServerToClient => write!(f, "server-to-client"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProxyConfig {
    #[serde(rename = "client-drop")]
    pub client_drop: f64,
    #[serde(rename = "server-drop")]
    pub server_drop: f64,
    #[serde(rename = "client-delay")]
    pub client_delay: f64,
    #[serde(rename = "server-delay")]
    pub server_delay: f64,
    #[serde(rename = "client-delay-time")]
    pub client_delay_time: (u64, u64),
    #[serde(rename = "server-delay-time")]
    pub server_delay_time: (u64, u64),
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            client_drop: 0.0,
            server_drop: 0.0,
            client_delay: 0.0,
            server_delay: 0.0,
            client_delay_time: (0, 0),
            server_delay_time: (0, 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    UnknownKey(String),
    Invalid(ValidationError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownKey(k) => write!(f, "unknown parameter: {k}"),
            ConfigError::Invalid(e) => write!(f, "{e}"),
        }
    }
}

impl From<ValidationError> for ConfigError {
    fn from(e: ValidationError) -> Self {
        ConfigError::Invalid(e)
    }
}

fn format_delay(range: (u64, u64)) -> String {
    if range.0 == range.1 {
        range.0.to_string()
    } else {
        format!("{}-{}", range.0, range.1)
    }
}

impl ProxyConfig {
    pub fn drop_chance(&self, dir: Direction) -> f64 {
        match dir {
            Direction::ClientToServer => self.client_drop,
            Direction::ServerToClient => self.server_drop,
        }
    }

    pub fn delay_chance(&self, dir: Direction) -> f64 {
        match dir {
            Direction::ClientToServer => self.client_delay,
            Direction::ServerToClient => self.server_delay,
        }
    }

    pub fn delay_time(&self, dir: Direction) -> (u64, u64) {
        match dir {
            Direction::ClientToServer => self.client_delay_time,
            Direction::ServerToClient => self.server_delay_time,
        }
    }

    /// Applies a single `key=value` update, returning a human-readable
    /// `(old, new)` pair on success.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(String, String), ConfigError> {
        match key {
            "client-drop" => {
                let new = validation::validate_chance(value)?;
                let old = self.client_drop;
                self.client_drop = new;
                Ok((old.to_string(), new.to_string()))
            }
            "server-drop" => {
                let new = validation::validate_chance(value)?;
                let old = self.server_drop;
                self.server_drop = new;
                Ok((old.to_string(), new.to_string()))
            }
            "client-delay" => {
                let new = validation::validate_chance(value)?;
                let old = self.client_delay;
                self.client_delay = new;
                Ok((old.to_string(), new.to_string()))
            }
            "server-delay" => {
                let new = validation::validate_chance(value)?;
                let old = self.server_delay;
                self.server_delay = new;
                Ok((old.to_string(), new.to_string()))
            }
            "client-delay-time" => {
                let new = validation::parse_delay_range(value)?;
                let old = self.client_delay_time;
                self.client_delay_time = new;
                Ok((format_delay(old), format_delay(new)))
            }
            "server-delay-time" => {
                let new = validation::parse_delay_range(value)?;
                let old = self.server_delay_time;
                self.server_delay_time = new;
                Ok((format_delay(old), format_delay(new)))
            }
            other => Err(ConfigError::UnknownKey(other.to_string())),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ProxyConfig always serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_all_zero() {
        let cfg = ProxyConfig::default();
        assert_eq!(cfg.client_drop, 0.0);
        assert_eq!(cfg.client_delay_time, (0, 0));
    }

    #[test]
    fn direction_prefix() {
        assert_eq!(Direction::ClientToServer.prefix(), "client");
        assert_eq!(Direction::ServerToClient.prefix(), "server");
    }

    #[test]
    fn set_updates_chance_and_reports_old_new() {
        let mut cfg = ProxyConfig::default();
        let (old, new) = cfg.set("client-drop", "0.5").unwrap();
        assert_eq!(old, "0");
        assert_eq!(new, "0.5");
        assert_eq!(cfg.client_drop, 0.5);
    }

    #[test]
    fn set_updates_delay_range() {
        let mut cfg = ProxyConfig::default();
        let (old, new) = cfg.set("server-delay-time", "100-500").unwrap();
        assert_eq!(old, "0");
        assert_eq!(new, "100-500");
        assert_eq!(cfg.server_delay_time, (100, 500));
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = ProxyConfig::default();
        assert!(matches!(
            cfg.set("bogus", "1.0"),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn set_rejects_invalid_chance() {
        let mut cfg = ProxyConfig::default();
        assert!(matches!(
            cfg.set("client-drop", "2.0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn to_json_uses_kebab_case_keys() {
        let cfg = ProxyConfig::default();
        let json = cfg.to_json();
        assert!(json.contains("\"client-drop\""));
        assert!(json.contains("\"server-delay-time\""));
    }

    #[test]
    fn accessors_select_by_direction() {
        let mut cfg = ProxyConfig::default();
        cfg.server_drop = 0.3;
        assert_eq!(cfg.drop_chance(Direction::ServerToClient), 0.3);
        assert_eq!(cfg.drop_chance(Direction::ClientToServer), 0.0);
    }
}
