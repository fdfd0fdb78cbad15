//! CLI definition using clap derive.

use std::path::PathBuf;

use avctl_core::RemoteKey;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "avctl", about = "composite A/V device controller")]
pub struct Cli {
    /// Device profile (default: $XDG_CONFIG_HOME/avctl/config.toml)
    #[arg(long, short = 'c', global = true, env = "AVCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// UDS socket path (default: $XDG_RUNTIME_DIR/avctl/avctl.sock)
    #[arg(long, short = 's', global = true)]
    pub socket_path: Option<String>,

    /// Drive the device in-process instead of through a running daemon
    #[arg(long, global = true)]
    pub direct: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Open all channels and serve JSON-RPC on the socket
    Daemon,
    /// Switch the device on or off
    Power { state: Switch },
    /// Mute or unmute
    Mute { state: Switch },
    /// Step the volume
    Volume { direction: Direction },
    /// Select an input by index (see `avctl status input`)
    Input { index: usize },
    /// Trigger a remote-control key
    Key {
        #[arg(value_parser = parse_remote_key)]
        key: RemoteKey,
    },
    /// Poll and print the device state
    Status {
        #[arg(default_value = "all")]
        property: StatusTarget,
    },
    /// Send one raw command to a serial channel (escapes like \r expanded)
    Send { channel: String, command: String },
    /// Send keys to a LIRC channel (`delay:<ms>` pauses)
    Keys {
        channel: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// List configured channels with their queue depth
    Channels,
    /// Validate the config and print a summary
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn is_on(self) -> bool {
        self == Switch::On
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusTarget {
    All,
    Power,
    Mute,
    Input,
}

impl StatusTarget {
    /// `get_status` property parameter; `None` asks for everything.
    pub fn property(self) -> Option<&'static str> {
        match self {
            StatusTarget::All => None,
            StatusTarget::Power => Some("power"),
            StatusTarget::Mute => Some("mute"),
            StatusTarget::Input => Some("input"),
        }
    }
}

fn parse_remote_key(s: &str) -> Result<RemoteKey, String> {
    RemoteKey::parse(s).ok_or_else(|| {
        let known: Vec<&str> = RemoteKey::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown key {s:?}; expected one of: {}", known.join(", "))
    })
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/avctl/avctl.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/avctl-{user}/avctl.sock")
}

/// Default profile location following the XDG base directory layout.
pub fn default_config_path() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(dir).join("avctl/config.toml");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config/avctl/config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_command() {
        let cli = Cli::try_parse_from(["avctl", "key", "arrow_up"]).unwrap();
        assert!(matches!(cli.command, Command::Key { key: RemoteKey::ArrowUp }));
    }

    #[test]
    fn rejects_unknown_key() {
        let err = Cli::try_parse_from(["avctl", "key", "warp"]).err().unwrap();
        assert!(err.to_string().contains("unknown key"));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["avctl", "power", "on", "--direct", "-c", "/etc/avctl.toml"]).unwrap();
        assert!(cli.direct);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/avctl.toml")));
        assert!(matches!(cli.command, Command::Power { state: Switch::On }));
    }

    #[test]
    fn status_defaults_to_all() {
        let cli = Cli::try_parse_from(["avctl", "status"]).unwrap();
        assert!(matches!(cli.command, Command::Status { property: StatusTarget::All }));
    }

    #[test]
    fn keys_requires_at_least_one() {
        assert!(Cli::try_parse_from(["avctl", "keys", "tv"]).is_err());
        let cli = Cli::try_parse_from(["avctl", "keys", "tv", "KEY_A", "delay:100"]).unwrap();
        match cli.command {
            Command::Keys { channel, keys } => {
                assert_eq!(channel, "tv");
                assert_eq!(keys, vec!["KEY_A", "delay:100"]);
            }
            _ => panic!("expected keys"),
        }
    }
}
