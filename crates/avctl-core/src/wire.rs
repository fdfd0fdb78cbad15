//! Bit-exact wire formats.
//!
//! - Line responses are terminated by a configurable delimiter (default `\r`).
//! - Pulse commands go out as `SEND_ONCE <remote> <key>\r\n`.
//! - Pulse keys of the form `delay:<ms>` are pauses and never hit the wire.
//! - Configured raw line commands may contain the literal escapes `\r`, `\n`
//!   and `\\`, expanded to the real bytes before transmission.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Default line delimiter for serial responses.
pub const DEFAULT_DELIMITER: &str = "\r";

/// Prefix of the reserved pause pseudo-key.
pub const DELAY_PREFIX: &str = "delay:";

/// Expand literal escape sequences in a configured raw command.
///
/// `\r` becomes a carriage return, `\n` a line feed and `\\` a single
/// backslash. Any other backslash sequence passes through untouched, as does
/// a trailing lone backslash.
pub fn expand_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('r') => {
                out.push('\r');
                chars.next();
            }
            Some('n') => {
                out.push('\n');
                chars.next();
            }
            Some('\\') => {
                out.push('\\');
                chars.next();
            }
            _ => out.push('\\'),
        }
    }

    out
}

/// Format a pulse key for the LIRC daemon socket.
pub fn send_once(remote: &str, key: &str) -> String {
    format!("SEND_ONCE {remote} {key}\r\n")
}

/// One entry of a pulse key sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PulseKey {
    /// A key name sent to the remote receiver.
    Key(String),
    /// A pure pause; nothing is sent.
    Delay(Duration),
}

/// A `delay:` key whose argument is not a non-negative integer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid delay key {0:?}: expected delay:<milliseconds>")]
pub struct InvalidDelay(pub String);

impl PulseKey {
    /// Parse a configured key token.
    ///
    /// Anything not starting with `delay:` is a key name. A `delay:` token
    /// must carry an integer millisecond count.
    pub fn parse(token: &str) -> Result<Self, InvalidDelay> {
        match token.strip_prefix(DELAY_PREFIX) {
            Some(ms) => ms
                .trim()
                .parse::<u64>()
                .map(|ms| PulseKey::Delay(Duration::from_millis(ms)))
                .map_err(|_| InvalidDelay(token.to_owned())),
            None => Ok(PulseKey::Key(token.to_owned())),
        }
    }

    pub fn is_delay(&self) -> bool {
        matches!(self, PulseKey::Delay(_))
    }
}

impl fmt::Display for PulseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PulseKey::Key(k) => f.write_str(k),
            PulseKey::Delay(d) => write!(f, "{DELAY_PREFIX}{}", d.as_millis()),
        }
    }
}

impl Serialize for PulseKey {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PulseKey {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let token = String::deserialize(d)?;
        PulseKey::parse(&token).map_err(serde::de::Error::custom)
    }
}

/// Parse a list of key tokens, failing on the first malformed delay.
pub fn parse_keys<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<PulseKey>, InvalidDelay> {
    tokens.iter().map(|t| PulseKey::parse(t.as_ref())).collect()
}
