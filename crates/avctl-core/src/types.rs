use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a configured channel.
///
/// Names are validated once at configuration load and then used as lookup
/// keys into the channel registry; they are never re-parsed per call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ChannelName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for ChannelName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Transport kind of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Delimited request/response line stream (serial port).
    Line,
    /// Keyed command receiver reached over transient connections (LIRC).
    Pulse,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Line => f.write_str("line"),
            ChannelKind::Pulse => f.write_str("pulse"),
        }
    }
}

/// Logical property of the device that can be polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    Power,
    Mute,
    Input,
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::Power => f.write_str("power"),
            Property::Mute => f.write_str("mute"),
            Property::Input => f.write_str("input"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeDirection {
    Up,
    Down,
}

/// Keys a remote-control surface can trigger on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteKey {
    Rewind,
    FastForward,
    NextTrack,
    PreviousTrack,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Select,
    Back,
    Exit,
    PlayPause,
    Information,
}

impl RemoteKey {
    pub const ALL: [RemoteKey; 13] = [
        RemoteKey::Rewind,
        RemoteKey::FastForward,
        RemoteKey::NextTrack,
        RemoteKey::PreviousTrack,
        RemoteKey::ArrowUp,
        RemoteKey::ArrowDown,
        RemoteKey::ArrowLeft,
        RemoteKey::ArrowRight,
        RemoteKey::Select,
        RemoteKey::Back,
        RemoteKey::Exit,
        RemoteKey::PlayPause,
        RemoteKey::Information,
    ];

    /// snake_case name as used in configuration files and on the CLI.
    pub fn as_str(self) -> &'static str {
        match self {
            RemoteKey::Rewind => "rewind",
            RemoteKey::FastForward => "fast_forward",
            RemoteKey::NextTrack => "next_track",
            RemoteKey::PreviousTrack => "previous_track",
            RemoteKey::ArrowUp => "arrow_up",
            RemoteKey::ArrowDown => "arrow_down",
            RemoteKey::ArrowLeft => "arrow_left",
            RemoteKey::ArrowRight => "arrow_right",
            RemoteKey::Select => "select",
            RemoteKey::Back => "back",
            RemoteKey::Exit => "exit",
            RemoteKey::PlayPause => "play_pause",
            RemoteKey::Information => "information",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
