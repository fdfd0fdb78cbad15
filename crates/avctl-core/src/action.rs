//! Actions, their leaf decomposition, and aggregated outcomes.

use serde::{Deserialize, Serialize};

use crate::error::ControlError;
use crate::types::{ChannelKind, ChannelName, RemoteKey};
use crate::wire::PulseKey;

/// One group of an action: commands for line channels and key lists for
/// pulse channels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandGroup {
    /// `(channel, raw commands)`; each raw command is already escape-expanded.
    pub line: Vec<(ChannelName, Vec<String>)>,
    /// `(channel, key list)`; each list is one leaf.
    pub pulse: Vec<(ChannelName, Vec<PulseKey>)>,
}

impl CommandGroup {
    pub fn is_empty(&self) -> bool {
        self.line.is_empty() && self.pulse.is_empty()
    }
}

/// A logical operation: an ordered list of command groups.
///
/// Transient; lives only for the duration of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub groups: Vec<CommandGroup>,
}

/// Smallest dispatchable unit of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Leaf {
    /// One raw command written to a line channel.
    Line { channel: ChannelName, command: String },
    /// One key sequence sent to a pulse channel.
    Pulse {
        channel: ChannelName,
        keys: Vec<PulseKey>,
    },
}

impl Leaf {
    pub fn channel(&self) -> &ChannelName {
        match self {
            Leaf::Line { channel, .. } | Leaf::Pulse { channel, .. } => channel,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            Leaf::Line { .. } => ChannelKind::Line,
            Leaf::Pulse { .. } => ChannelKind::Pulse,
        }
    }
}

impl Action {
    pub fn new(groups: Vec<CommandGroup>) -> Self {
        Self { groups }
    }

    /// Single-group action sending raw commands to one line channel.
    pub fn line(channel: impl Into<ChannelName>, commands: Vec<String>) -> Self {
        Self::new(vec![CommandGroup {
            line: vec![(channel.into(), commands)],
            pulse: Vec::new(),
        }])
    }

    /// Single-group action sending one key list to one pulse channel.
    pub fn pulse(channel: impl Into<ChannelName>, keys: Vec<PulseKey>) -> Self {
        Self::new(vec![CommandGroup {
            line: Vec::new(),
            pulse: vec![(channel.into(), keys)],
        }])
    }

    /// Decompose into leaves in declaration order: groups in order, and
    /// within a group line leaves before pulse leaves.
    ///
    /// Each raw line command is its own leaf; each pulse key list is one leaf.
    pub fn leaves(&self) -> Vec<Leaf> {
        let mut leaves = Vec::new();
        for group in &self.groups {
            for (channel, commands) in &group.line {
                for command in commands {
                    leaves.push(Leaf::Line {
                        channel: channel.clone(),
                        command: command.clone(),
                    });
                }
            }
            for (channel, keys) in &group.pulse {
                leaves.push(Leaf::Pulse {
                    channel: channel.clone(),
                    keys: keys.clone(),
                });
            }
        }
        leaves
    }

    pub fn leaf_count(&self) -> usize {
        self.groups
            .iter()
            .map(|g| g.line.iter().map(|(_, cmds)| cmds.len()).sum::<usize>() + g.pulse.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }
}

/// Successful payload of one leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OutcomeData {
    /// Response line of a line leaf, delimiter trimmed.
    Response(String),
    /// Number of keys (including pauses) processed by a pulse leaf.
    Sent(usize),
}

/// Result of one leaf, tagged by channel and kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub channel: ChannelName,
    pub kind: ChannelKind,
    pub result: Result<OutcomeData, ControlError>,
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Aggregated outcomes of one dispatched action, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSet {
    pub outcomes: Vec<Outcome>,
}

impl OutcomeSet {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            outcomes: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, outcome: Outcome) {
        self.outcomes.push(outcome);
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ControlError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    pub fn all_ok(&self) -> bool {
        self.outcomes.iter().all(Outcome::is_ok)
    }

    pub fn any_ok(&self) -> bool {
        self.outcomes.iter().any(Outcome::is_ok)
    }

    pub fn for_channel<'a>(&'a self, channel: &'a str) -> impl Iterator<Item = &'a Outcome> + 'a {
        self.outcomes
            .iter()
            .filter(move |o| o.channel.as_str() == channel)
    }
}

/// How a dispatch with failed leaves is reported to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Report success regardless of leaf errors; failures are only logged,
    /// so one unreachable component does not fail the whole toggle.
    #[default]
    Lenient,
    /// Report failure if any leaf failed.
    Strict,
}

impl DispatchPolicy {
    pub fn succeeded(self, outcomes: &OutcomeSet) -> bool {
        match self {
            DispatchPolicy::Lenient => true,
            DispatchPolicy::Strict => outcomes.all_ok(),
        }
    }
}

/// Named logical operations a device profile can configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "arg")]
pub enum ActionKind {
    PowerOn,
    PowerOff,
    MuteOn,
    MuteOff,
    VolumeUp,
    VolumeDown,
    RemoteKey(RemoteKey),
    SelectInput(usize),
}

/// Property change implied by a successful dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Power(bool),
    Mute(bool),
    Input(usize),
}

impl ActionKind {
    pub fn effect(self) -> Option<Effect> {
        match self {
            ActionKind::PowerOn => Some(Effect::Power(true)),
            ActionKind::PowerOff => Some(Effect::Power(false)),
            ActionKind::MuteOn => Some(Effect::Mute(true)),
            ActionKind::MuteOff => Some(Effect::Mute(false)),
            ActionKind::SelectInput(i) => Some(Effect::Input(i)),
            ActionKind::VolumeUp | ActionKind::VolumeDown | ActionKind::RemoteKey(_) => None,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::PowerOn => f.write_str("power_on"),
            ActionKind::PowerOff => f.write_str("power_off"),
            ActionKind::MuteOn => f.write_str("mute_on"),
            ActionKind::MuteOff => f.write_str("mute_off"),
            ActionKind::VolumeUp => f.write_str("volume_up"),
            ActionKind::VolumeDown => f.write_str("volume_down"),
            ActionKind::RemoteKey(k) => write!(f, "remote_key:{k}"),
            ActionKind::SelectInput(i) => write!(f, "select_input:{i}"),
        }
    }
}
