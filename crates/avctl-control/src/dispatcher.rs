//! Action Dispatcher: fan one action out to its channels and aggregate the
//! leaf outcomes exactly once.
//!
//! Leaves are grouped into per-channel lanes in declaration order. Each lane
//! runs on its own task and walks its leaves sequentially, so same-channel
//! order follows the configuration while different channels proceed
//! concurrently. Every leaf reports one [`Outcome`] over an `mpsc`; the
//! collector counts down from the total leaf count and returns at zero.

use std::collections::HashMap;
use std::sync::Arc;

use avctl_core::{
    Action, ChannelKind, ChannelName, ControlError, DispatchPolicy, Leaf, Outcome, OutcomeData,
    OutcomeSet, PulseKey,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::registry::ChannelRegistry;
use crate::transport::{LineTransport, PulseTransport};

/// Aggregated result of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// One outcome per leaf, in completion order.
    pub outcomes: OutcomeSet,
    /// Success as judged by the dispatcher's [`DispatchPolicy`].
    pub succeeded: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DispatchReport {
    /// Report for an action with nothing to do.
    pub fn empty() -> Self {
        let now = Utc::now();
        Self {
            outcomes: OutcomeSet::default(),
            succeeded: true,
            started_at: now,
            finished_at: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: ChannelRegistry,
    policy: DispatchPolicy,
}

enum Lane {
    Line {
        channel: ChannelName,
        transport: Arc<dyn LineTransport>,
        commands: Vec<String>,
    },
    Pulse {
        channel: ChannelName,
        transport: Arc<dyn PulseTransport>,
        sequences: Vec<Vec<PulseKey>>,
    },
}

impl Dispatcher {
    pub fn new(registry: ChannelRegistry, policy: DispatchPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Execute every leaf of `action` and wait for all of them.
    pub async fn dispatch(&self, action: &Action) -> DispatchReport {
        let started_at = Utc::now();
        let leaves = action.leaves();
        let total = leaves.len();

        if total == 0 {
            return self.finish(OutcomeSet::default(), started_at);
        }

        // Capacity covers every leaf, so no report ever waits on the collector.
        let (tx, mut rx) = mpsc::channel::<Outcome>(total);
        let mut lanes: Vec<Lane> = Vec::new();
        let mut lane_index: HashMap<(ChannelName, ChannelKind), usize> = HashMap::new();

        for leaf in leaves {
            let key = (leaf.channel().clone(), leaf.kind());
            if let Some(&i) = lane_index.get(&key) {
                lanes[i].push(leaf);
                continue;
            }
            match self.open_lane(leaf) {
                Ok(lane) => {
                    lane_index.insert(key, lanes.len());
                    lanes.push(lane);
                }
                Err(outcome) => {
                    if tx.try_send(outcome).is_err() {
                        tracing::error!("dispatch collector rejected a configuration outcome");
                    }
                }
            }
        }

        for lane in lanes {
            tokio::spawn(lane.run(tx.clone()));
        }
        drop(tx);

        let mut outcomes = OutcomeSet::with_capacity(total);
        while outcomes.len() < total {
            match rx.recv().await {
                Some(outcome) => {
                    if let Err(e) = &outcome.result {
                        tracing::warn!(channel = %outcome.channel, error = %e, "leaf failed");
                    }
                    outcomes.push(outcome);
                }
                None => {
                    tracing::error!(
                        expected = total,
                        received = outcomes.len(),
                        "leaf tasks ended without reporting"
                    );
                    break;
                }
            }
        }

        self.finish(outcomes, started_at)
    }

    /// Start a lane for `leaf`, or the Configuration outcome if its channel
    /// is not registered with the leaf's kind.
    fn open_lane(&self, leaf: Leaf) -> Result<Lane, Outcome> {
        match leaf {
            Leaf::Line { channel, command } => match self.registry.line(channel.as_str()) {
                Some(transport) => Ok(Lane::Line {
                    channel,
                    transport,
                    commands: vec![command],
                }),
                None => Err(unknown_channel(channel, ChannelKind::Line)),
            },
            Leaf::Pulse { channel, keys } => match self.registry.pulse(channel.as_str()) {
                Some(transport) => Ok(Lane::Pulse {
                    channel,
                    transport,
                    sequences: vec![keys],
                }),
                None => Err(unknown_channel(channel, ChannelKind::Pulse)),
            },
        }
    }

    fn finish(&self, outcomes: OutcomeSet, started_at: DateTime<Utc>) -> DispatchReport {
        let succeeded = self.policy.succeeded(&outcomes);
        let finished_at = Utc::now();
        tracing::debug!(
            leaves = outcomes.len(),
            failed = outcomes.errors().count(),
            succeeded,
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "dispatch complete"
        );
        DispatchReport {
            outcomes,
            succeeded,
            started_at,
            finished_at,
        }
    }
}

fn unknown_channel(channel: ChannelName, kind: ChannelKind) -> Outcome {
    tracing::warn!(channel = %channel, kind = %kind, "action references an unregistered channel");
    Outcome {
        result: Err(ControlError::Configuration {
            channel: channel.clone(),
            kind,
        }),
        channel,
        kind,
    }
}

impl Lane {
    fn push(&mut self, leaf: Leaf) {
        match (self, leaf) {
            (Lane::Line { commands, .. }, Leaf::Line { command, .. }) => commands.push(command),
            (Lane::Pulse { sequences, .. }, Leaf::Pulse { keys, .. }) => sequences.push(keys),
            // Lanes are keyed by (channel, kind), so kinds always agree.
            _ => {}
        }
    }

    async fn run(self, tx: mpsc::Sender<Outcome>) {
        match self {
            Lane::Line {
                channel,
                transport,
                commands,
            } => {
                for command in commands {
                    let result = transport.send(&command).await.map(OutcomeData::Response);
                    let outcome = Outcome {
                        channel: channel.clone(),
                        kind: ChannelKind::Line,
                        result,
                    };
                    if tx.send(outcome).await.is_err() {
                        return;
                    }
                }
            }
            Lane::Pulse {
                channel,
                transport,
                sequences,
            } => {
                for keys in sequences {
                    let result = transport.send_commands(&keys).await.map(OutcomeData::Sent);
                    let outcome = Outcome {
                        channel: channel.clone(),
                        kind: ChannelKind::Pulse,
                        result,
                    };
                    if tx.send(outcome).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
