//! Pure reduction of polled status responses into one value.
//!
//! The async querying lives in `avctl-control`; everything here is
//! deterministic and IO-free so the policies can be tested exhaustively.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::ControlError;
use crate::types::{ChannelName, Property};

/// How per-channel boolean readings collapse into one value.
///
/// Readings that errored (timeout, mismatch, connection) count as `false`
/// under both policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReducePolicy {
    /// Off-dominant: true only if every channel reads true.
    AllOn,
    /// On-dominant: true if any channel reads true.
    AnyOn,
}

impl ReducePolicy {
    /// Fixed default per property.
    ///
    /// Power is off-dominant: one component in standby means the logical
    /// device is not fully on. Mute is on-dominant: one muted component
    /// silences the chain.
    pub fn default_for(property: Property) -> Self {
        match property {
            Property::Power => ReducePolicy::AllOn,
            Property::Mute | Property::Input => ReducePolicy::AnyOn,
        }
    }
}

/// Map a status response to a boolean using the configured substrings.
///
/// When both patterns occur in the response the longer (more specific)
/// pattern wins; on a tie `on` wins. A response containing neither is a
/// [`ControlError::ProtocolMismatch`].
pub fn match_boolean(
    channel: &ChannelName,
    response: &str,
    on: &str,
    off: &str,
) -> Result<bool, ControlError> {
    let is_on = !on.is_empty() && response.contains(on);
    let is_off = !off.is_empty() && response.contains(off);

    match (is_on, is_off) {
        (true, false) => Ok(true),
        (false, true) => Ok(false),
        (true, true) => Ok(on.len() >= off.len()),
        (false, false) => Err(ControlError::ProtocolMismatch {
            channel: channel.clone(),
            response: response.to_owned(),
        }),
    }
}

/// Reduce per-channel readings with `policy`.
///
/// A reply matching neither pattern is still an answer and reads as
/// `false`. Returns `None` only when no channel answered at all (no
/// readings, or every one a transport failure); the caller keeps its
/// last-known value then.
pub fn reduce_boolean(policy: ReducePolicy, readings: &[Result<bool, ControlError>]) -> Option<bool> {
    if !readings.iter().any(answered) {
        return None;
    }

    let value = |r: &Result<bool, ControlError>| matches!(r, Ok(true));
    Some(match policy {
        ReducePolicy::AllOn => readings.iter().all(value),
        ReducePolicy::AnyOn => readings.iter().any(value),
    })
}

fn answered(reading: &Result<bool, ControlError>) -> bool {
    match reading {
        Ok(_) => true,
        Err(e) => e.is_mismatch(),
    }
}

/// Outcome of input resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputSelection {
    /// No configured input matched; keep the last-known index.
    Unresolved,
    /// Exactly one input matched.
    Unique { index: usize },
    /// Several inputs matched. `index` is the chosen one; `kept` is true when
    /// it is the last-known value preserved for stability.
    Ambiguous {
        index: usize,
        candidates: Vec<usize>,
        kept: bool,
    },
}

impl InputSelection {
    /// Resolved index, falling back to `last_known` when unresolved.
    pub fn index_or(&self, last_known: usize) -> usize {
        match self {
            InputSelection::Unresolved => last_known,
            InputSelection::Unique { index } | InputSelection::Ambiguous { index, .. } => *index,
        }
    }
}

/// Indices of inputs whose every expectation is satisfied.
///
/// An input is valid only if each of its `(channel, substring)` expectations
/// is contained in that channel's latest response. A channel missing from
/// `responses` invalidates the input, and an input with no expectations is
/// never valid.
pub fn valid_inputs<'a, I>(inputs: I, responses: &HashMap<ChannelName, String>) -> Vec<usize>
where
    I: IntoIterator<Item = &'a BTreeMap<ChannelName, String>>,
{
    inputs
        .into_iter()
        .enumerate()
        .filter(|(_, expect)| {
            !expect.is_empty()
                && expect.iter().all(|(channel, needle)| {
                    responses
                        .get(channel)
                        .is_some_and(|response| response.contains(needle.as_str()))
                })
        })
        .map(|(i, _)| i)
        .collect()
}

/// Pick one input from the valid set, preferring stability.
pub fn select_input(valid: &[usize], last_known: usize) -> InputSelection {
    match valid {
        [] => InputSelection::Unresolved,
        [only] => InputSelection::Unique { index: *only },
        [first, ..] => {
            let kept = valid.contains(&last_known);
            InputSelection::Ambiguous {
                index: if kept { last_known } else { *first },
                candidates: valid.to_vec(),
                kept,
            }
        }
    }
}
