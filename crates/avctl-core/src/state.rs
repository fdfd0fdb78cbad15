use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Property;

/// Cached values of the polled properties.
///
/// Owned by the device session; written only by the resolver and by
/// successful dispatches of property-changing actions. Reset only on
/// process restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastKnownState {
    pub power: bool,
    pub mute: bool,
    /// Index into the configured input list.
    pub input: usize,
    /// When any field last changed value. `None` until the first change.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for LastKnownState {
    fn default() -> Self {
        Self {
            power: false,
            mute: false,
            input: 0,
            updated_at: None,
        }
    }
}

impl LastKnownState {
    /// Cached boolean for `property`. Input has no boolean form and reads as
    /// `false`.
    pub fn boolean(&self, property: Property) -> bool {
        match property {
            Property::Power => self.power,
            Property::Mute => self.mute,
            Property::Input => false,
        }
    }

    /// Store a boolean. Returns true if the cached value changed.
    pub fn set_boolean(&mut self, property: Property, value: bool, now: DateTime<Utc>) -> bool {
        let slot = match property {
            Property::Power => &mut self.power,
            Property::Mute => &mut self.mute,
            Property::Input => return false,
        };
        if *slot == value {
            return false;
        }
        *slot = value;
        self.updated_at = Some(now);
        true
    }

    /// Store an input index. Returns true if the cached value changed.
    pub fn set_input(&mut self, index: usize, now: DateTime<Utc>) -> bool {
        if self.input == index {
            return false;
        }
        self.input = index;
        self.updated_at = Some(now);
        true
    }
}
