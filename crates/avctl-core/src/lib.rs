//! avctl-core: pure domain layer.
//! Types, configuration model, wire formats and status reduction policies.
//! No IO beyond reading a config file, no async.

pub mod action;
pub mod config;
pub mod error;
pub mod reduce;
pub mod state;
pub mod types;
pub mod wire;

pub use action::{
    Action, ActionKind, CommandGroup, DispatchPolicy, Effect, Leaf, Outcome, OutcomeData,
    OutcomeSet,
};
pub use config::{
    BooleanQuery, BooleanStatus, Config, DeviceProfile, InputProfile, InputQuery, LircParams,
    SerialParams,
};
pub use error::{ConfigError, ControlError};
pub use reduce::{InputSelection, ReducePolicy};
pub use state::LastKnownState;
pub use types::{ChannelKind, ChannelName, Property, RemoteKey, VolumeDirection};
pub use wire::PulseKey;
