//! The device session: one logical device assembled from its channels.
//!
//! Owns the configured actions, the dispatcher, the resolver and the
//! Last-Known State. Control operations dispatch the configured action and,
//! on success, record the implied property change; status operations poll
//! through the resolver and fall back to the cache.

use std::sync::Arc;

use avctl_core::wire::expand_escapes;
use avctl_core::{
    ActionKind, ChannelKind, ControlError, DeviceProfile, Effect, InputSelection, LastKnownState,
    Property, PulseKey, RemoteKey, VolumeDirection,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::error::DeviceError;
use crate::registry::{ChannelInfo, ChannelRegistry};
use crate::resolver::Resolver;

/// Snapshot of every polled property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub power: bool,
    pub mute: bool,
    pub input: usize,
    pub input_name: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct Device {
    profile: Arc<DeviceProfile>,
    registry: ChannelRegistry,
    dispatcher: Dispatcher,
    resolver: Resolver,
    state: Mutex<LastKnownState>,
}

impl Device {
    /// Open every channel of `profile`. Must be called inside a tokio runtime.
    pub fn open(profile: DeviceProfile) -> Self {
        let registry = ChannelRegistry::from_config(&profile);
        Self::new(profile, registry)
    }

    /// Assemble a device over an existing registry.
    pub fn new(profile: DeviceProfile, registry: ChannelRegistry) -> Self {
        let dispatcher = Dispatcher::new(registry.clone(), profile.dispatch_policy);
        let resolver = Resolver::new(registry.clone());
        tracing::info!(
            device = %profile.name,
            channels = registry.len(),
            actions = profile.actions.len(),
            inputs = profile.inputs.len(),
            "device ready"
        );
        Self {
            profile: Arc::new(profile),
            registry,
            dispatcher,
            resolver,
            state: Mutex::new(LastKnownState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn channels(&self) -> Vec<ChannelInfo> {
        self.registry.channels()
    }

    // ─── Control ─────────────────────────────────────────────────

    /// Dispatch the action configured for `kind`.
    ///
    /// An unconfigured action is a successful no-op. Once at least one leaf
    /// has gone through, the action's property effect is recorded as
    /// last-known.
    pub async fn perform(&self, kind: ActionKind) -> Result<DispatchReport, DeviceError> {
        if let ActionKind::SelectInput(index) = kind {
            let count = self.profile.inputs.len();
            if index >= count {
                return Err(DeviceError::UnknownInput { index, count });
            }
        }

        let Some(action) = self.profile.action(kind).filter(|a| !a.is_empty()) else {
            tracing::info!(action = %kind, "no action configured, nothing to do");
            return Ok(DispatchReport::empty());
        };

        tracing::debug!(action = %kind, leaves = action.leaf_count(), "dispatching");
        let report = self.dispatcher.dispatch(action).await;

        // Under the lenient policy a report can succeed with every leaf
        // failed; the device was then never told anything.
        if report.outcomes.any_ok() {
            if let Some(effect) = kind.effect() {
                self.apply(effect).await;
            }
        }
        if !report.succeeded {
            tracing::warn!(
                action = %kind,
                failed = report.outcomes.errors().count(),
                "action reported failure"
            );
        }
        Ok(report)
    }

    pub async fn set_power(&self, on: bool) -> Result<DispatchReport, DeviceError> {
        self.perform(if on { ActionKind::PowerOn } else { ActionKind::PowerOff })
            .await
    }

    pub async fn set_mute(&self, on: bool) -> Result<DispatchReport, DeviceError> {
        self.perform(if on { ActionKind::MuteOn } else { ActionKind::MuteOff })
            .await
    }

    pub async fn change_volume(&self, direction: VolumeDirection) -> Result<DispatchReport, DeviceError> {
        self.perform(match direction {
            VolumeDirection::Up => ActionKind::VolumeUp,
            VolumeDirection::Down => ActionKind::VolumeDown,
        })
        .await
    }

    pub async fn select_input(&self, index: usize) -> Result<DispatchReport, DeviceError> {
        self.perform(ActionKind::SelectInput(index)).await
    }

    pub async fn press_key(&self, key: RemoteKey) -> Result<DispatchReport, DeviceError> {
        self.perform(ActionKind::RemoteKey(key)).await
    }

    async fn apply(&self, effect: Effect) {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let changed = match effect {
            Effect::Power(on) => state.set_boolean(Property::Power, on, now),
            Effect::Mute(on) => state.set_boolean(Property::Mute, on, now),
            Effect::Input(index) => state.set_input(index, now),
        };
        if changed {
            tracing::debug!(?effect, "last-known state updated by action");
        }
    }

    // ─── Status ──────────────────────────────────────────────────

    pub async fn power(&self) -> bool {
        self.resolve_boolean(Property::Power).await
    }

    pub async fn mute(&self) -> bool {
        self.resolve_boolean(Property::Mute).await
    }

    /// Index of the active input.
    pub async fn input(&self) -> usize {
        let last_known = self.state.lock().await.input;
        let selection = self
            .resolver
            .resolve_input(&self.profile.input_status, &self.profile.inputs, last_known)
            .await;

        let mut state = self.state.lock().await;
        match selection {
            InputSelection::Unresolved => state.input,
            resolved => {
                let index = resolved.index_or(state.input);
                if state.set_input(index, Utc::now()) {
                    tracing::info!(input = index, "input changed");
                }
                index
            }
        }
    }

    /// Configured input names in declaration order.
    pub fn inputs(&self) -> Vec<&str> {
        self.profile.inputs.iter().map(|i| i.name.as_str()).collect()
    }

    /// Poll every property concurrently.
    pub async fn status(&self) -> DeviceStatus {
        let (power, mute, input) = tokio::join!(self.power(), self.mute(), self.input());
        DeviceStatus {
            power,
            mute,
            input,
            input_name: self.profile.inputs.get(input).map(|i| i.name.clone()),
            updated_at: self.state.lock().await.updated_at,
        }
    }

    pub async fn last_known(&self) -> LastKnownState {
        self.state.lock().await.clone()
    }

    async fn resolve_boolean(&self, property: Property) -> bool {
        let resolved = self
            .resolver
            .resolve_boolean(property, self.profile.boolean_status(property))
            .await;

        let mut state = self.state.lock().await;
        match resolved {
            Some(value) => {
                if state.set_boolean(property, value, Utc::now()) {
                    tracing::info!(%property, value, "status changed");
                }
                value
            }
            None => state.boolean(property),
        }
    }

    // ─── Raw pass-through ────────────────────────────────────────

    /// Send one raw command to a line channel. Literal `\r`, `\n` and `\\`
    /// escapes are expanded first.
    pub async fn send_line(&self, channel: &str, raw: &str) -> Result<String, ControlError> {
        let line = self.registry.line(channel).ok_or_else(|| ControlError::Configuration {
            channel: channel.into(),
            kind: ChannelKind::Line,
        })?;
        line.send(&expand_escapes(raw)).await
    }

    /// Send a key sequence to a pulse channel.
    pub async fn send_keys(&self, channel: &str, keys: &[PulseKey]) -> Result<usize, ControlError> {
        let pulse = self.registry.pulse(channel).ok_or_else(|| ControlError::Configuration {
            channel: channel.into(),
            kind: ChannelKind::Pulse,
        })?;
        pulse.send_commands(keys).await
    }

    /// Stop every channel. Pending line commands complete with a connection
    /// error.
    pub fn shutdown(&self) {
        tracing::info!(device = %self.profile.name, "releasing channels");
        self.registry.shutdown();
    }
}
