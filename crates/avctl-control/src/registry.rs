//! Name → channel handle lookup.
//!
//! Channels are created once at setup from the validated profile and then
//! shared by the dispatcher, the resolver and raw pass-through calls.

use std::collections::HashMap;
use std::sync::Arc;

use avctl_core::{ChannelKind, ChannelName, DeviceProfile};
use avctl_transport::{PulseChannel, SerialChannel};
use serde::{Deserialize, Serialize};

use crate::transport::{LineTransport, PulseTransport};

/// Diagnostic view of one registered channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: ChannelName,
    pub kind: ChannelKind,
    /// Commands queued or in flight; always 0 for pulse channels.
    pub queue_depth: usize,
}

#[derive(Clone, Default)]
pub struct ChannelRegistry {
    lines: HashMap<ChannelName, Arc<dyn LineTransport>>,
    pulses: HashMap<ChannelName, Arc<dyn PulseTransport>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open every channel declared in `profile`.
    ///
    /// Serial devices open in the background; one that fails to open is
    /// inert and does not affect the others. Must be called inside a tokio
    /// runtime.
    pub fn from_config(profile: &DeviceProfile) -> Self {
        let mut registry = Self::new();
        for (name, params) in &profile.serial {
            tracing::debug!(channel = %name, path = %params.path.display(), "opening serial channel");
            registry.insert_line(name.clone(), Arc::new(SerialChannel::open(name.clone(), params)));
        }
        for (name, params) in &profile.lirc {
            tracing::debug!(channel = %name, host = %params.host, port = params.port, "registering lirc channel");
            registry.insert_pulse(name.clone(), Arc::new(PulseChannel::new(name.clone(), params.clone())));
        }
        registry
    }

    pub fn insert_line(&mut self, name: ChannelName, channel: Arc<dyn LineTransport>) {
        self.lines.insert(name, channel);
    }

    pub fn insert_pulse(&mut self, name: ChannelName, channel: Arc<dyn PulseTransport>) {
        self.pulses.insert(name, channel);
    }

    pub fn line(&self, name: &str) -> Option<Arc<dyn LineTransport>> {
        self.lines.get(name).cloned()
    }

    pub fn pulse(&self, name: &str) -> Option<Arc<dyn PulseTransport>> {
        self.pulses.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.lines.len() + self.pulses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All channels sorted by name.
    pub fn channels(&self) -> Vec<ChannelInfo> {
        let lines = self.lines.iter().map(|(name, ch)| ChannelInfo {
            name: name.clone(),
            kind: ChannelKind::Line,
            queue_depth: ch.queue_depth(),
        });
        let pulses = self.pulses.keys().map(|name| ChannelInfo {
            name: name.clone(),
            kind: ChannelKind::Pulse,
            queue_depth: 0,
        });
        let mut all: Vec<ChannelInfo> = lines.chain(pulses).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Stop every line channel actor.
    pub fn shutdown(&self) {
        for (name, ch) in &self.lines {
            tracing::debug!(channel = %name, "shutting down line channel");
            ch.shutdown();
        }
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("lines", &self.lines.keys().collect::<Vec<_>>())
            .field("pulses", &self.pulses.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn from_config_registers_every_channel() {
        let profile = DeviceProfile::from_toml(
            r#"
            name = "den"

            [[serial]]
            name = "amp"
            path = "/nonexistent/avctl-amp"

            [[lirc]]
            name = "tv"
            remote = "Samsung"
            "#,
        )
        .unwrap();

        let registry = ChannelRegistry::from_config(&profile);
        assert_eq!(registry.len(), 2);
        assert!(registry.line("amp").is_some());
        assert!(registry.pulse("tv").is_some());
        assert!(registry.line("tv").is_none(), "kinds are separate namespaces");

        let kinds: Vec<(String, ChannelKind)> = registry
            .channels()
            .into_iter()
            .map(|c| (c.name.to_string(), c.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("amp".to_string(), ChannelKind::Line),
                ("tv".to_string(), ChannelKind::Pulse)
            ]
        );
        registry.shutdown();
    }

    #[test]
    fn empty_registry() {
        let registry = ChannelRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.channels().is_empty());
    }
}
