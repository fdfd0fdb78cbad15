//! Object-safe seams over the two transports.
//!
//! The dispatcher and resolver only ever see these traits, so tests can
//! substitute scripted fakes for real devices.

use avctl_core::{ControlError, PulseKey};
use avctl_transport::{PulseChannel, SerialChannel};
use futures_util::future::BoxFuture;

/// Ordered request/response transport.
pub trait LineTransport: Send + Sync {
    /// Queue `command` and wait for its response line.
    fn send<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<String, ControlError>>;

    /// Commands queued or in flight.
    fn queue_depth(&self) -> usize {
        0
    }

    fn shutdown(&self) {}
}

/// Keyed sequencer transport.
pub trait PulseTransport: Send + Sync {
    /// Process `keys` in order, stopping at the first failure. Returns the
    /// number of entries processed.
    fn send_commands<'a>(&'a self, keys: &'a [PulseKey]) -> BoxFuture<'a, Result<usize, ControlError>>;
}

impl LineTransport for SerialChannel {
    fn send<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<String, ControlError>> {
        Box::pin(SerialChannel::send(self, command))
    }

    fn queue_depth(&self) -> usize {
        SerialChannel::queue_depth(self)
    }

    fn shutdown(&self) {
        SerialChannel::shutdown(self)
    }
}

impl PulseTransport for PulseChannel {
    fn send_commands<'a>(&'a self, keys: &'a [PulseKey]) -> BoxFuture<'a, Result<usize, ControlError>> {
        Box::pin(PulseChannel::send_commands(self, keys))
    }
}
