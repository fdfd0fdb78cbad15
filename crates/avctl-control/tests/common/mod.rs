//! Scripted transports for exercising the control layer without devices.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use avctl_control::{LineTransport, PulseTransport};
use avctl_core::{ChannelName, ControlError, PulseKey};
use futures_util::future::BoxFuture;

/// Line transport answering from a command → response table after an
/// optional delay. Unscripted commands time out.
pub struct FakeLine {
    name: ChannelName,
    delay: Duration,
    script: Mutex<HashMap<String, Result<String, ControlError>>>,
    sent: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FakeLine {
    pub fn new(name: &str) -> Arc<Self> {
        Self::with_delay(name, Duration::ZERO)
    }

    pub fn with_delay(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            delay,
            script: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn respond(&self, command: &str, response: &str) {
        self.script
            .lock()
            .unwrap()
            .insert(command.to_owned(), Ok(response.to_owned()));
    }

    pub fn fail(&self, command: &str, error: ControlError) {
        self.script
            .lock()
            .unwrap()
            .insert(command.to_owned(), Err(error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn timeout(&self, command: &str) -> ControlError {
        ControlError::Timeout {
            channel: self.name.clone(),
            command: command.to_owned(),
            window_ms: 50,
        }
    }
}

impl LineTransport for FakeLine {
    fn send<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<String, ControlError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sent.lock().unwrap().push(command.to_owned());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let scripted = self.script.lock().unwrap().get(command).cloned();
            scripted.unwrap_or_else(|| Err(self.timeout(command)))
        })
    }
}

/// Pulse transport recording every sequence it is handed.
pub struct FakePulse {
    name: ChannelName,
    delay: Duration,
    fail: bool,
    sequences: Mutex<Vec<Vec<PulseKey>>>,
}

impl FakePulse {
    pub fn new(name: &str) -> Arc<Self> {
        Self::build(name, Duration::ZERO, false)
    }

    pub fn with_delay(name: &str, delay: Duration) -> Arc<Self> {
        Self::build(name, delay, false)
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Self::build(name, Duration::ZERO, true)
    }

    fn build(name: &str, delay: Duration, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            delay,
            fail,
            sequences: Mutex::new(Vec::new()),
        })
    }

    pub fn sequences(&self) -> Vec<Vec<PulseKey>> {
        self.sequences.lock().unwrap().clone()
    }
}

impl PulseTransport for FakePulse {
    fn send_commands<'a>(&'a self, keys: &'a [PulseKey]) -> BoxFuture<'a, Result<usize, ControlError>> {
        Box::pin(async move {
            self.sequences.lock().unwrap().push(keys.to_vec());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(ControlError::Connection {
                    channel: self.name.clone(),
                    detail: "connection refused".into(),
                });
            }
            Ok(keys.len())
        })
    }
}
