//! Pulse Channel: ordered key sequences sent to an IR blaster through the
//! LIRC daemon's TCP socket.
//!
//! Each key opens a fresh connection, writes one `SEND_ONCE` line and
//! closes it, then waits the settle delay so the receiver can register the
//! press. `delay:<ms>` entries only pause.

use std::sync::Arc;

use avctl_core::wire::{self, PulseKey};
use avctl_core::{ChannelName, ControlError, LircParams};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Handle to one LIRC remote. Clones share the sequencing lock.
#[derive(Debug, Clone)]
pub struct PulseChannel {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    name: ChannelName,
    params: LircParams,
    /// Held for a whole sequence so concurrent callers never interleave keys.
    sequence: Mutex<()>,
}

impl PulseChannel {
    pub fn new(name: ChannelName, params: LircParams) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                params,
                sequence: Mutex::new(()),
            }),
        }
    }

    pub fn name(&self) -> &ChannelName {
        &self.inner.name
    }

    pub fn params(&self) -> &LircParams {
        &self.inner.params
    }

    /// Process `keys` in order. Stops at the first failing key; the rest are
    /// never attempted. Returns the number of entries processed.
    pub async fn send_commands(&self, keys: &[PulseKey]) -> Result<usize, ControlError> {
        let _turn = self.inner.sequence.lock().await;

        for key in keys {
            match key {
                PulseKey::Delay(pause) => {
                    tracing::debug!(channel = %self.inner.name, pause_ms = pause.as_millis() as u64, "pulse delay");
                    tokio::time::sleep(*pause).await;
                }
                PulseKey::Key(name) => {
                    if let Err(e) = self.send_key(name).await {
                        tracing::warn!(channel = %self.inner.name, key = %name, error = %e, "pulse key failed");
                        return Err(e);
                    }
                }
            }
        }

        Ok(keys.len())
    }

    async fn send_key(&self, key: &str) -> Result<(), ControlError> {
        let p = &self.inner.params;
        let connect = TcpStream::connect((p.host.as_str(), p.port));

        let mut stream = match tokio::time::timeout(p.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(self.connection(key, &e)),
            Err(_elapsed) => {
                return Err(ControlError::Timeout {
                    channel: self.inner.name.clone(),
                    command: key.to_owned(),
                    window_ms: p.connect_timeout.as_millis() as u64,
                });
            }
        };

        let line = wire::send_once(&p.remote, key);
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| self.connection(key, &e))?;
        if let Err(e) = stream.shutdown().await {
            tracing::debug!(channel = %self.inner.name, error = %e, "lircd socket shutdown");
        }
        drop(stream);

        tracing::debug!(channel = %self.inner.name, key, "pulse key sent");
        tokio::time::sleep(p.settle).await;
        Ok(())
    }

    fn connection(&self, key: &str, e: &std::io::Error) -> ControlError {
        ControlError::Connection {
            channel: self.inner.name.clone(),
            detail: format!("{key}: {e}"),
        }
    }
}
