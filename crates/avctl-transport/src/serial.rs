//! Serial Channel: one line-oriented device behind a strictly serialized
//! request/response queue.
//!
//! A [`SerialChannel`] is a cheap handle to an actor task that owns the
//! stream halves. Commands are queued FIFO; at most one is in flight. The
//! in-flight command completes with the next decoded line, or with a
//! timeout once the per-channel response window elapses. Every command
//! completes exactly once.
//!
//! ```text
//!   send() ──mpsc──▶ actor ──write──▶ device
//!      ▲               │  ◀──lines───
//!      └───oneshot─────┘
//! ```

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use avctl_core::{ChannelName, ControlError, SerialParams};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::device::SerialPort;
use crate::lines::LineDecoder;

const READ_BUF_SIZE: usize = 1024;

// ─── Handle ──────────────────────────────────────────────────────

type Completion = oneshot::Sender<Result<String, ControlError>>;

#[derive(Debug)]
struct Request {
    command: String,
    done: Completion,
}

/// Handle to a serial channel actor. Clones share the same queue.
#[derive(Debug, Clone)]
pub struct SerialChannel {
    name: ChannelName,
    window: Duration,
    tx: mpsc::UnboundedSender<Request>,
    depth: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl SerialChannel {
    /// Open the configured device in the background and start the actor.
    ///
    /// Returns immediately; commands sent before the device is ready wait in
    /// the queue. If opening fails the channel stays inert and every command
    /// completes with [`ControlError::Connection`].
    pub fn open(name: ChannelName, params: &SerialParams) -> Self {
        let (handle, actor, rx) = Self::parts(name, params);
        let path = params.path.clone();
        let baud_rate = params.baud_rate;

        tokio::spawn(async move {
            let io = match SerialPort::open(&path, baud_rate).await {
                Ok(port) => {
                    tracing::info!(
                        channel = %actor.name,
                        path = %path.display(),
                        baud_rate,
                        "serial device opened"
                    );
                    Ok(tokio::io::split(port))
                }
                Err(e) => {
                    tracing::warn!(
                        channel = %actor.name,
                        path = %path.display(),
                        error = %e,
                        "serial device unavailable, channel is inert"
                    );
                    Err(e.to_string())
                }
            };
            actor.run(rx, io).await;
        });

        handle
    }

    /// Start the actor over an already-open byte stream.
    pub fn spawn<R, W>(name: ChannelName, params: &SerialParams, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (handle, actor, rx) = Self::parts(name, params);
        tokio::spawn(actor.run(rx, Ok((reader, writer))));
        handle
    }

    fn parts(name: ChannelName, params: &SerialParams) -> (Self, Actor, mpsc::UnboundedReceiver<Request>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let actor = Actor {
            name: name.clone(),
            window: params.response_window,
            delimiter: params.delimiter.clone(),
            queue: VecDeque::new(),
            in_flight: None,
            inert: None,
            depth: Arc::clone(&depth),
            cancel: cancel.clone(),
        };
        let handle = Self {
            name,
            window: params.response_window,
            tx,
            depth,
            cancel,
        };
        (handle, actor, rx)
    }

    /// Queue `command` (already escape-expanded) and wait for its response
    /// line, delimiter trimmed.
    pub async fn send(&self, command: impl Into<String>) -> Result<String, ControlError> {
        let (done, response) = oneshot::channel();
        let request = Request {
            command: command.into(),
            done,
        };

        if self.tx.send(request).is_err() {
            return Err(self.closed());
        }
        self.depth.fetch_add(1, Ordering::Relaxed);

        response.await.unwrap_or_else(|_| Err(self.closed()))
    }

    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    pub fn response_window(&self) -> Duration {
        self.window
    }

    /// Commands queued or in flight, as last observed.
    pub fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Stop the actor. Pending commands complete with a connection error.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn closed(&self) -> ControlError {
        ControlError::Connection {
            channel: self.name.clone(),
            detail: "channel shut down".into(),
        }
    }
}

// ─── Actor ───────────────────────────────────────────────────────

struct InFlight {
    request: Request,
    deadline: Instant,
}

struct Actor {
    name: ChannelName,
    window: Duration,
    delimiter: String,
    queue: VecDeque<Request>,
    in_flight: Option<InFlight>,
    /// Set once the stream is gone; the reason is reported to every command.
    inert: Option<String>,
    depth: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl Actor {
    async fn run<R, W>(mut self, mut rx: mpsc::UnboundedReceiver<Request>, io: Result<(R, W), String>)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (mut reader, mut writer) = match io {
            Ok((r, w)) => (Some(r), Some(w)),
            Err(reason) => {
                self.inert = Some(reason);
                (None, None)
            }
        };
        let mut decoder = LineDecoder::new(&self.delimiter);
        let mut buf = [0u8; READ_BUF_SIZE];
        let cancel = self.cancel.clone();

        loop {
            let deadline = self.in_flight.as_ref().map(|f| f.deadline);

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(channel = %self.name, "serial channel: cancellation requested");
                    break;
                }
                request = rx.recv() => match request {
                    Some(request) => {
                        self.queue.push_back(request);
                        self.advance(&mut writer).await;
                    }
                    None => break,
                },
                read = read_some(&mut reader, &mut buf) => {
                    match read {
                        Ok(0) => self.go_inert("device stream closed".into(), &mut reader, &mut writer),
                        Ok(n) => {
                            for line in decoder.push(&buf[..n]) {
                                self.on_line(line);
                            }
                        }
                        Err(e) => self.go_inert(format!("read failed: {e}"), &mut reader, &mut writer),
                    }
                    self.advance(&mut writer).await;
                }
                _ = expiry(deadline) => {
                    self.expire();
                    self.advance(&mut writer).await;
                }
            }
        }

        rx.close();
        while let Ok(request) = rx.try_recv() {
            self.queue.push_back(request);
        }
        self.drain("channel shut down");
    }

    /// Start the next queued command if nothing is in flight.
    ///
    /// The response window covers the write too.
    async fn advance<W: AsyncWrite + Unpin>(&mut self, writer: &mut Option<W>) {
        while self.in_flight.is_none() && !self.cancel.is_cancelled() {
            let Some(request) = self.queue.pop_front() else {
                break;
            };

            let Some(w) = writer.as_mut() else {
                let detail = self.inert.clone().unwrap_or_else(|| "device not open".into());
                self.complete(request.done, Err(self.connection(detail)));
                continue;
            };

            let deadline = Instant::now() + self.window;
            let cancel = self.cancel.clone();
            let written = tokio::select! {
                _ = cancel.cancelled() => None,
                r = tokio::time::timeout_at(deadline, write_command(w, &request.command)) => Some(r),
            };

            match written {
                // Left for the shutdown drain.
                None => self.queue.push_front(request),
                Some(Ok(Ok(()))) => {
                    tracing::debug!(channel = %self.name, command = ?request.command, "serial command written");
                    self.in_flight = Some(InFlight { request, deadline });
                }
                Some(Ok(Err(e))) => {
                    tracing::warn!(
                        channel = %self.name,
                        command = ?request.command,
                        error = %e,
                        "serial write failed"
                    );
                    self.complete(request.done, Err(self.connection(format!("write failed: {e}"))));
                }
                Some(Err(_elapsed)) => {
                    tracing::warn!(channel = %self.name, command = ?request.command, "serial write stalled");
                    self.complete(request.done, Err(self.timeout(request.command)));
                }
            }
        }
        self.publish_depth();
    }

    fn on_line(&mut self, line: String) {
        match self.in_flight.take() {
            Some(InFlight { request, .. }) => {
                tracing::debug!(channel = %self.name, command = ?request.command, response = %line, "serial response");
                self.complete(request.done, Ok(line));
            }
            None => {
                tracing::debug!(channel = %self.name, line = %line, "discarding unsolicited line");
            }
        }
    }

    fn expire(&mut self) {
        if let Some(InFlight { request, .. }) = self.in_flight.take() {
            tracing::debug!(channel = %self.name, command = ?request.command, "serial response window elapsed");
            let err = self.timeout(request.command);
            self.complete(request.done, Err(err));
        }
    }

    fn go_inert<R, W>(&mut self, reason: String, reader: &mut Option<R>, writer: &mut Option<W>) {
        tracing::warn!(channel = %self.name, reason = %reason, "serial channel is inert");
        reader.take();
        writer.take();
        if let Some(InFlight { request, .. }) = self.in_flight.take() {
            self.complete(request.done, Err(self.connection(reason.clone())));
        }
        self.inert = Some(reason);
    }

    fn drain(&mut self, detail: &str) {
        if let Some(InFlight { request, .. }) = self.in_flight.take() {
            self.complete(request.done, Err(self.connection(detail.into())));
        }
        while let Some(request) = self.queue.pop_front() {
            self.complete(request.done, Err(self.connection(detail.into())));
        }
        self.publish_depth();
    }

    fn complete(&self, done: Completion, result: Result<String, ControlError>) {
        // The caller may have stopped waiting; nothing to report then.
        let _ = done.send(result);
    }

    fn timeout(&self, command: String) -> ControlError {
        ControlError::Timeout {
            channel: self.name.clone(),
            command,
            window_ms: self.window.as_millis() as u64,
        }
    }

    fn connection(&self, detail: String) -> ControlError {
        ControlError::Connection {
            channel: self.name.clone(),
            detail,
        }
    }

    fn publish_depth(&self) {
        let depth = self.queue.len() + usize::from(self.in_flight.is_some());
        self.depth.store(depth, Ordering::Relaxed);
    }
}

async fn write_command<W: AsyncWrite + Unpin>(writer: &mut W, command: &str) -> io::Result<()> {
    writer.write_all(command.as_bytes()).await?;
    writer.flush().await
}

async fn read_some<R: AsyncRead + Unpin>(reader: &mut Option<R>, buf: &mut [u8]) -> io::Result<usize> {
    match reader {
        Some(r) => r.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
