//! Queue discipline of the serial channel against an in-memory device.

use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use avctl_core::{ControlError, SerialParams};
use avctl_transport::SerialChannel;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::time::Instant;

fn params(window_ms: u64) -> SerialParams {
    SerialParams {
        path: PathBuf::from("/dev/null"),
        baud_rate: 9600,
        delimiter: "\r".into(),
        response_window: Duration::from_millis(window_ms),
    }
}

/// Channel wired to the returned device end of a duplex pipe.
fn channel(window_ms: u64) -> (SerialChannel, ReadHalf<DuplexStream>, WriteHalf<DuplexStream>) {
    let (ours, device) = tokio::io::duplex(1024);
    let (r, w) = tokio::io::split(ours);
    let ch = SerialChannel::spawn("amp".into(), &params(window_ms), r, w);
    let (dev_r, dev_w) = tokio::io::split(device);
    (ch, dev_r, dev_w)
}

/// Fake device: forwards each received command and answers `<cmd>:OK`.
fn echo_device(dev_r: ReadHalf<DuplexStream>, mut dev_w: WriteHalf<DuplexStream>) -> mpsc::UnboundedReceiver<String> {
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut segments = BufReader::new(dev_r).split(b'\r');
        while let Ok(Some(cmd)) = segments.next_segment().await {
            let cmd = String::from_utf8_lossy(&cmd).into_owned();
            let _ = seen_tx.send(cmd.clone());
            if dev_w.write_all(format!("{cmd}:OK\r").as_bytes()).await.is_err() {
                break;
            }
        }
    });
    seen_rx
}

#[tokio::test]
async fn concurrent_sends_are_serialized_fifo_and_complete_once() {
    let (ch, dev_r, dev_w) = channel(1_000);
    let mut seen = echo_device(dev_r, dev_w);

    let mut handles = Vec::new();
    for i in 0..10 {
        let ch = ch.clone();
        handles.push(tokio::spawn(async move { ch.send(format!("CMD{i}\r")).await }));
        // Spawned sends enqueue in spawn order on the current-thread runtime.
        tokio::task::yield_now().await;
    }

    for (i, h) in handles.into_iter().enumerate() {
        assert_eq!(h.await.unwrap(), Ok(format!("CMD{i}:OK")));
    }

    let mut order = Vec::new();
    while let Ok(cmd) = seen.try_recv() {
        order.push(cmd);
    }
    let expected: Vec<String> = (0..10).map(|i| format!("CMD{i}")).collect();
    assert_eq!(order, expected, "device saw commands in FIFO order, once each");
    assert_eq!(ch.queue_depth(), 0);
}

#[tokio::test]
async fn next_command_waits_for_previous_response() {
    let (ch, dev_r, mut dev_w) = channel(1_000);
    let mut segments = BufReader::new(dev_r).split(b'\r');

    let first = tokio::spawn({
        let ch = ch.clone();
        async move { ch.send("A\r").await }
    });
    assert_eq!(segments.next_segment().await.unwrap().unwrap(), b"A");

    let second = tokio::spawn({
        let ch = ch.clone();
        async move { ch.send("B\r").await }
    });

    // B must not hit the wire while A is in flight.
    let early = tokio::time::timeout(Duration::from_millis(50), segments.next_segment()).await;
    assert!(early.is_err(), "second command written before first completed");

    dev_w.write_all(b"A-RESP\r").await.unwrap();
    assert_eq!(first.await.unwrap(), Ok("A-RESP".into()));

    assert_eq!(segments.next_segment().await.unwrap().unwrap(), b"B");
    dev_w.write_all(b"B-RESP\r").await.unwrap();
    assert_eq!(second.await.unwrap(), Ok("B-RESP".into()));
}

#[tokio::test(start_paused = true)]
async fn timeout_releases_queue_to_next_command() {
    let (ch, dev_r, mut dev_w) = channel(50);
    let mut segments = BufReader::new(dev_r).split(b'\r');

    let first = tokio::spawn({
        let ch = ch.clone();
        async move { ch.send("SILENT\r").await }
    });
    let second = tokio::spawn({
        let ch = ch.clone();
        async move { ch.send("PW?\r").await }
    });

    let started = Instant::now();
    assert_eq!(segments.next_segment().await.unwrap().unwrap(), b"SILENT");

    let err = first.await.unwrap().unwrap_err();
    assert!(err.is_timeout(), "{err:?}");
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(50), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(60), "elapsed {elapsed:?}");

    assert_eq!(segments.next_segment().await.unwrap().unwrap(), b"PW?");
    dev_w.write_all(b"PWON\r").await.unwrap();
    assert_eq!(second.await.unwrap(), Ok("PWON".into()));
}

#[tokio::test]
async fn unsolicited_lines_are_discarded() {
    let (ch, dev_r, mut dev_w) = channel(1_000);

    // Pushed by the device before anything was asked.
    dev_w.write_all(b"MVMAX 80\rPWON\r").await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut segments = BufReader::new(dev_r).split(b'\r');
    let pending = tokio::spawn({
        let ch = ch.clone();
        async move { ch.send("MU?\r").await }
    });
    assert_eq!(segments.next_segment().await.unwrap().unwrap(), b"MU?");
    dev_w.write_all(b"MUOFF\r").await.unwrap();

    assert_eq!(pending.await.unwrap(), Ok("MUOFF".into()));
}

#[tokio::test]
async fn device_eof_makes_channel_inert() {
    let (ch, dev_r, dev_w) = channel(1_000);
    drop(dev_r);
    drop(dev_w);
    tokio::time::sleep(Duration::from_millis(20)).await;

    for _ in 0..3 {
        let err = ch.send("PW?\r").await.unwrap_err();
        assert!(matches!(err, ControlError::Connection { .. }), "{err:?}");
    }
}

#[tokio::test]
async fn responses_split_across_reads_are_reassembled() {
    let (ch, dev_r, mut dev_w) = channel(1_000);
    let mut segments = BufReader::new(dev_r).split(b'\r');

    let pending = tokio::spawn({
        let ch = ch.clone();
        async move { ch.send("SI?\r").await }
    });
    segments.next_segment().await.unwrap();
    dev_w.write_all(b"SI").await.unwrap();
    dev_w.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    dev_w.write_all(b"BD\r").await.unwrap();

    assert_eq!(pending.await.unwrap(), Ok("SIBD".into()));
}

#[tokio::test(start_paused = true)]
async fn stalled_write_times_out_and_releases_queue() {
    // The device end is held open but never read, so the pipe fills.
    let (ours, _device) = tokio::io::duplex(8);
    let (r, w) = tokio::io::split(ours);
    let ch = SerialChannel::spawn("amp".into(), &params(50), r, w);

    let started = Instant::now();
    let (first, second) = tokio::join!(ch.send("0123456789ABCDEF\r"), ch.send("PW?\r"));
    let elapsed = started.elapsed();

    assert_eq!(
        first,
        Err(ControlError::Timeout {
            channel: "amp".into(),
            command: "0123456789ABCDEF\r".into(),
            window_ms: 50,
        })
    );
    assert!(matches!(second, Err(ControlError::Timeout { .. })), "{second:?}");
    assert!(elapsed >= Duration::from_millis(100), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(120), "elapsed {elapsed:?}");
    assert_eq!(ch.queue_depth(), 0);
}

#[tokio::test]
async fn shutdown_releases_stalled_write() {
    let (ours, _device) = tokio::io::duplex(8);
    let (r, w) = tokio::io::split(ours);
    let ch = SerialChannel::spawn("amp".into(), &params(60_000), r, w);

    let pending = tokio::spawn({
        let ch = ch.clone();
        async move { ch.send("0123456789ABCDEF\r").await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    ch.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("send completes after shutdown")
        .unwrap();
    assert!(
        matches!(result, Err(ControlError::Connection { ref detail, .. }) if detail == "channel shut down"),
        "{result:?}"
    );
}

/// Writer whose first write fails, as when a USB adapter drops out.
struct FailFirstWrite<W> {
    inner: W,
    failed: bool,
}

impl<W: AsyncWrite + Unpin> AsyncWrite for FailFirstWrite<W> {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        if !self.failed {
            self.failed = true;
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "adapter unplugged")));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[tokio::test(start_paused = true)]
async fn write_failure_fails_that_command_and_serves_the_next() {
    let (ours, device) = tokio::io::duplex(1024);
    let (r, w) = tokio::io::split(ours);
    let writer = FailFirstWrite { inner: w, failed: false };
    let ch = SerialChannel::spawn("amp".into(), &params(1_000), r, writer);
    let (dev_r, dev_w) = tokio::io::split(device);
    let mut seen = echo_device(dev_r, dev_w);

    let (first, second) = tokio::join!(ch.send("PWON\r"), ch.send("PW?\r"));

    match first {
        Err(ControlError::Connection { channel, detail }) => {
            assert_eq!(channel.as_str(), "amp");
            assert!(detail.starts_with("write failed:"), "{detail}");
        }
        other => panic!("expected connection error, got {other:?}"),
    }
    assert_eq!(second, Ok("PW?:OK".to_string()));
    assert_eq!(seen.recv().await.as_deref(), Some("PW?"));
}
