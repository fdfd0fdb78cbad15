//! Pulse channel against a fake LIRC daemon on loopback.

use std::time::Duration;

use avctl_core::wire::parse_keys;
use avctl_core::{ControlError, LircParams};
use avctl_transport::PulseChannel;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::time::Instant;

fn params(port: u16, settle_ms: u64) -> LircParams {
    LircParams {
        host: "127.0.0.1".into(),
        port,
        remote: "Samsung_BN59".into(),
        settle: Duration::from_millis(settle_ms),
        connect_timeout: Duration::from_millis(1_000),
    }
}

/// Accepts up to `max_conns` connections, reporting each payload with its
/// arrival time. The listener is dropped afterwards so later connects fail.
async fn fake_lircd(max_conns: usize) -> (u16, mpsc::UnboundedReceiver<(String, Instant)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for _ in 0..max_conns {
            let (mut sock, _) = listener.accept().await.unwrap();
            let at = Instant::now();
            let mut payload = String::new();
            sock.read_to_string(&mut payload).await.unwrap();
            let _ = tx.send((payload, at));
        }
    });

    (port, rx)
}

async fn collect(rx: &mut mpsc::UnboundedReceiver<(String, Instant)>) -> Vec<(String, Instant)> {
    let mut out = Vec::new();
    while let Some(item) = rx.recv().await {
        out.push(item);
    }
    out
}

#[tokio::test]
async fn keys_are_sent_in_order_one_connection_each() {
    let (port, mut rx) = fake_lircd(3).await;
    let ch = PulseChannel::new("ir".into(), params(port, 0));

    let keys = parse_keys(&["KEY_POWER", "KEY_VOLUP", "KEY_MUTE"]).unwrap();
    assert_eq!(ch.send_commands(&keys).await, Ok(3));

    let payloads: Vec<String> = collect(&mut rx).await.into_iter().map(|(p, _)| p).collect();
    assert_eq!(
        payloads,
        vec![
            "SEND_ONCE Samsung_BN59 KEY_POWER\r\n",
            "SEND_ONCE Samsung_BN59 KEY_VOLUP\r\n",
            "SEND_ONCE Samsung_BN59 KEY_MUTE\r\n",
        ]
    );
}

#[tokio::test]
async fn delay_entry_pauses_between_keys() {
    let (port, mut rx) = fake_lircd(2).await;
    let ch = PulseChannel::new("ir".into(), params(port, 0));

    let started = Instant::now();
    let keys = parse_keys(&["KEY_A", "delay:100", "KEY_B"]).unwrap();
    assert_eq!(ch.send_commands(&keys).await, Ok(3));
    assert!(started.elapsed() >= Duration::from_millis(100));

    let got = collect(&mut rx).await;
    assert_eq!(got.len(), 2, "delay must not produce network traffic");
    assert_eq!(got[0].0, "SEND_ONCE Samsung_BN59 KEY_A\r\n");
    assert_eq!(got[1].0, "SEND_ONCE Samsung_BN59 KEY_B\r\n");
    // Arrival stamps are taken server-side; allow for accept latency.
    let gap = got[1].1.duration_since(got[0].1);
    assert!(gap >= Duration::from_millis(95), "gap {gap:?}");
}

#[tokio::test]
async fn settle_delay_applies_after_each_key() {
    let (port, mut rx) = fake_lircd(2).await;
    let ch = PulseChannel::new("ir".into(), params(port, 80));

    let started = Instant::now();
    let keys = parse_keys(&["KEY_A", "KEY_B"]).unwrap();
    ch.send_commands(&keys).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(160));

    let got = collect(&mut rx).await;
    assert!(got[1].1.duration_since(got[0].1) >= Duration::from_millis(75));
}

#[tokio::test]
async fn first_failure_stops_the_sequence() {
    // One accepted connection, then the port is closed.
    let (port, mut rx) = fake_lircd(1).await;
    let ch = PulseChannel::new("ir".into(), params(port, 200));

    let started = Instant::now();
    let keys = parse_keys(&["KEY_A", "KEY_B", "delay:5000", "KEY_C"]).unwrap();
    let err = ch.send_commands(&keys).await.unwrap_err();

    match err {
        ControlError::Connection { detail, .. } => assert!(detail.starts_with("KEY_B:"), "{detail}"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_secs(5), "remaining entries were attempted");

    let got = collect(&mut rx).await;
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].0, "SEND_ONCE Samsung_BN59 KEY_A\r\n");
}

#[tokio::test]
async fn concurrent_sequences_on_one_channel_do_not_interleave() {
    let (port, mut rx) = fake_lircd(4).await;
    let ch = PulseChannel::new("ir".into(), params(port, 10));

    let a = tokio::spawn({
        let ch = ch.clone();
        async move { ch.send_commands(&parse_keys(&["A1", "A2"]).unwrap()).await }
    });
    let b = tokio::spawn({
        let ch = ch.clone();
        async move { ch.send_commands(&parse_keys(&["B1", "B2"]).unwrap()).await }
    });
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let keys: Vec<String> = collect(&mut rx)
        .await
        .into_iter()
        .map(|(p, _)| p.trim_end().rsplit(' ').next().unwrap().to_owned())
        .collect();
    assert!(
        keys == ["A1", "A2", "B1", "B2"] || keys == ["B1", "B2", "A1", "A2"],
        "interleaved: {keys:?}"
    );
}

/// A listener that never accepts, with its accept queue filled so further
/// connects hang in the handshake. The returned streams keep it full.
async fn saturated_listener() -> (TcpListener, Vec<TcpStream>) {
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(1).unwrap();
    let addr = listener.local_addr().unwrap();

    let mut held = Vec::new();
    for _ in 0..64 {
        match tokio::time::timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => held.push(stream),
            Ok(Err(e)) => panic!("connect failed: {e}"),
            Err(_) => return (listener, held),
        }
    }
    panic!("accept queue never filled");
}

#[tokio::test]
async fn connect_timeout_fails_key_and_stops_the_sequence() {
    let (listener, _held) = saturated_listener().await;
    let mut p = params(listener.local_addr().unwrap().port(), 0);
    p.connect_timeout = Duration::from_millis(150);
    let ch = PulseChannel::new("ir".into(), p);

    let started = Instant::now();
    let keys = parse_keys(&["KEY_A", "delay:5000", "KEY_B"]).unwrap();
    let err = ch.send_commands(&keys).await.unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(
        err,
        ControlError::Timeout {
            channel: "ir".into(),
            command: "KEY_A".into(),
            window_ms: 150,
        }
    );
    assert!(elapsed >= Duration::from_millis(150), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "remaining entries were attempted: {elapsed:?}");
}
