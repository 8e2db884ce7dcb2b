//! End-to-end tests over real TCP sockets on 127.0.0.1.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use telerelay_lib::{Config, Relay, RelayServer};
use telerelay_protocol::{lrc, FieldName, FieldReport, Frame, SourceId, SourceStatus};

struct Harness {
    relay: Arc<Relay>,
    source_addr: SocketAddr,
    listener_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    server: JoinHandle<()>,
}

async fn start() -> Harness {
    let config = Config {
        host: "127.0.0.1".into(),
        source_port: 0,
        listener_port: 0,
        health_addr: None,
        log_json: false,
    };
    let relay = Arc::new(Relay::new());
    let server = RelayServer::bind(&config, Arc::clone(&relay)).await.unwrap();
    let source_addr = server.source_addr().unwrap();
    let listener_addr = server.listener_addr().unwrap();

    let (shutdown, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(server.run(shutdown_rx));

    Harness {
        relay,
        source_addr,
        listener_addr,
        shutdown,
        server,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn frame(id: &str, status: SourceStatus, sequence: u16, fields: &[(&str, u32)]) -> Frame {
    Frame {
        tag: 0x10,
        sequence,
        source_id: SourceId::try_from(id).unwrap(),
        status,
        fields: fields
            .iter()
            .map(|(name, value)| FieldReport::new(FieldName::try_from(*name).unwrap(), *value))
            .collect(),
    }
}

async fn read_bytes(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(2), stream.read_exact(&mut buf))
        .await
        .expect("timed out reading from relay")
        .unwrap();
    buf
}

async fn read_line<R: tokio::io::AsyncBufRead + Unpin>(reader: &mut R) -> String {
    let mut line = String::new();
    tokio::time::timeout(Duration::from_secs(2), reader.read_line(&mut line))
        .await
        .expect("timed out reading listener line")
        .unwrap();
    line
}

#[tokio::test]
async fn test_frame_acked_and_relayed_to_listener() {
    let h = start().await;

    let listener = TcpStream::connect(h.listener_addr).await.unwrap();
    let mut listener = BufReader::new(listener);
    wait_until(|| h.relay.listeners().len() == 1).await;

    let mut source = TcpStream::connect(h.source_addr).await.unwrap();
    let bytes = frame("SOURCE01", SourceStatus::Active, 7, &[("TEMP0001", 42)])
        .encode()
        .unwrap();
    source.write_all(&bytes).await.unwrap();

    let ack = read_bytes(&mut source, 4).await;
    assert_eq!(ack, vec![0x11, 0x00, 0x07, lrc(&[0x11, 0x00, 0x07])]);
    assert_eq!(read_line(&mut listener).await, "[SOURCE01] TEMP0001 | 42\r\n");

    h.shutdown.send(true).unwrap();
    h.server.await.unwrap();
}

#[tokio::test]
async fn test_corrupted_frame_gets_nak() {
    let h = start().await;

    let mut source = TcpStream::connect(h.source_addr).await.unwrap();
    let mut bytes = frame("SOURCE01", SourceStatus::Active, 7, &[("TEMP0001", 42)])
        .encode()
        .unwrap()
        .to_vec();
    let last = bytes.len() - 1;
    bytes[last] = bytes[last].wrapping_add(1);
    source.write_all(&bytes).await.unwrap();

    assert_eq!(read_bytes(&mut source, 3).await, vec![0x12, 0x00, 0x12]);
    assert!(h
        .relay
        .sources()
        .get(&SourceId::try_from("SOURCE01").unwrap())
        .await
        .is_none());

    h.shutdown.send(true).unwrap();
    h.server.await.unwrap();
}

#[tokio::test]
async fn test_late_listener_receives_snapshot_of_two_sources() {
    let h = start().await;

    for (id, status, seq) in [
        ("SOURCE01", SourceStatus::Active, 7u16),
        ("SOURCE02", SourceStatus::Recharge, 11u16),
    ] {
        let mut source = TcpStream::connect(h.source_addr).await.unwrap();
        source
            .write_all(&frame(id, status, seq, &[]).encode().unwrap())
            .await
            .unwrap();
        read_bytes(&mut source, 4).await;
    }

    let listener = TcpStream::connect(h.listener_addr).await.unwrap();
    let mut listener = BufReader::new(listener);
    let mut lines = vec![read_line(&mut listener).await, read_line(&mut listener).await];
    lines.sort();

    assert!(lines[0].starts_with("[SOURCE01] 7 | ACTIVE | "));
    assert!(lines[1].starts_with("[SOURCE02] 11 | RECHARGE | "));
    for line in &lines {
        let age = line
            .trim_end()
            .rsplit(" | ")
            .next()
            .unwrap()
            .parse::<u64>();
        assert!(age.is_ok(), "age should be an integer: {line:?}");
        assert!(line.ends_with("\r\n"));
    }

    h.shutdown.send(true).unwrap();
    h.server.await.unwrap();
}

#[tokio::test]
async fn test_departed_listener_does_not_disturb_sources() {
    let h = start().await;

    let gone = TcpStream::connect(h.listener_addr).await.unwrap();
    let stays = TcpStream::connect(h.listener_addr).await.unwrap();
    let mut stays = BufReader::new(stays);
    wait_until(|| h.relay.listeners().len() == 2).await;
    drop(gone);

    let mut source = TcpStream::connect(h.source_addr).await.unwrap();
    for seq in 1..=20u16 {
        let bytes = frame("SOURCE01", SourceStatus::Active, seq, &[("TEMP0001", seq as u32)])
            .encode()
            .unwrap();
        source.write_all(&bytes).await.unwrap();
        let ack = read_bytes(&mut source, 4).await;
        assert_eq!(ack[0], 0x11);
        assert_eq!(u16::from_be_bytes([ack[1], ack[2]]), seq);
        assert_eq!(
            read_line(&mut stays).await,
            format!("[SOURCE01] TEMP0001 | {}\r\n", seq)
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    wait_until(|| h.relay.listeners().len() == 1).await;

    h.shutdown.send(true).unwrap();
    h.server.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_listener_channels() {
    let h = start().await;

    let mut listener = TcpStream::connect(h.listener_addr).await.unwrap();
    wait_until(|| h.relay.listeners().len() == 1).await;

    h.shutdown.send(true).unwrap();
    h.server.await.unwrap();

    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), listener.read_to_end(&mut rest))
        .await
        .expect("listener channel was not closed")
        .unwrap();
    assert!(rest.is_empty());
    assert!(h.relay.listeners().is_empty());
}
