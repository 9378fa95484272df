//! End-to-end scenarios driven over a real TCP connection, one aggregator
//! instance per test on an ephemeral port.

use aggregator::run::serve;
use aggregator::Config;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;

struct Harness {
    port: u16,
    checkpoint_path: std::path::PathBuf,
    _tempdir: tempfile::TempDir,
    shutdown_tx: watch::Sender<bool>,
    server: tokio::task::JoinHandle<Result<(), aggregator::AggError>>,
}

impl Harness {
    async fn start() -> Self {
        Self::start_with_expiry(Duration::from_millis(30_000)).await
    }

    async fn start_with_expiry(expiry_window: Duration) -> Self {
        let tempdir = tempfile::tempdir().unwrap();
        let checkpoint_path = tempdir.path().join("data.json");
        let port = free_port();

        let config = Config {
            port,
            checkpoint_path: checkpoint_path.clone(),
            checkpoint_interval: Duration::from_secs(3600),
            expiry_window,
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(serve(config, shutdown_rx));

        // give the acceptor a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;

        Harness {
            port,
            checkpoint_path,
            _tempdir: tempdir,
            shutdown_tx,
            server,
        }
    }

    async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.server.await;
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Connects, reads the handshake line, and returns (stream, advertised clock).
async fn connect(port: u16) -> (TcpStream, u64) {
    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    let clock: u64 = line.trim().parse().unwrap();
    (reader.into_inner(), clock)
}

async fn send_request(stream: &mut TcpStream, request: &str) -> String {
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    line.trim_end().to_string()
}

fn put_request(server_id: &str, clock: u64, body: &str) -> String {
    format!(
        "PUT /uploadData HTTP/1.1\r\nServerId: {}\r\nLamportClock: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        server_id,
        clock,
        body.len(),
        body
    )
}

fn get_request(server_id: &str, clock: u64, station: Option<&str>) -> String {
    let mut req = format!(
        "GET /weather.json HTTP/1.1\r\nServerId: {}\r\nLamportClock: {}\r\n",
        server_id, clock
    );
    if let Some(station) = station {
        req.push_str(&format!("StationId: {}\r\n", station));
    }
    req.push_str("\r\n");
    req
}

#[tokio::test]
async fn basic_put_then_get() {
    let harness = Harness::start().await;
    let (mut stream, clock) = connect(harness.port).await;
    let resp = send_request(
        &mut stream,
        &put_request("producer-1", clock, r#"{"id":"stationA","tempF":72}"#),
    )
    .await;
    assert_eq!(resp, "200 OK");

    let (mut stream, clock) = connect(harness.port).await;
    let resp = send_request(&mut stream, &get_request("client-1", clock, Some("stationA"))).await;
    assert!(resp.contains("\"tempF\":72"));

    harness.shutdown().await;
}

#[tokio::test]
async fn put_missing_producer_id_is_rejected() {
    let harness = Harness::start().await;
    let (mut stream, clock) = connect(harness.port).await;
    let req = format!(
        "PUT /uploadData HTTP/1.1\r\nLamportClock: {}\r\nContent-Length: {}\r\n\r\n{}",
        clock,
        r#"{"id":"stationA"}"#.len(),
        r#"{"id":"stationA"}"#
    );
    let resp = send_request(&mut stream, &req).await;
    assert_eq!(resp, "400 Null ServerId");

    harness.shutdown().await;
}

#[tokio::test]
async fn put_missing_station_id_is_rejected() {
    let harness = Harness::start().await;
    let (mut stream, clock) = connect(harness.port).await;
    let resp = send_request(&mut stream, &put_request("producer-1", clock, r#"{"tempF":72}"#)).await;
    assert_eq!(resp, "400 Null StationId");

    harness.shutdown().await;
}

#[tokio::test]
async fn get_defaults_to_most_recently_put_station() {
    let harness = Harness::start().await;
    let (mut stream, clock) = connect(harness.port).await;
    send_request(
        &mut stream,
        &put_request("producer-1", clock, r#"{"id":"stationZ","tempF":10}"#),
    )
    .await;

    let (mut stream, clock) = connect(harness.port).await;
    let resp = send_request(&mut stream, &get_request("client-1", clock, None)).await;
    assert!(resp.contains("stationZ"));

    harness.shutdown().await;
}

#[tokio::test]
async fn expired_producer_data_is_hidden_then_rearms_on_new_put() {
    // a short expiry window keeps the real-time wait in this test small
    let harness = Harness::start_with_expiry(Duration::from_millis(200)).await;

    let (mut stream, clock) = connect(harness.port).await;
    let resp = send_request(
        &mut stream,
        &put_request("producer-1", clock, r#"{"id":"stationA","tempF":72}"#),
    )
    .await;
    assert_eq!(resp, "200 OK");

    let (mut stream, clock) = connect(harness.port).await;
    let resp = send_request(&mut stream, &get_request("client-1", clock, Some("stationA"))).await;
    assert!(resp.contains("\"tempF\":72"), "data should be visible before expiry");

    tokio::time::sleep(Duration::from_millis(300)).await;

    let (mut stream, clock) = connect(harness.port).await;
    let resp = send_request(&mut stream, &get_request("client-1", clock, Some("stationA"))).await;
    assert_eq!(resp, "404 Data Not Found", "data should be hidden once the producer goes quiet");

    // a fresh PUT re-arms the producer's liveness without erasing history
    let (mut stream, clock) = connect(harness.port).await;
    let resp = send_request(
        &mut stream,
        &put_request("producer-1", clock, r#"{"id":"stationA","tempF":75}"#),
    )
    .await;
    assert_eq!(resp, "200 OK");

    let (mut stream, clock) = connect(harness.port).await;
    let resp = send_request(&mut stream, &get_request("client-1", clock, Some("stationA"))).await;
    assert!(resp.contains("\"tempF\":75"), "data should be visible again after re-arming");

    harness.shutdown().await;
}

#[tokio::test]
async fn unknown_method_is_rejected() {
    let harness = Harness::start().await;
    let (mut stream, _clock) = connect(harness.port).await;
    let resp = send_request(&mut stream, "DELETE /x HTTP/1.1\r\n\r\n").await;
    assert_eq!(resp, "400 Bad Request");

    harness.shutdown().await;
}

#[tokio::test]
async fn checkpoint_round_trip_across_restart() {
    let harness = Harness::start().await;
    let (mut stream, clock) = connect(harness.port).await;
    send_request(
        &mut stream,
        &put_request("producer-1", clock, r#"{"id":"stationA","tempF":72}"#),
    )
    .await;

    let checkpoint_path = harness.checkpoint_path.clone();
    harness.shutdown().await;

    // the final best-effort checkpoint on shutdown should have persisted
    // the PUT above
    let restored = aggregator::checkpoint::load(&checkpoint_path, Duration::from_millis(30_000));
    assert!(restored.buckets.contains_key("stationA"));
    assert_eq!(restored.most_recent.as_ref().unwrap().0, "stationA");
}
