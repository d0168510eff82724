//! Black-box exercise of the paired-connection HTTP surface: binds a real
//! `Driver`, then drives one `Connection` over an in-memory duplex pipe as
//! if it were a raw TCP socket.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use hap::categories::Category;
use hap::connection::Connection;
use hap::error::TlvErrorCode;
use hap::handler::Capabilities;
use hap::state::State;
use hap::tlv::{Decoded, Tag};
use hap::Config;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

async fn spawn_connection() -> (tokio::io::DuplexStream, tokio::task::JoinHandle<()>) {
    let config = Config::new(
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        0,
        "Test Bridge",
        Category::Bridge,
        "031-45-154",
        "ABCD",
        "/tmp/hap-http-surface-test-state.json",
    )
    .unwrap();
    let pincode = config.pincode_bytes().unwrap();
    let state = State::new(
        config.address,
        "11:22:33:44:55:66".into(),
        pincode,
        config.port,
        config.setup_id().to_string(),
    );

    let driver = hap::driver::Driver::bind(config, state, Vec::new(), Capabilities::default())
        .await
        .unwrap();
    let shared = driver.shared();

    let (client, server) = tokio::io::duplex(4096);
    let peer = "127.0.0.1:9001".parse().unwrap();
    let connection = Connection::new(peer, shared);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(async move {
        connection.run(server, cancel).await;
    });
    (client, handle)
}

async fn read_response_bytes(client: &mut tokio::io::DuplexStream) -> Vec<u8> {
    use tokio::io::AsyncReadExt;
    let mut buf = vec![0u8; 4096];
    let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
        .await
        .expect("response within timeout")
        .unwrap();
    buf.truncate(n);
    buf
}

async fn read_response(client: &mut tokio::io::DuplexStream) -> String {
    String::from_utf8_lossy(&read_response_bytes(client).await).into_owned()
}

#[tokio::test]
async fn unpaired_get_accessories_over_plaintext_is_unauthorized() {
    let (mut client, _handle) = spawn_connection().await;

    client
        .write_all(b"GET /accessories HTTP/1.1\r\nContent-Length: 0\r\n\r\n")
        .await
        .unwrap();

    let response = read_response(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 401"), "got: {response}");
}

#[tokio::test]
async fn unpaired_put_characteristics_over_plaintext_is_unauthorized() {
    let (mut client, _handle) = spawn_connection().await;

    client
        .write_all(b"PUT /characteristics HTTP/1.1\r\nContent-Length: 2\r\n\r\n{}")
        .await
        .unwrap();

    let response = read_response(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 401"), "got: {response}");
}

#[tokio::test]
async fn malformed_http_closes_the_connection_silently() {
    let (mut client, handle) = spawn_connection().await;

    client.write_all(b"not an http request at all\r\n\r\n").await.unwrap();

    use tokio::io::AsyncReadExt;
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
        .await
        .expect("socket should settle within timeout")
        .unwrap();
    assert_eq!(n, 0, "connection must close without writing any bytes back");

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("connection task should finish promptly")
        .unwrap();
}

#[tokio::test]
async fn pair_setup_is_reachable_over_plaintext() {
    let (mut client, _handle) = spawn_connection().await;

    // M1: just a SequenceNum=1 TLV, `06 01 01`.
    let tlv_body = [0x06u8, 0x01, 0x01];
    let mut request = format!(
        "POST /pair-setup HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
        tlv_body.len()
    )
    .into_bytes();
    request.extend_from_slice(&tlv_body);
    client.write_all(&request).await.unwrap();

    let response = read_response(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    assert!(response.contains("application/pairing+tlv8"));
}

#[tokio::test]
async fn unpaired_post_identify_is_reachable_over_plaintext() {
    let (mut client, _handle) = spawn_connection().await;

    client
        .write_all(b"POST /identify HTTP/1.1\r\nContent-Length: 0\r\n\r\n")
        .await
        .unwrap();

    let response = read_response(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 204"), "got: {response}");
}

#[tokio::test]
async fn out_of_sequence_pair_setup_gets_a_tlv_error_not_a_closed_socket() {
    let (mut client, handle) = spawn_connection().await;

    // M3 sent as the very first message, with no preceding M1.
    let tlv_body = [0x06u8, 0x01, 0x03];
    let mut request = format!(
        "POST /pair-setup HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
        tlv_body.len()
    )
    .into_bytes();
    request.extend_from_slice(&tlv_body);
    client.write_all(&request).await.unwrap();

    let response = read_response_bytes(&mut client).await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 200"), "got: {text}");
    assert!(text.contains("application/pairing+tlv8"));

    let header_end = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has a header/body boundary");
    let body = &response[header_end + 4..];
    let decoded = Decoded::decode(body).unwrap();
    assert_eq!(decoded.get_u8(Tag::SequenceNum), Some(2));
    assert_eq!(decoded.get_u8(Tag::ErrorCode), Some(TlvErrorCode::Authentication as u8));

    // The connection itself must still be alive, not torn down.
    assert!(!handle.is_finished());
}
