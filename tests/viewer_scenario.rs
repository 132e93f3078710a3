//! End-to-end: a fake viewer socket receiving pushes from the client.

use std::path::Path;
use std::time::Duration;

use efkreload::{Client, ClientError, FileAssetLoader, NetworkConfig};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

async fn viewer() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

async fn read_frame(peer: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 4];
    peer.read_exact(&mut header).await.unwrap();
    let mut payload = vec![0u8; i32::from_le_bytes(header) as usize];
    peer.read_exact(&mut payload).await.unwrap();
    payload
}

#[tokio::test]
async fn test_push_effect_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("laser.efk"), b"EFKS-data").unwrap();

    let (listener, port) = viewer().await;
    let client = Client::new(NetworkConfig::default());
    let (started, accepted) = tokio::join!(client.start("localhost", port), listener.accept());
    started.unwrap();
    let (mut peer, _) = accepted.unwrap();

    let loader = FileAssetLoader::new().with_root(dir.path());
    client
        .reload_from(&loader, Path::new("laser.efk"), "laser")
        .await
        .unwrap();

    let payload = read_frame(&mut peer).await;
    let key_len = i32::from_le_bytes(payload[..4].try_into().unwrap()) as usize;
    assert_eq!(key_len, 5);

    let key: Vec<u16> = payload[4..4 + key_len * 2]
        .chunks_exact(2)
        .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
        .collect();
    assert_eq!(String::from_utf16(&key).unwrap(), "laser");
    assert_eq!(&payload[4 + key_len * 2..], b"EFKS-data");

    client.stop().await;
    assert!(!client.is_connected());

    // The viewer sees the connection end once the client stops
    let mut buf = [0u8; 1];
    assert_eq!(peer.read(&mut buf).await.unwrap(), 0);
}

#[tokio::test]
async fn test_viewer_going_away() {
    let (listener, port) = viewer().await;
    let client = Client::new(NetworkConfig::default());
    let (started, accepted) = tokio::join!(client.start("127.0.0.1", port), listener.accept());
    started.unwrap();
    let (mut peer, _) = accepted.unwrap();

    client.send(&[0xAA, 0xBB]).await.unwrap();
    let mut buf = [0u8; 6];
    peer.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [0x04, 0x00, 0x00, 0x00, 0xAA, 0xBB]);

    drop(peer);
    tokio::time::timeout(Duration::from_secs(5), async {
        while client.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert!(matches!(
        client.send(&[0x01]).await,
        Err(ClientError::NotConnected)
    ));
}
