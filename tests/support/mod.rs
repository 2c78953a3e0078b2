//! Shared helpers for integration tests.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Starts a raw HTTP server that answers every request with `200 OK`, a
/// `Content-Length` of `declared_len`, only `sent` body bytes, and then holds
/// the connection open without sending more. Returns the base URL.
pub async fn stalled_body_server(declared_len: usize, sent: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind stalled server");
    let addr = listener.local_addr().expect("listener has an address");

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await;
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {declared_len}\r\n\r\n"
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&vec![b'v'; sent]).await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
        }
    });

    format!("http://{addr}")
}
