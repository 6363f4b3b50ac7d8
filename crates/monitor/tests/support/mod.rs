//! Local fake servers for probe tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use status_monitor::{Config, Service};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

/// Accept connections forever, greeting each with `banner`.
///
/// When `replies` is non-empty, every chunk read from the client is answered
/// with the first reply whose trigger it contains.
pub async fn banner_server(
    banner: &'static [u8],
    replies: Vec<(&'static str, &'static [u8])>,
) -> SocketAddr {
    let greeting = if banner.is_empty() { Vec::new() } else { vec![banner] };
    segmented_server(greeting, replies).await
}

/// Like [`banner_server`], but writes the greeting in separate pieces with a
/// short pause between them.
pub async fn segmented_server(
    greeting: Vec<&'static [u8]>,
    replies: Vec<(&'static str, &'static [u8])>,
) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { break };
            let greeting = greeting.clone();
            let replies = replies.clone();
            tokio::spawn(async move {
                for (i, piece) in greeting.iter().enumerate() {
                    if i > 0 {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                    if stream.write_all(piece).await.is_err() {
                        return;
                    }
                }
                let mut buf = [0u8; 1024];
                loop {
                    let n = match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let reply = replies.iter().find(|(trigger, _)| request.contains(trigger));
                    if let Some((_, reply)) = reply {
                        if stream.write_all(reply).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });

    address
}

/// Accepts and immediately closes every connection.
pub async fn hangup_tcp_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });

    address
}

/// Listener that accepts and holds connections without ever writing.
pub async fn silent_tcp_server() -> SocketAddr {
    banner_server(b"", Vec::new()).await
}

/// Address nothing is listening on
pub async fn closed_tcp_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);
    address
}

/// UDP responder: answers every datagram with `reply(request)`, or stays
/// silent when it returns `None`.
pub async fn udp_server(reply: fn(&[u8]) -> Option<Vec<u8>>) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let address = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        while let Ok((n, peer)) = socket.recv_from(&mut buf).await {
            if let Some(response) = reply(&buf[..n]) {
                let _ = socket.send_to(&response, peer).await;
            }
        }
    });

    address
}

/// Resolve a single `[[services]]` TOML entry.
pub fn service(toml: &str) -> Service {
    let config = Config::from_toml(toml).unwrap();
    config.services().unwrap().remove(0)
}

pub fn endpoint_service(kind: &str, address: SocketAddr, timeout: Duration) -> Service {
    service(&format!(
        r#"
        [[services]]
        name = "{kind}-under-test"
        type = "{kind}"
        host = "{}"
        port = {}
        timeout = "{}ms"
        "#,
        address.ip(),
        address.port(),
        timeout.as_millis()
    ))
}
