#![allow(dead_code)]

pub mod tls;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use switchyard::{Config, LifecycleError, ListenerKind, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct Reply {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Ephemeral ports and a generous drain window.
pub fn config() -> Config {
    Config::default()
        .port(0)
        .https_port(0)
        .shutdown_timeout(Duration::from_secs(5))
}

/// Runs the HTTP listener on a background task and waits until it is bound.
pub async fn spawn_http(server: &Arc<Server>) -> (SocketAddr, JoinHandle<Result<(), LifecycleError>>) {
    spawn(server, ListenerKind::Http).await
}

pub async fn spawn(
    server: &Arc<Server>,
    kind: ListenerKind,
) -> (SocketAddr, JoinHandle<Result<(), LifecycleError>>) {
    let running = Arc::clone(server);
    let handle = tokio::spawn(async move {
        match kind {
            ListenerKind::Http => running.start().await,
            ListenerKind::Https => running.start_tls().await,
        }
    });
    for _ in 0..500 {
        if let Some(addr) = server.local_addr(kind) {
            return (addr, handle);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("listener did not come up");
}

pub async fn send(addr: SocketAddr, raw: &str) -> Reply {
    send_bytes(addr, raw.as_bytes()).await
}

pub async fn send_bytes(addr: SocketAddr, raw: &[u8]) -> Reply {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    let mut buf = Vec::new();
    // A reset after an aborted connection reads as an empty reply.
    let _ = stream.read_to_end(&mut buf).await;
    parse(&String::from_utf8_lossy(&buf))
}

pub async fn get(addr: SocketAddr, path: &str) -> Reply {
    send(addr, &format!("GET {path} HTTP/1.1\r\nHost: test\r\n\r\n")).await
}

pub fn parse(raw: &str) -> Reply {
    let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw, ""));
    let mut lines = head.lines();
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect();
    Reply {
        status,
        headers,
        body: body.to_string(),
    }
}
