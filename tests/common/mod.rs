//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use http_bootloader::config::BootloaderConfig;
use http_bootloader::net::Listener;
use http_bootloader::storage::DirStore;
use http_bootloader::{Bootloader, Shutdown};

const CLIENT_TIMEOUT: Duration = Duration::from_secs(15);

/// A bootloader serving a temporary directory on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub root: TempDir,
}

impl TestServer {
    pub fn path(&self, name: &str) -> std::path::PathBuf {
        self.root.path().join(name)
    }

    pub fn put(&self, name: &str, contents: &str) {
        std::fs::write(self.path(name), contents).unwrap();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a server, letting the test adjust the configuration first.
pub async fn start_server<F>(configure: F) -> TestServer
where
    F: FnOnce(&mut BootloaderConfig),
{
    let root = tempfile::tempdir().unwrap();
    let mut config = BootloaderConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.storage.root = root.path().display().to_string();
    config.stream.poll_interval_ms = 10;
    configure(&mut config);

    let store = Arc::new(DirStore::new(&config.storage.root));
    let bootloader = Bootloader::new(&config, store).unwrap();
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = bootloader.into_server().run(listener, signal).await;
    });

    TestServer { addr, shutdown, root }
}

/// Configure the runner to execute `.sh` files with `sh -s`.
pub fn shell_runner(config: &mut BootloaderConfig) {
    config.runner.interpreter = "sh".into();
    config.runner.interpreter_args = vec!["-s".into()];
    config.runner.script_extension = "sh".into();
    config.runner.stop_timeout_secs = 5;
}

/// Send raw request bytes and read until the server closes the connection.
pub async fn send(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    read_all(stream).await
}

pub async fn get(addr: SocketAddr, path: &str) -> String {
    send(addr, format!("GET {} HTTP/1.1\r\nHost: device\r\n\r\n", path).as_bytes()).await
}

pub async fn read_all(mut stream: TcpStream) -> String {
    let mut received = Vec::new();
    tokio::time::timeout(CLIENT_TIMEOUT, stream.read_to_end(&mut received))
        .await
        .expect("server did not close the connection")
        .unwrap();
    String::from_utf8(received).unwrap()
}

pub fn status(response: &str) -> u16 {
    response
        .split(' ')
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0)
}

pub fn body(response: &str) -> &str {
    response.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or("")
}

pub fn multipart_upload(name: &str, contents: &str) -> String {
    let body = format!(
        "------boundary\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n{}\r\n------boundary--\r\n",
        name, contents
    );
    format!(
        "POST /upload HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=----boundary\r\n\
         Content-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

pub fn exists(root: &Path, name: &str) -> bool {
    root.join(name).exists()
}
