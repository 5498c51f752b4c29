#![allow(dead_code)]

use lrucached::config::{Config, ServerConfig, StorageConfig};
use lrucached::metrics::Metrics;
use lrucached::server::{Server, TcpTransport};
use lrucached::storage::{EntryStore, ManualClock};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

pub const START_TIME: u64 = 1_700_000_000;

/// Server running on an ephemeral port, stopped on drop
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<EntryStore>,
    pub metrics: Arc<Metrics>,
    pub clock: Arc<ManualClock>,
    cancel_token: CancellationToken,
}

impl TestServer {
    pub async fn start() -> TestServer {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(mut config: Config) -> TestServer {
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;

        let clock = Arc::new(ManualClock::new(START_TIME));
        let metrics = Arc::new(Metrics::new());
        let store = Arc::new(EntryStore::new(
            &config.storage,
            clock.clone(),
            metrics.clone(),
        ));
        let cancel_token = CancellationToken::new();

        let transport = TcpTransport::bind(&config.server.listen_addr())
            .await
            .unwrap();
        let server = Server::new(
            transport,
            config.server,
            store.clone(),
            metrics.clone(),
            cancel_token.clone(),
        );
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move { server.run().await });

        TestServer {
            addr,
            store,
            metrics,
            clock,
            cancel_token,
        }
    }

    pub async fn client(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

pub fn server_config(server: ServerConfig) -> Config {
    Config {
        server,
        ..Default::default()
    }
}

pub fn storage_config(storage: StorageConfig) -> Config {
    Config {
        storage,
        ..Default::default()
    }
}

/// Raw memcached text client
pub struct TestClient {
    stream: BufReader<TcpStream>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> TestClient {
        let stream = TcpStream::connect(addr).await.unwrap();
        TestClient {
            stream: BufReader::new(stream),
        }
    }

    pub async fn send(&mut self, data: &[u8]) {
        self.stream.get_mut().write_all(data).await.unwrap();
    }

    /// Next reply line without its CRLF
    pub async fn line(&mut self) -> String {
        let mut line = String::new();
        self.stream.read_line(&mut line).await.unwrap();
        assert!(line.ends_with("\r\n"), "truncated reply: {line:?}");
        line.truncate(line.len() - 2);
        line
    }

    /// Send a request and read its single-line reply
    pub async fn request(&mut self, data: &[u8]) -> String {
        self.send(data).await;
        self.line().await
    }

    /// Send a retrieval request and collect reply lines up to `END`
    pub async fn retrieve(&mut self, data: &[u8]) -> Vec<String> {
        self.send(data).await;
        let mut lines = Vec::new();
        loop {
            let line = self.line().await;
            if line == "END" {
                return lines;
            }
            lines.push(line);
        }
    }

    pub async fn set(&mut self, key: &str, value: &str) -> String {
        let cmd = format!("set {key} 0 0 {}\r\n{value}\r\n", value.len());
        self.request(cmd.as_bytes()).await
    }

    /// Value stored under `key`, if any
    pub async fn get(&mut self, key: &str) -> Option<String> {
        let lines = self.retrieve(format!("get {key}\r\n").as_bytes()).await;
        match lines.as_slice() {
            [] => None,
            [_header, value] => Some(value.clone()),
            other => panic!("unexpected get reply: {other:?}"),
        }
    }

    /// Read until the server closes the connection
    pub async fn read_to_close(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let _ = self.stream.read_to_end(&mut out).await;
        out
    }
}
