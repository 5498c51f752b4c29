//! Connection handling for individual client connections

use super::Shared;
use super::handler;
use crate::error::ProtocolError;
use crate::protocol::{
    Command, ParseResult, PendingStorageCommand, ResponseWriter, parse_command_line,
    parse_storage_data,
};
use bytes::{Buf, BytesMut};
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Where the connection is in the request cycle
enum State {
    AwaitingCommand,
    ReadingPayload(PendingStorageCommand),
}

/// What to do after draining the read buffer
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
    /// The stream can no longer be framed; reply, then fail the connection
    Fatal(ProtocolError),
}

/// Per-connection buffers and parser state
struct Connection {
    read_buf: BytesMut,
    response: ResponseWriter,
    state: State,
    /// Bytes of a rejected payload still to be dropped from the stream
    discard: usize,
}

/// Handle a single client connection
pub(crate) async fn handle<S>(shared: Arc<Shared>, mut stream: S) -> crate::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = Connection::new(&shared);
    let result = conn.serve(&shared, &mut stream).await;
    shared.metrics.active_connections.dec();
    result
}

impl Connection {
    fn new(shared: &Shared) -> Self {
        Self {
            read_buf: BytesMut::with_capacity(shared.config.read_buffer_size),
            response: ResponseWriter::new(shared.config.write_buffer_size),
            state: State::AwaitingCommand,
            discard: 0,
        }
    }

    async fn serve<S>(&mut self, shared: &Shared, stream: &mut S) -> crate::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let idle_timeout = shared.config.idle_timeout();

        loop {
            let result = tokio::select! {
                _ = shared.cancel_token.cancelled() => {
                    break;
                }
                result = with_timeout(idle_timeout, stream.read_buf(&mut self.read_buf)) => result,
            };

            match result {
                Ok(0) => {
                    // Connection closed
                    break;
                }
                Ok(n) => {
                    shared.metrics.bytes_read.inc_by(n as u64);
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    debug!("Closing idle connection");
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            let flow = self.process_buffer(shared);

            // One write per read, covering every command completed above
            if !self.response.is_empty() {
                let buf = self.response.take();
                shared.metrics.bytes_written.inc_by(buf.len() as u64);
                with_timeout(idle_timeout, stream.write_all(&buf)).await?;
            }

            match flow {
                Flow::Continue => {}
                Flow::Close => break,
                Flow::Fatal(e) => {
                    let _ = stream.shutdown().await;
                    return Err(e.into());
                }
            }
        }

        // Peer may already be gone
        let _ = stream.shutdown().await;
        Ok(())
    }

    /// Execute every complete command in the read buffer
    fn process_buffer(&mut self, shared: &Shared) -> Flow {
        loop {
            if self.discard > 0 {
                let n = self.discard.min(self.read_buf.len());
                self.read_buf.advance(n);
                self.discard -= n;
                if self.discard > 0 {
                    return Flow::Continue;
                }
            }

            let parse_result = match &self.state {
                State::AwaitingCommand => parse_command_line(&self.read_buf),
                State::ReadingPayload(pending) => parse_storage_data(&self.read_buf, pending),
            };

            match parse_result {
                ParseResult::Pending(pending) => {
                    // Make room for the whole data block up front
                    let needed = pending.command_line_end + pending.bytes + 4;
                    self.read_buf
                        .reserve(needed.saturating_sub(self.read_buf.len()));
                    self.state = State::ReadingPayload(pending);
                }
                ParseResult::Complete(cmd, consumed) => {
                    self.state = State::AwaitingCommand;
                    let quit = matches!(cmd, Command::Quit);
                    handler::execute(shared, cmd, &mut self.response);
                    self.read_buf.advance(consumed);
                    if quit {
                        return Flow::Close;
                    }
                }
                ParseResult::NeedMoreData => return Flow::Continue,
                ParseResult::Error(e, consumed) => {
                    self.state = State::AwaitingCommand;
                    shared.metrics.protocol_errors.inc();
                    debug!("Protocol error: {}", e);
                    handler::protocol_error(&e, &mut self.response);

                    let available = consumed.min(self.read_buf.len());
                    self.read_buf.advance(available);
                    self.discard = consumed - available;

                    if e.is_fatal() {
                        return Flow::Fatal(e);
                    }
                }
            }
        }
    }
}

/// Bound an I/O future by the idle timeout, if one is configured
async fn with_timeout<F, T>(limit: Option<Duration>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "idle timeout"))?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheError;
    use crate::config::ServerConfig;
    use crate::protocol::MAX_VALUE_LENGTH;
    use crate::server::tests::test_shared;
    use tokio::io::DuplexStream;

    fn spawn_connection(
        config: ServerConfig,
    ) -> (
        DuplexStream,
        Arc<Shared>,
        tokio::task::JoinHandle<crate::Result<()>>,
    ) {
        let shared = test_shared(config);
        let (client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(handle(shared.clone(), server));
        (client, shared, task)
    }

    /// Send `input`, close the write side and collect everything the
    /// server replied
    async fn roundtrip(input: &[u8]) -> Vec<u8> {
        let (mut client, _shared, task) = spawn_connection(ServerConfig::default());
        client.write_all(input).await.unwrap();
        client.shutdown().await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        task.await.unwrap().unwrap();
        out
    }

    #[tokio::test]
    async fn test_pipelined_commands() {
        let out = roundtrip(b"set a 0 0 1\r\n1\r\nset b 0 0 1\r\n2\r\nget a b\r\n").await;
        assert_eq!(
            out,
            b"STORED\r\nSTORED\r\nVALUE a 0 1\r\n1\r\nVALUE b 0 1\r\n2\r\nEND\r\n"
        );
    }

    #[tokio::test]
    async fn test_bad_data_chunk_recovers() {
        let out = roundtrip(b"set k 0 0 3\r\nhello\r\nget k\r\n").await;
        assert_eq!(out, b"CLIENT_ERROR bad data chunk\r\nEND\r\n");
    }

    #[tokio::test]
    async fn test_too_large_value_is_swallowed() {
        let mut input = format!("set big 0 0 {}\r\n", MAX_VALUE_LENGTH + 1).into_bytes();
        input.extend(std::iter::repeat_n(b'x', MAX_VALUE_LENGTH + 1));
        input.extend_from_slice(b"\r\nversion\r\n");

        let (mut client, shared, task) = spawn_connection(ServerConfig::default());
        let writer = tokio::spawn(async move {
            client.write_all(&input).await.unwrap();
            client.shutdown().await.unwrap();
            let mut out = Vec::new();
            client.read_to_end(&mut out).await.unwrap();
            out
        });
        let out = writer.await.unwrap();
        task.await.unwrap().unwrap();

        let expected = b"SERVER_ERROR object too large for cache\r\nVERSION ";
        assert!(out.starts_with(expected));
        assert!(shared.store.is_empty());
    }

    #[tokio::test]
    async fn test_partial_payload_is_not_applied() {
        let (mut client, shared, task) = spawn_connection(ServerConfig::default());
        client.write_all(b"set k 0 0 5\r\nhel").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(shared.store.get(b"k").is_none());

        client.write_all(b"lo\r\n").await.unwrap();
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"STORED\r\n");

        drop(client);
        task.await.unwrap().unwrap();
        assert_eq!(shared.store.get(b"k").unwrap().value.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_quit_closes_after_flushing_earlier_replies() {
        let out = roundtrip(b"version\r\nquit\r\nversion\r\n").await;
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("VERSION").count(), 1);
    }

    #[tokio::test]
    async fn test_line_too_long_closes_connection() {
        let (mut client, shared, task) = spawn_connection(ServerConfig::default());
        client
            .write_all(&vec![b'a'; crate::protocol::MAX_LINE_LENGTH + 10])
            .await
            .unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        let result = task.await.unwrap();

        assert!(matches!(
            result,
            Err(CacheError::Protocol(ProtocolError::LineTooLong))
        ));
        assert_eq!(out, b"CLIENT_ERROR line too long\r\n");
        assert_eq!(shared.metrics.protocol_errors.get(), 1);
    }

    #[tokio::test]
    async fn test_idle_timeout_closes_connection() {
        let config = ServerConfig {
            idle_timeout_secs: 1,
            ..Default::default()
        };
        let (mut client, _shared, task) = spawn_connection(config);
        let mut out = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut out))
            .await
            .expect("idle connection was not closed")
            .unwrap();
        assert!(out.is_empty());
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancel_closes_connection() {
        let (mut client, shared, task) = spawn_connection(ServerConfig::default());
        shared.cancel_token.cancel();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_active_connection_gauge() {
        let (client, shared, task) = spawn_connection(ServerConfig::default());
        shared.metrics.active_connections.inc();
        drop(client);
        task.await.unwrap().unwrap();
        assert_eq!(shared.metrics.active_connections.get(), 0);
    }
}
