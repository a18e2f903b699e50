// src/network/transport.rs
//! Pool transports
//!
//! `ws://` and `wss://` pools speak one JSON document per WebSocket text
//! frame; `stratum+tcp://` pools speak newline-delimited JSON over a plain
//! TCP stream. Both look the same to the pool client.

use crate::utils::error::MinerError;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tungstenite::protocol::Message;
use url::Url;

/// An open connection to a pool
pub enum Connection {
    /// WebSocket stream (`ws://` or `wss://`)
    Ws(Box<WebSocketStream<MaybeTlsStream<TcpStream>>>),
    /// Line-oriented TCP stream (`stratum+tcp://`)
    Tcp {
        /// Incoming lines
        reader: Lines<BufReader<OwnedReadHalf>>,
        /// Outgoing half
        writer: OwnedWriteHalf,
    },
}

impl Connection {
    /// Opens a connection for the given pool URL
    ///
    /// # Errors
    /// Returns `MinerError` if the URL is unusable, DNS resolution fails,
    /// or the TCP/WebSocket handshake fails.
    pub async fn open(url_str: &str) -> Result<Self, MinerError> {
        let url = Url::parse(url_str)?;

        match url.scheme() {
            "ws" | "wss" => {
                let (ws_stream, _) = tokio_tungstenite::connect_async(url_str).await.map_err(|e| {
                    if e.to_string().contains("dns error") {
                        MinerError::ConnectionError(format!(
                            "DNS resolution failed. Check pool URL: {}",
                            url_str
                        ))
                    } else {
                        MinerError::from(e)
                    }
                })?;
                Ok(Connection::Ws(Box::new(ws_stream)))
            }
            "stratum+tcp" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| MinerError::ConnectionError(format!("no host in {}", url_str)))?;
                let port = url
                    .port()
                    .ok_or_else(|| MinerError::ConnectionError(format!("no port in {}", url_str)))?;
                let stream = TcpStream::connect((host, port)).await?;
                stream.set_nodelay(true)?;
                let (read_half, write_half) = stream.into_split();
                Ok(Connection::Tcp {
                    reader: BufReader::new(read_half).lines(),
                    writer: write_half,
                })
            }
            other => Err(MinerError::ConnectionError(format!(
                "unsupported pool scheme '{}'",
                other
            ))),
        }
    }

    /// Sends one JSON document
    pub async fn send_text(&mut self, text: String) -> Result<(), MinerError> {
        match self {
            Connection::Ws(ws) => ws.send(Message::Text(text.into())).await?,
            Connection::Tcp { writer, .. } => {
                writer.write_all(text.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
        Ok(())
    }

    /// Waits for the next JSON document
    ///
    /// Returns `Ok(None)` when the pool closed the connection.
    pub async fn next_text(&mut self) -> Result<Option<String>, MinerError> {
        match self {
            Connection::Ws(ws) => loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                    Some(Ok(Message::Close(_))) | None => return Ok(None),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                }
            },
            Connection::Tcp { reader, .. } => loop {
                match reader.next_line().await? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => return Ok(Some(line)),
                    None => return Ok(None),
                }
            },
        }
    }

    /// Best-effort close
    pub async fn close(&mut self) {
        match self {
            Connection::Ws(ws) => {
                let _ = ws.close(None).await;
            }
            Connection::Tcp { writer, .. } => {
                let _ = writer.shutdown().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn tcp_lines_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            write_half.write_all(b"\n").await.unwrap();
            write_half
                .write_all(format!("echo:{}\n", line).as_bytes())
                .await
                .unwrap();
        });

        let mut conn = Connection::open(&format!("stratum+tcp://127.0.0.1:{}", port))
            .await
            .unwrap();
        conn.send_text("{\"a\":1}".into()).await.unwrap();
        assert_eq!(conn.next_text().await.unwrap().as_deref(), Some("echo:{\"a\":1}"));
        server.await.unwrap();
        assert_eq!(conn.next_text().await.unwrap(), None);
    }

    #[tokio::test]
    async fn websocket_frames_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let msg = ws.next().await.unwrap().unwrap();
            ws.send(Message::Binary(vec![1u8, 2].into())).await.unwrap();
            ws.send(msg).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let mut conn = Connection::open(&format!("ws://127.0.0.1:{}", port)).await.unwrap();
        conn.send_text("hello".into()).await.unwrap();
        assert_eq!(conn.next_text().await.unwrap().as_deref(), Some("hello"));
        assert_eq!(conn.next_text().await.unwrap(), None);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn refuses_unknown_scheme() {
        assert!(Connection::open("http://127.0.0.1:1").await.is_err());
    }
}
