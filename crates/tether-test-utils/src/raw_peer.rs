//! Bare TCP peer for driving servers at the wire level.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use tether_core::constants::READ_BUFFER_SIZE;
use tether_core::{Error, Result, Token, TokenDecoder};

/// A client-side TCP connection with token-level helpers.
#[derive(Debug)]
pub struct RawPeer {
    stream: TcpStream,
    buf: BytesMut,
    decoder: TokenDecoder,
}

impl RawPeer {
    /// Connect to `addr`.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            decoder: TokenDecoder::new(),
        })
    }

    /// Write one encoded token.
    pub async fn send(&mut self, token: &Token) -> Result<()> {
        self.send_raw(&token.encode()).await
    }

    /// Write raw bytes.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    /// Read one chunk and decode it.
    ///
    /// Fails with `Timeout` if nothing arrives in time and with
    /// `ConnectionClosed` on end of stream.
    pub async fn recv(&mut self, timeout: Duration) -> Result<Vec<Token>> {
        self.buf.clear();
        let n = tokio::time::timeout(timeout, self.stream.read_buf(&mut self.buf))
            .await
            .map_err(|_| Error::Timeout)??;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        self.decoder.decode(&self.buf)
    }

    /// Send `ping` and wait for the reply tokens.
    pub async fn ping(&mut self, timeout: Duration) -> Result<Vec<Token>> {
        self.send(&Token::Ping).await?;
        self.recv(timeout).await
    }

    /// Wait until the remote side closes the connection.
    ///
    /// Returns false if the connection is still open after `timeout`.
    pub async fn closed_within(&mut self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.recv(remaining).await {
                Ok(_) => continue,
                Err(Error::Timeout) => return false,
                Err(_) => return true,
            }
        }
    }
}
