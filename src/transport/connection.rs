//! A single TCP connection to the authorization host with length-prefixed
//! framing.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tokio::time::timeout;
use tracing::{debug, info};

use super::TransportError;
use crate::codec::hex;
use crate::config::GatewayConfig;

/// Largest supported length prefix, in bytes.
const MAX_HEADER_WIDTH: usize = 4;

/// An open connection. Each value is used by one exchange at a time.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    header_width: usize,
    read_timeout: Duration,
}

impl Connection {
    /// Resolve the host and complete the TCP handshake within the connect
    /// timeout, applying keep-alive and no-delay.
    pub async fn open(config: &GatewayConfig) -> Result<Self, TransportError> {
        let address = config.address();
        let peer = lookup_host(address.as_str())
            .await?
            .next()
            .ok_or_else(|| TransportError::UnresolvedHost(address.clone()))?;

        let socket = if peer.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(config.keep_alive)?;

        let stream = timeout(config.connect_timeout(), socket.connect(peer))
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                address: address.clone(),
                timeout: config.connect_timeout(),
            })??;
        stream.set_nodelay(config.tcp_no_delay)?;

        info!(peer = %peer, "created new connection");
        Ok(Self {
            stream,
            peer,
            header_width: config.length_header_size.clamp(1, MAX_HEADER_WIDTH),
            read_timeout: config.read_timeout(),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Non-blocking read: a live idle connection has nothing to read.
    ///
    /// EOF means the host closed it; unsolicited bytes mean the stream is out
    /// of sync. Both make the connection unusable.
    pub fn is_live(&self) -> bool {
        let mut scratch = [0u8; 1];
        match self.stream.try_read(&mut scratch) {
            Err(e) => e.kind() == io::ErrorKind::WouldBlock,
            Ok(_) => false,
        }
    }

    /// Send one framed payload and wait for one framed reply.
    ///
    /// Only the reply is bounded by the read timeout; a write that has
    /// started is never aborted.
    pub async fn exchange(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        let frame = encode_frame(payload, self.header_width)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        debug!(peer = %self.peer, bytes = payload.len(), data = %hex(payload), "sent message");

        let reply = timeout(self.read_timeout, self.read_frame())
            .await
            .map_err(|_| TransportError::ReadTimeout(self.read_timeout))??;
        debug!(peer = %self.peer, bytes = reply.len(), data = %hex(&reply), "received response");
        Ok(reply)
    }

    async fn read_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut header = [0u8; MAX_HEADER_WIDTH];
        let prefix = &mut header[..self.header_width];
        self.stream.read_exact(prefix).await?;
        let len = decode_length(prefix);

        let mut body = vec![0u8; len];
        self.stream.read_exact(&mut body).await?;
        Ok(body)
    }
}

/// `[big-endian length][payload]`, the length counting payload bytes only.
pub fn encode_frame(payload: &[u8], width: usize) -> Result<Vec<u8>, TransportError> {
    let len = payload.len() as u64;
    if width == 0 || width > MAX_HEADER_WIDTH || len >= 1u64 << (8 * width) {
        return Err(TransportError::FrameTooLarge {
            len: payload.len(),
            width,
        });
    }
    let mut frame = Vec::with_capacity(width + payload.len());
    frame.extend_from_slice(&len.to_be_bytes()[8 - width..]);
    frame.extend_from_slice(payload);
    Ok(frame)
}

fn decode_length(prefix: &[u8]) -> usize {
    prefix
        .iter()
        .fold(0usize, |acc, byte| (acc << 8) | usize::from(*byte))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn frame_prefix_is_big_endian() {
        let frame = encode_frame(&[0xAA; 300], 2).unwrap();
        assert_eq!(&frame[..2], &[0x01, 0x2C]);
        assert_eq!(frame.len(), 302);

        let frame = encode_frame(b"abc", 4).unwrap();
        assert_eq!(&frame[..4], &[0, 0, 0, 3]);
    }

    #[test]
    fn frame_rejects_oversized_payload() {
        assert!(matches!(
            encode_frame(&[0u8; 256], 1),
            Err(TransportError::FrameTooLarge { len: 256, width: 1 })
        ));
        assert!(encode_frame(&[0u8; 255], 1).is_ok());
    }

    #[test]
    fn length_decoding() {
        assert_eq!(decode_length(&[0x01, 0x2C]), 300);
        assert_eq!(decode_length(&[0, 0, 1, 0]), 256);
    }

    fn config_for(port: u16) -> GatewayConfig {
        GatewayConfig {
            host: "127.0.0.1".into(),
            port,
            read_timeout_ms: 200,
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn exchange_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut header = [0u8; 2];
            socket.read_exact(&mut header).await.unwrap();
            let mut body = vec![0u8; decode_length(&header)];
            socket.read_exact(&mut body).await.unwrap();
            body.reverse();
            socket.write_all(&encode_frame(&body, 2).unwrap()).await.unwrap();
        });

        let mut conn = Connection::open(&config_for(port)).await.unwrap();
        assert!(conn.is_live());
        let reply = conn.exchange(b"hello").await.unwrap();
        assert_eq!(reply, b"olleh");
    }

    #[tokio::test]
    async fn premature_close_is_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut header = [0u8; 2];
            socket.read_exact(&mut header).await.unwrap();
            // half a prefix, then hang up
            socket.write_all(&[0x00]).await.unwrap();
        });

        let mut conn = Connection::open(&config_for(port)).await.unwrap();
        let err = conn.exchange(b"ping").await.unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[tokio::test]
    async fn silent_host_hits_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(socket);
        });

        let mut conn = Connection::open(&config_for(port)).await.unwrap();
        let err = conn.exchange(b"ping").await.unwrap_err();
        assert!(matches!(err, TransportError::ReadTimeout(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_retryable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = Connection::open(&config_for(port)).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
