use crate::error::{ShardisError, ShardisResult};
use crate::resp::{RespParser, RespValue};
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Upper bound on one request/reply exchange with a peer.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A connection to another node. Requests are strictly one at a time; any
/// failure marks the client broken so the pool discards it.
#[derive(Debug)]
pub struct PeerClient {
    addr: String,
    stream: TcpStream,
    buf: BytesMut,
    broken: bool,
}

impl PeerClient {
    pub async fn connect(addr: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(PeerClient {
            addr: addr.to_string(),
            stream,
            buf: BytesMut::with_capacity(4096),
            broken: false,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Send one command and wait for its reply. Error replies from the peer
    /// are returned as values; only transport failures are errors.
    pub async fn send(&mut self, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
        if self.broken {
            return Err(ShardisError::Cluster(format!("connection to {} is broken", self.addr)));
        }
        let result = match tokio::time::timeout(REQUEST_TIMEOUT, self.round_trip(args)).await {
            Ok(result) => result,
            Err(_) => Err(ShardisError::Cluster(format!("{} timed out", self.addr))),
        };
        if result.is_err() {
            self.broken = true;
        }
        result
    }

    async fn round_trip(&mut self, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
        let request = RespValue::multi_bulk(args.iter().map(Vec::as_slice)).serialize();
        self.stream.write_all(&request).await?;
        loop {
            if let Some(reply) = RespParser::decode(&mut self.buf)? {
                return Ok(reply);
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Err(ShardisError::Cluster(format!("{} closed the connection", self.addr)));
            }
        }
    }
}
