use super::client::{PeerClient, REQUEST_TIMEOUT};
use crate::error::{ShardisError, ShardisResult};
use crate::resp::RespValue;
use std::sync::Mutex;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::debug;

pub const DEFAULT_POOL_SIZE: usize = 16;

/// Bounded pool of connections to one peer. At most `max_size` connections
/// are borrowed at once; idle ones are reused, broken ones are dropped when
/// they come back.
#[derive(Debug)]
pub struct PeerPool {
    addr: String,
    idle: Mutex<Vec<PeerClient>>,
    permits: Semaphore,
}

impl PeerPool {
    pub fn new(addr: impl Into<String>, max_size: usize) -> Self {
        PeerPool {
            addr: addr.into(),
            idle: Mutex::new(Vec::new()),
            permits: Semaphore::new(max_size.max(1)),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    /// Borrow a connection, creating one if none is idle. It goes back to
    /// the pool when the guard is dropped.
    pub async fn get(&self) -> ShardisResult<PooledClient<'_>> {
        let permit = match tokio::time::timeout(REQUEST_TIMEOUT, self.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(ShardisError::Cluster(format!("pool for {} is closed", self.addr))),
            Err(_) => return Err(ShardisError::Cluster(format!("pool for {} is exhausted", self.addr))),
        };

        let reused = self.idle.lock().ok().and_then(|mut idle| idle.pop());
        let client = match reused {
            Some(client) => client,
            None => {
                debug!(peer = %self.addr, "opening peer connection");
                PeerClient::connect(&self.addr)
                    .await
                    .map_err(|e| ShardisError::Cluster(format!("connect to {}: {e}", self.addr)))?
            }
        };
        Ok(PooledClient {
            pool: self,
            client: Some(client),
            _permit: permit,
        })
    }

    /// Drop idle connections and refuse further borrows.
    pub fn close(&self) {
        self.permits.close();
        if let Ok(mut idle) = self.idle.lock() {
            idle.clear();
        }
    }

    fn put_back(&self, client: PeerClient) {
        if client.is_broken() || self.permits.is_closed() {
            debug!(peer = %self.addr, "discarding peer connection");
            return;
        }
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(client);
        }
    }
}

/// A borrowed connection. Dropping it hands the connection back to its pool.
pub struct PooledClient<'a> {
    pool: &'a PeerPool,
    client: Option<PeerClient>,
    _permit: SemaphorePermit<'a>,
}

impl PooledClient<'_> {
    pub async fn send(&mut self, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
        match self.client.as_mut() {
            Some(client) => client.send(args).await,
            None => Err(ShardisError::Cluster(format!("{} connection released", self.pool.addr))),
        }
    }

    pub fn is_broken(&self) -> bool {
        self.client.as_ref().is_none_or(PeerClient::is_broken)
    }
}

impl Drop for PooledClient<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.put_back(client);
        }
    }
}
