use crate::resp::RespValue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// How long `close` waits for an in-flight reply before tearing the socket down.
pub const WRITE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-client state that outlives a single command.
#[derive(Debug)]
pub struct ClientState {
    pub id: u64,
    pub db_index: usize,
}

impl ClientState {
    pub fn new() -> Self {
        Self::with_db(0)
    }

    /// A state with `db_index` already selected, for relayed commands.
    pub fn with_db(db_index: usize) -> Self {
        ClientState {
            id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            db_index,
        }
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

/// The write half of a client socket. Replies are serialized through a
/// mutex so that `close` can wait for an in-flight write to finish.
pub struct Connection<W> {
    writer: Mutex<Option<W>>,
    closed: AtomicBool,
}

impl<W> Connection<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Connection {
            writer: Mutex::new(Some(writer)),
            closed: AtomicBool::new(false),
        }
    }

    pub async fn write(&self, reply: &RespValue) -> std::io::Result<()> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(std::io::ErrorKind::NotConnected.into());
        };
        writer.write_all(&reply.serialize()).await?;
        writer.flush().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait up to [`WRITE_DRAIN_TIMEOUT`] for a pending write, then shut the
    /// socket down. Calling it again is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match tokio::time::timeout(WRITE_DRAIN_TIMEOUT, self.writer.lock()).await {
            Ok(mut guard) => {
                if let Some(mut writer) = guard.take() {
                    if let Err(e) = writer.shutdown().await {
                        debug!("shutdown failed: {e}");
                    }
                }
            }
            Err(_) => debug!("write still pending after drain timeout, dropping socket"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_client_ids_are_unique() {
        let a = ClientState::new();
        let b = ClientState::with_db(4);
        assert_ne!(a.id, b.id);
        assert_eq!(a.db_index, 0);
        assert_eq!(b.db_index, 4);
    }

    #[tokio::test]
    async fn test_write_then_close() {
        let (client, mut server) = tokio::io::duplex(64);
        let conn = Connection::new(client);
        conn.write(&RespValue::ok()).await.unwrap();
        conn.close().await;
        conn.close().await;
        assert!(conn.is_closed());
        assert!(conn.write(&RespValue::ok()).await.is_err());

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"+OK\r\n");
    }
}
