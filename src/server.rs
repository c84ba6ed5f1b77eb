use crate::config::Config;
use crate::connection::{ClientState, Connection};
use crate::error::ShardisError;
use crate::resp::{Payload, RespValue, decode_stream};
use crate::store::DataStore;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// How long `Handler::close` waits for connection loops to wind down.
pub const HANDLER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Decoded frames buffered between the decoder task and the command loop.
const REQUEST_QUEUE: usize = 128;

/// The engine behind a listener: the single-node store or the cluster router.
pub trait Executor: Send + Sync + 'static {
    fn exec(
        &self,
        client: &mut ClientState,
        args: Vec<Vec<u8>>,
    ) -> impl Future<Output = RespValue> + Send;

    /// Release resources once every connection has stopped.
    fn close(&self);
}

impl Executor for DataStore {
    async fn exec(&self, client: &mut ClientState, args: Vec<Vec<u8>>) -> RespValue {
        DataStore::exec(self, client, &args)
    }

    fn close(&self) {
        DataStore::close(self);
    }
}

/// Owns every connection task spawned by the accept loop.
pub struct Handler<E> {
    executor: Arc<E>,
    closing: AtomicBool,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl<E: Executor> Handler<E> {
    pub fn new(executor: Arc<E>) -> Self {
        Handler {
            executor,
            closing: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Serve one client. Refused once the handler is closing.
    pub fn handle<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        if self.is_closing() {
            return;
        }
        let executor = self.executor.clone();
        let shutdown = self.shutdown.child_token();
        self.tracker
            .spawn(async move { serve_connection(stream, executor, shutdown).await });
    }

    /// Stop every connection loop, wait for them to drain, then close the
    /// executor. Idempotent.
    pub async fn close(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("handler shutting down");
        self.shutdown.cancel();
        self.tracker.close();
        if tokio::time::timeout(HANDLER_DRAIN_TIMEOUT, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = self.tracker.len(),
                "connections still open after drain timeout"
            );
        }
        self.executor.close();
    }
}

/// Run `args` through the executor, turning a panic into an `ERR unknown`
/// reply so the connection survives.
pub async fn exec_guarded<E: Executor>(
    executor: &E,
    client: &mut ClientState,
    args: Vec<Vec<u8>>,
) -> RespValue {
    match AssertUnwindSafe(executor.exec(client, args))
        .catch_unwind()
        .await
    {
        Ok(reply) => reply,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            error!(client = client.id, "recovered from panic: {message}");
            ShardisError::Unknown.into()
        }
    }
}

async fn serve_connection<S, E>(stream: S, executor: Arc<E>, shutdown: CancellationToken)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    E: Executor,
{
    let (reader, writer) = tokio::io::split(stream);
    let (tx, mut rx) = mpsc::channel::<Payload>(REQUEST_QUEUE);
    let decoder = tokio::spawn(decode_stream(reader, tx));
    let conn = Connection::new(writer);
    let mut client = ClientState::new();
    debug!(client = client.id, "connection opened");

    loop {
        let payload = tokio::select! {
            _ = shutdown.cancelled() => break,
            payload = rx.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
        };

        let (reply, fatal) = match payload {
            Ok(frame) => match frame.into_args() {
                Some(args) if !args.is_empty() => {
                    (exec_guarded(&*executor, &mut client, args).await, false)
                }
                _ => {
                    debug!(client = client.id, "ignoring frame that is not a command");
                    continue;
                }
            },
            Err(e) => {
                let fatal = e.is_fatal();
                (RespValue::from(ShardisError::from(e)), fatal)
            }
        };

        if let Err(e) = conn.write(&reply).await {
            debug!(client = client.id, "write failed: {e}");
            break;
        }
        if fatal {
            break;
        }
    }

    decoder.abort();
    conn.close().await;
    debug!(client = client.id, "connection closed");
}

/// Accept connections until `shutdown` fires, then drain them through
/// [`Handler::close`].
pub async fn serve<E: Executor>(
    listener: TcpListener,
    executor: Arc<E>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let handler = Handler::new(executor);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted connection");
                    handler.handle(stream);
                }
                Err(e) => warn!("accept failed: {e}"),
            },
        }
    }
    drop(listener);
    handler.close().await;
    Ok(())
}

/// Bind the configured address and serve until ctrl-c.
pub async fn run_server<E: Executor>(config: &Config, executor: Arc<E>) -> std::io::Result<()> {
    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("listening on {addr}");

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
        }
        trigger.cancel();
    });

    serve(listener, executor, shutdown).await
}
