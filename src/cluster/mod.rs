pub mod client;
pub mod pool;
pub mod ring;
pub mod router;

use crate::connection::ClientState;
use crate::error::{ShardisError, ShardisResult};
use crate::resp::RespValue;
use crate::server::Executor;
use crate::store::DataStore;
use futures::future::join_all;
use pool::{DEFAULT_POOL_SIZE, PeerPool};
use ring::HashRing;
use router::{Route, RouteTable};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Name of the wrapper command a node uses when forwarding to a peer. The
/// receiving node runs the wrapped command locally instead of routing it.
pub const RELAY: &str = "RELAY";

/// Cluster front end. Keys are spread over `self` and the peers by a
/// consistent-hash ring; commands for keys owned elsewhere are relayed over
/// pooled connections.
#[derive(Debug)]
pub struct ClusterServer {
    self_addr: String,
    nodes: Vec<String>,
    ring: HashRing,
    pools: HashMap<String, PeerPool>,
    routes: RouteTable,
    store: Arc<DataStore>,
}

impl ClusterServer {
    pub fn new(self_addr: impl Into<String>, peers: &[String], store: Arc<DataStore>) -> Self {
        let self_addr = self_addr.into();
        let mut nodes = vec![self_addr.clone()];
        for peer in peers {
            if !peer.is_empty() && !nodes.contains(peer) {
                nodes.push(peer.clone());
            }
        }
        let ring = HashRing::new(nodes.iter().cloned());
        let pools = nodes[1..]
            .iter()
            .map(|peer| (peer.clone(), PeerPool::new(peer.clone(), DEFAULT_POOL_SIZE)))
            .collect();
        info!(node = %self_addr, peers = nodes.len() - 1, "cluster mode");

        ClusterServer {
            self_addr,
            nodes,
            ring,
            pools,
            routes: RouteTable::build(),
            store,
        }
    }

    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.store
    }

    /// The node owning `key`.
    pub fn peer_for(&self, key: &[u8]) -> ShardisResult<&str> {
        self.ring
            .get(key)
            .ok_or_else(|| ShardisError::Cluster("no nodes in ring".into()))
    }

    pub async fn exec(&self, client: &mut ClientState, args: Vec<Vec<u8>>) -> RespValue {
        match self.route(client, args).await {
            Ok(reply) => reply,
            Err(e) => e.into(),
        }
    }

    async fn route(&self, client: &mut ClientState, args: Vec<Vec<u8>>) -> ShardisResult<RespValue> {
        let Some(name) = args.first() else {
            return Err(ShardisError::Generic("empty command".into()));
        };
        let Some(route) = self.routes.get(name) else {
            return Err(ShardisError::UnknownCommand(String::from_utf8_lossy(name).into_owned()));
        };
        let db = client.db_index;

        // Too few arguments to pick a node: let the local dispatcher report it.
        if args.len() < 2 && matches!(route, Route::ByKey | Route::SamePeer | Route::Sum | Route::Concat) {
            return Ok(self.store.exec(client, &args));
        }

        match route {
            Route::Local => Ok(self.store.exec(client, &args)),
            Route::Relay => {
                if args.len() < 2 {
                    return Err(ShardisError::WrongArgCount("relay".into()));
                }
                Ok(self.store.exec(client, &args[1..]))
            }
            Route::ByKey => {
                let peer = self.peer_for(&args[1])?;
                Ok(self.relay(peer, db, &args).await)
            }
            Route::SamePeer => {
                let peer = self.peer_for(&args[1])?;
                for key in &args[2..] {
                    if self.peer_for(key)? != peer {
                        return Err(ShardisError::Cluster(format!(
                            "{} keys must hash to the same node",
                            String::from_utf8_lossy(name).to_lowercase()
                        )));
                    }
                }
                Ok(self.relay(peer, db, &args).await)
            }
            Route::Sum => {
                let mut total = 0;
                for (node, reply) in self.broadcast(db, &args).await {
                    match reply {
                        RespValue::Integer(n) => total += n,
                        other => return Err(node_failure(&node, other)),
                    }
                }
                Ok(RespValue::integer(total))
            }
            Route::FlushDb => {
                for (node, reply) in self.broadcast(db, &args).await {
                    if reply.is_error() {
                        return Err(node_failure(&node, reply));
                    }
                }
                Ok(RespValue::ok())
            }
            Route::Concat => {
                let mut items = Vec::new();
                for (node, reply) in self.broadcast(db, &args).await {
                    match reply {
                        RespValue::Array(part) => items.extend(part),
                        other => return Err(node_failure(&node, other)),
                    }
                }
                Ok(RespValue::array(items))
            }
        }
    }

    /// Run `args` on `peer` against database `db`. The local node executes
    /// directly; remote nodes get `SELECT db` followed by the command wrapped
    /// in [`RELAY`].
    pub async fn relay(&self, peer: &str, db: usize, args: &[Vec<u8>]) -> RespValue {
        if peer == self.self_addr {
            return self.store.exec_on(db, args);
        }
        match self.relay_remote(peer, db, args).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(%peer, "relay failed: {e}");
                e.into()
            }
        }
    }

    async fn relay_remote(&self, peer: &str, db: usize, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
        let pool = self
            .pools
            .get(peer)
            .ok_or_else(|| ShardisError::Cluster(format!("unknown peer {peer}")))?;
        let mut conn = pool.get().await?;

        let select = conn
            .send(&[b"SELECT".to_vec(), db.to_string().into_bytes()])
            .await?;
        if select.is_error() {
            return Ok(select);
        }

        let mut wrapped = Vec::with_capacity(args.len() + 1);
        wrapped.push(RELAY.as_bytes().to_vec());
        wrapped.extend_from_slice(args);
        conn.send(&wrapped).await
    }

    /// Run `args` on every node concurrently. Replies come back in node order.
    pub async fn broadcast(&self, db: usize, args: &[Vec<u8>]) -> Vec<(String, RespValue)> {
        let replies = join_all(self.nodes.iter().map(|node| self.relay(node, db, args))).await;
        self.nodes.iter().cloned().zip(replies).collect()
    }

    pub fn close(&self) {
        for pool in self.pools.values() {
            pool.close();
        }
        self.store.close();
    }
}

fn node_failure(node: &str, reply: RespValue) -> ShardisError {
    match reply {
        RespValue::Error(e) => ShardisError::Cluster(format!("{node}: {e}")),
        other => ShardisError::Cluster(format!("{node}: unexpected reply {other:?}")),
    }
}

impl Executor for ClusterServer {
    async fn exec(&self, client: &mut ClientState, args: Vec<Vec<u8>>) -> RespValue {
        ClusterServer::exec(self, client, args).await
    }

    fn close(&self) {
        ClusterServer::close(self);
    }
}
