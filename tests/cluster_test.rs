use shardis::cluster::ClusterServer;
use shardis::cluster::client::PeerClient;
use shardis::resp::RespValue;
use shardis::server;
use shardis::store::DataStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

struct TestCluster {
    nodes: Vec<Arc<ClusterServer>>,
    shutdown: CancellationToken,
}

impl TestCluster {
    /// Bind every listener first so each node knows all peer addresses.
    async fn start(size: usize) -> Self {
        let mut listeners = Vec::new();
        for _ in 0..size {
            listeners.push(TcpListener::bind("127.0.0.1:0").await.unwrap());
        }
        let addrs: Vec<String> = listeners
            .iter()
            .map(|l| l.local_addr().unwrap().to_string())
            .collect();

        let shutdown = CancellationToken::new();
        let mut nodes = Vec::new();
        for (i, listener) in listeners.into_iter().enumerate() {
            let peers: Vec<String> = addrs
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, addr)| addr.clone())
                .collect();
            let node = Arc::new(ClusterServer::new(
                addrs[i].clone(),
                &peers,
                Arc::new(DataStore::new(16)),
            ));
            tokio::spawn(server::serve(listener, node.clone(), shutdown.clone()));
            nodes.push(node);
        }
        TestCluster { nodes, shutdown }
    }

    async fn client(&self, node: usize) -> PeerClient {
        PeerClient::connect(self.nodes[node].self_addr()).await.unwrap()
    }

    /// Index of the node owning `key`.
    fn owner(&self, key: &str) -> usize {
        let addr = self.nodes[0].peer_for(key.as_bytes()).unwrap();
        self.nodes.iter().position(|n| n.self_addr() == addr).unwrap()
    }

    /// Find two keys that live on different nodes.
    fn split_keys(&self) -> (String, String) {
        let first = "key:0".to_string();
        let owner = self.owner(&first);
        let second = (1..)
            .map(|i| format!("key:{i}"))
            .find(|k| self.owner(k) != owner)
            .unwrap();
        (first, second)
    }
}

impl Drop for TestCluster {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn args(parts: &[&str]) -> Vec<Vec<u8>> {
    parts.iter().map(|p| p.as_bytes().to_vec()).collect()
}

#[tokio::test]
async fn test_every_node_agrees_on_ownership() {
    let cluster = TestCluster::start(3).await;
    for i in 0..100 {
        let key = format!("k{i}");
        let owner = cluster.nodes[0].peer_for(key.as_bytes()).unwrap();
        for node in &cluster.nodes[1..] {
            assert_eq!(node.peer_for(key.as_bytes()).unwrap(), owner);
        }
    }
}

#[tokio::test]
async fn test_keys_are_readable_from_any_node() {
    let cluster = TestCluster::start(3).await;
    let mut writer = cluster.client(0).await;
    for i in 0..30 {
        let key = format!("user:{i}");
        let value = format!("v{i}");
        assert_eq!(
            writer.send(&args(&["SET", &key, &value])).await.unwrap(),
            RespValue::ok()
        );
    }

    let mut reader = cluster.client(2).await;
    for i in 0..30 {
        let key = format!("user:{i}");
        assert_eq!(
            reader.send(&args(&["GET", &key])).await.unwrap(),
            RespValue::bulk_string(format!("v{i}"))
        );
        // The value is stored only on its owner.
        let owner = cluster.owner(&key);
        for (n, node) in cluster.nodes.iter().enumerate() {
            let stored = node.store().exec_on(0, &args(&["EXISTS", &key]));
            assert_eq!(stored, RespValue::integer((n == owner) as i64));
        }
    }
}

#[tokio::test]
async fn test_del_and_exists_sum_over_nodes() {
    let cluster = TestCluster::start(3).await;
    let (k1, k2) = cluster.split_keys();
    let mut conn = cluster.client(1).await;

    conn.send(&args(&["SET", &k1, "a"])).await.unwrap();
    conn.send(&args(&["SET", &k2, "b"])).await.unwrap();
    assert_eq!(
        conn.send(&args(&["EXISTS", &k1, &k2, "nope"])).await.unwrap(),
        RespValue::integer(2)
    );
    assert_eq!(
        conn.send(&args(&["DEL", &k1, &k2, "nope"])).await.unwrap(),
        RespValue::integer(2)
    );
    assert_eq!(
        conn.send(&args(&["EXISTS", &k1, &k2])).await.unwrap(),
        RespValue::integer(0)
    );
}

#[tokio::test]
async fn test_keys_and_flushdb_span_the_cluster() {
    let cluster = TestCluster::start(3).await;
    let mut conn = cluster.client(0).await;
    for i in 0..20 {
        conn.send(&args(&["SET", &format!("item:{i}"), "x"])).await.unwrap();
    }

    let reply = conn.send(&args(&["KEYS", "item:*"])).await.unwrap();
    let RespValue::Array(items) = reply else {
        panic!("expected array, got {reply:?}");
    };
    let mut keys: Vec<String> = items
        .iter()
        .map(|item| String::from_utf8(item.as_bytes().unwrap().to_vec()).unwrap())
        .collect();
    keys.sort();
    let mut expected: Vec<String> = (0..20).map(|i| format!("item:{i}")).collect();
    expected.sort();
    assert_eq!(keys, expected);

    assert_eq!(conn.send(&args(&["FLUSHDB"])).await.unwrap(), RespValue::ok());
    for node in &cluster.nodes {
        assert!(node.store().db(0).unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_select_follows_relayed_commands() {
    let cluster = TestCluster::start(3).await;
    let key = (0..)
        .map(|i| format!("remote:{i}"))
        .find(|k| cluster.owner(k) != 0)
        .unwrap();
    let owner = cluster.owner(&key);
    let mut conn = cluster.client(0).await;

    conn.send(&args(&["SELECT", "4"])).await.unwrap();
    conn.send(&args(&["SET", &key, "v"])).await.unwrap();
    assert_eq!(
        cluster.nodes[owner].store().exec_on(4, &args(&["GET", &key])),
        RespValue::bulk_string("v")
    );
    assert_eq!(
        cluster.nodes[owner].store().exec_on(0, &args(&["GET", &key])),
        RespValue::null_bulk_string()
    );
}

#[tokio::test]
async fn test_multi_key_commands_need_one_owner() {
    let cluster = TestCluster::start(3).await;
    let (k1, k2) = cluster.split_keys();
    let mut conn = cluster.client(0).await;
    conn.send(&args(&["SET", &k1, "v"])).await.unwrap();

    assert_eq!(
        conn.send(&args(&["RENAME", &k1, &k2])).await.unwrap(),
        RespValue::error("ERR cluster: rename keys must hash to the same node")
    );
    assert_eq!(
        conn.send(&args(&["SUNION", &k1, &k2])).await.unwrap(),
        RespValue::error("ERR cluster: sunion keys must hash to the same node")
    );
    // Same-owner renames go through.
    let k3 = (0..)
        .map(|i| format!("other:{i}"))
        .find(|k| cluster.owner(k) == cluster.owner(&k1))
        .unwrap();
    assert_eq!(
        conn.send(&args(&["RENAME", &k1, &k3])).await.unwrap(),
        RespValue::ok()
    );
    assert_eq!(
        conn.send(&args(&["GET", &k3])).await.unwrap(),
        RespValue::bulk_string("v")
    );
}

#[tokio::test]
async fn test_dead_peer_fails_broadcast() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap().to_string();
    drop(listener);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let node = Arc::new(ClusterServer::new(
        addr.clone(),
        &[dead.clone()],
        Arc::new(DataStore::new(16)),
    ));
    let shutdown = CancellationToken::new();
    tokio::spawn(server::serve(listener, node.clone(), shutdown.clone()));

    let mut conn = PeerClient::connect(&addr).await.unwrap();
    let reply = conn.send(&args(&["DEL", "a", "b"])).await.unwrap();
    match reply {
        RespValue::Error(e) => assert!(e.starts_with(&format!("ERR cluster: {dead}: "))),
        other => panic!("expected error, got {other:?}"),
    }

    // Keys owned by the live node keep working.
    let local = (0..)
        .map(|i| format!("local:{i}"))
        .find(|k| node.peer_for(k.as_bytes()).unwrap() == addr)
        .unwrap();
    assert_eq!(
        conn.send(&args(&["SET", &local, "v"])).await.unwrap(),
        RespValue::ok()
    );
    shutdown.cancel();
}
