use std::collections::HashMap;

/// How the cluster front end handles a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Relay to the node owning the first key.
    ByKey,
    /// Every key must live on one node; relay there.
    SamePeer,
    /// Broadcast and add up the integer replies.
    Sum,
    /// Broadcast; OK unless a node fails.
    FlushDb,
    /// Broadcast and concatenate the array replies.
    Concat,
    /// Run on this node without routing.
    Local,
    /// A command forwarded by another node. Runs locally.
    Relay,
}

const BY_KEY: &[&str] = &[
    "get", "set", "setnx", "setex", "getset", "strlen", "type", "expire", "ttl", "persist",
    "hset", "hget", "hdel", "hkeys", "hvals", "hgetall", "hexists", "hlen", "lpush", "rpush",
    "lpop", "rpop", "llen", "lindex", "lrange", "lset", "lrem", "sadd", "srem", "smembers",
    "sismember", "scard", "srandmember", "zadd", "zscore", "zrank", "zrevrank", "zcard",
    "zrange", "zrevrange", "zcount", "zrangebyscore", "zrevrangebyscore", "zremrangebyscore",
    "zremrangebyrank", "zrem",
];

/// Immutable command-name to [`Route`] table, built once at startup.
#[derive(Debug)]
pub struct RouteTable {
    routes: HashMap<&'static str, Route>,
}

impl RouteTable {
    pub fn build() -> Self {
        let mut routes: HashMap<&'static str, Route> =
            BY_KEY.iter().map(|name| (*name, Route::ByKey)).collect();
        for name in ["rename", "renamenx", "sdiff", "sunion", "sinter"] {
            routes.insert(name, Route::SamePeer);
        }
        routes.insert("del", Route::Sum);
        routes.insert("exists", Route::Sum);
        routes.insert("flushdb", Route::FlushDb);
        routes.insert("keys", Route::Concat);
        routes.insert("ping", Route::Local);
        routes.insert("select", Route::Local);
        routes.insert("relay", Route::Relay);
        RouteTable { routes }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &[u8]) -> Option<Route> {
        let name = std::str::from_utf8(name).ok()?.to_ascii_lowercase();
        self.routes.get(name.as_str()).copied()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
