use crate::command::CommandTable;
use crate::connection::ClientState;
use crate::error::{ShardisError, ShardisResult};
use crate::glob::Pattern;
use crate::persistence::aof::AofWriter;
use crate::resp::RespValue;
use crate::types::DataEntity;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::{Ref, RefMut};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the UNIX epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One numbered keyspace: the entry dictionary plus a parallel map of
/// expiration deadlines (milliseconds since the epoch).
///
/// Every accessor performs lazy expiration. A `Ref`/`RefMut` returned from
/// here holds its shard lock, so callers must drop it before touching another
/// key of the same database.
#[derive(Debug, Default)]
pub struct Database {
    data: DashMap<String, DataEntity>,
    ttl: DashMap<String, u64>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch one command line against this keyspace.
    pub fn exec(&self, commands: &CommandTable, args: &[Vec<u8>]) -> RespValue {
        let Some(name) = args.first() else {
            return ShardisError::Generic("empty command".into()).into();
        };
        let Some(command) = commands.get(name) else {
            return ShardisError::UnknownCommand(String::from_utf8_lossy(name).into_owned()).into();
        };
        if !command.accepts(args.len()) {
            return ShardisError::WrongArgCount(command.name.to_string()).into();
        }
        (command.handler)(self, &args[1..]).unwrap_or_else(RespValue::from)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Compares now against the key's deadline. An expired TTL record is
    /// dropped; the data entry is left for the caller to remove.
    pub fn is_expired(&self, key: &str) -> bool {
        let now = now_millis();
        self.ttl.remove_if(key, |_, deadline| now > *deadline).is_some()
    }

    fn expire_if_needed(&self, key: &str) {
        if self.is_expired(key) {
            self.data.remove(key);
        }
    }

    pub fn get(&self, key: &str) -> Option<Ref<'_, String, DataEntity>> {
        self.expire_if_needed(key);
        self.data.get(key)
    }

    pub fn get_mut(&self, key: &str) -> Option<RefMut<'_, String, DataEntity>> {
        self.expire_if_needed(key);
        self.data.get_mut(key)
    }

    /// Fetch the entry, creating it with `init` when absent.
    pub fn get_or_insert_with(
        &self,
        key: &str,
        init: impl FnOnce() -> DataEntity,
    ) -> RefMut<'_, String, DataEntity> {
        self.expire_if_needed(key);
        self.data.entry(key.to_string()).or_insert_with(init)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.expire_if_needed(key);
        self.data.contains_key(key)
    }

    /// Insert or overwrite. Returns true if the key was new. Any TTL the key
    /// had is cleared while the entry is still locked.
    pub fn put(&self, key: String, entity: DataEntity) -> bool {
        self.expire_if_needed(&key);
        match self.data.entry(key) {
            Entry::Occupied(mut slot) => {
                self.ttl.remove(slot.key().as_str());
                slot.insert(entity);
                false
            }
            Entry::Vacant(slot) => {
                self.ttl.remove(slot.key().as_str());
                slot.insert(entity);
                true
            }
        }
    }

    pub fn put_if_absent(&self, key: String, entity: DataEntity) -> bool {
        self.expire_if_needed(&key);
        match self.data.entry(key) {
            Entry::Vacant(slot) => {
                self.ttl.remove(slot.key().as_str());
                slot.insert(entity);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn put_if_present(&self, key: String, entity: DataEntity) -> bool {
        self.expire_if_needed(&key);
        match self.data.entry(key) {
            Entry::Occupied(mut slot) => {
                self.ttl.remove(slot.key().as_str());
                slot.insert(entity);
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Remove a live key together with its TTL record.
    pub fn remove(&self, key: &str) -> Option<DataEntity> {
        self.expire_if_needed(key);
        let removed = self.data.remove(key).map(|(_, v)| v);
        self.ttl.remove(key);
        removed
    }

    pub fn remove_many<K: AsRef<str>>(&self, keys: &[K]) -> usize {
        keys.iter()
            .filter(|k| self.remove(k.as_ref()).is_some())
            .count()
    }

    /// Drop a container that has become empty.
    pub fn remove_if_empty(&self, key: &str) {
        if self
            .data
            .remove_if(key, |_, v| v.is_empty_container())
            .is_some()
        {
            self.ttl.remove(key);
        }
    }

    pub fn clear(&self) {
        self.data.clear();
        self.ttl.clear();
    }

    pub fn expire(&self, key: &str, deadline: u64) {
        self.ttl.insert(key.to_string(), deadline);
    }

    /// Clear the key's TTL. Returns true if one was set.
    pub fn persist(&self, key: &str) -> bool {
        self.ttl.remove(key).is_some()
    }

    /// The key's deadline, if it has one and is still live.
    pub fn deadline(&self, key: &str) -> Option<u64> {
        self.expire_if_needed(key);
        self.ttl.get(key).map(|d| *d)
    }

    /// All live keys matching the pattern, in dictionary order.
    pub fn keys(&self, pattern: &Pattern) -> Vec<String> {
        let now = now_millis();
        let mut stale = Vec::new();
        let mut matched = Vec::new();
        for item in self.data.iter() {
            let expired = self.ttl.get(item.key()).is_some_and(|d| now > *d);
            if expired {
                stale.push(item.key().clone());
            } else if pattern.matches(item.key().as_bytes()) {
                matched.push(item.key().clone());
            }
        }
        for key in stale {
            self.expire_if_needed(&key);
        }
        matched
    }

    /// Walk the TTL map and evict every expired key. Returns how many went.
    pub fn clean_expired(&self) -> usize {
        let now = now_millis();
        let stale: Vec<String> = self
            .ttl
            .iter()
            .filter(|item| now > *item.value())
            .map(|item| item.key().clone())
            .collect();
        stale
            .iter()
            .filter(|key| {
                let expired = self.is_expired(key);
                if expired {
                    self.data.remove(key.as_str());
                }
                expired
            })
            .count()
    }
}

/// The single-node server: a fixed number of databases sharing one command
/// table. Clients pick a database with SELECT.
#[derive(Debug)]
pub struct DataStore {
    databases: Vec<Database>,
    commands: Arc<CommandTable>,
    aof: OnceLock<AofWriter>,
    /// Held per database around a logged write so the AOF sees writes in
    /// the order they were applied.
    log_order: Vec<Mutex<()>>,
}

impl DataStore {
    pub fn new(num_dbs: usize) -> Self {
        Self::with_commands(num_dbs, Arc::new(CommandTable::build()))
    }

    pub fn with_commands(num_dbs: usize, commands: Arc<CommandTable>) -> Self {
        let num_dbs = num_dbs.max(1);
        DataStore {
            databases: (0..num_dbs).map(|_| Database::new()).collect(),
            commands,
            aof: OnceLock::new(),
            log_order: (0..num_dbs).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn num_dbs(&self) -> usize {
        self.databases.len()
    }

    pub fn db(&self, index: usize) -> Option<&Database> {
        self.databases.get(index)
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Start logging write commands. Only the first writer attached is kept.
    pub fn attach_aof(&self, writer: AofWriter) {
        if self.aof.set(writer).is_err() {
            tracing::warn!("AOF writer already attached");
        }
    }

    pub fn aof(&self) -> Option<&AofWriter> {
        self.aof.get()
    }

    /// Execute a command for a connection, honouring its selected database.
    pub fn exec(&self, client: &mut ClientState, args: &[Vec<u8>]) -> RespValue {
        match args.first() {
            Some(name) if name.eq_ignore_ascii_case(b"select") => {
                self.select(client, args).unwrap_or_else(RespValue::from)
            }
            _ => self.exec_on(client.db_index, args),
        }
    }

    /// Execute an already-decoded command against database `index`. Used by
    /// live connections and by log replay.
    pub fn exec_on(&self, index: usize, args: &[Vec<u8>]) -> RespValue {
        let Some(db) = self.databases.get(index) else {
            return ShardisError::InvalidDbIndex.into();
        };
        let logged = self.aof.get().filter(|_| {
            args.first()
                .and_then(|name| self.commands.get(name))
                .is_some_and(|cmd| cmd.write)
        });
        let Some(aof) = logged else {
            return db.exec(&self.commands, args);
        };

        // Reads stay parallel; logged writes to one database are applied and
        // queued one at a time.
        let _order = self.log_order[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let reply = db.exec(&self.commands, args);
        if !reply.is_error() {
            aof.log(index, args);
        }
        reply
    }

    fn select(&self, client: &mut ClientState, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
        if args.len() != 2 {
            return Err(ShardisError::WrongArgCount("select".into()));
        }
        let index: usize = std::str::from_utf8(&args[1])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(ShardisError::InvalidDbIndex)?;
        if index >= self.databases.len() {
            return Err(ShardisError::InvalidDbIndex);
        }
        client.db_index = index;
        Ok(RespValue::ok())
    }

    /// Stop logging. Data stays in memory.
    pub fn close(&self) {
        if let Some(aof) = self.aof.get() {
            aof.close();
        }
    }
}
