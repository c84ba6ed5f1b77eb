pub mod hash;
pub mod key;
pub mod list;
pub mod server_cmd;
pub mod set;
pub mod sorted_set;
pub mod string;

use crate::error::{ShardisError, ShardisResult};
use crate::resp::RespValue;
use crate::store::Database;
use crate::types::DataEntity;
use std::collections::HashMap;

/// A command handler. It receives the keyspace and the arguments after the
/// command name.
pub type CommandFn = fn(&Database, &[Vec<u8>]) -> ShardisResult<RespValue>;

#[derive(Debug, Clone)]
pub struct Command {
    pub name: &'static str,
    pub handler: CommandFn,
    /// Exact argument count including the name, or `-n` for "at least n".
    pub arity: i32,
    /// Whether the command modifies the keyspace and belongs in the AOF.
    pub write: bool,
}

impl Command {
    pub fn accepts(&self, argc: usize) -> bool {
        let argc = argc as i64;
        let arity = self.arity as i64;
        if arity >= 0 {
            argc == arity
        } else {
            argc >= -arity
        }
    }
}

/// Registry of every command the keyspace understands. Built once with
/// [`CommandTable::build`] and read-only afterwards.
#[derive(Debug, Default)]
pub struct CommandTable {
    commands: HashMap<&'static str, Command>,
}

impl CommandTable {
    pub fn build() -> Self {
        let mut table = CommandTable::default();
        server_cmd::register(&mut table);
        key::register(&mut table);
        string::register(&mut table);
        hash::register(&mut table);
        list::register(&mut table);
        set::register(&mut table);
        sorted_set::register(&mut table);
        table
    }

    fn register(&mut self, name: &'static str, handler: CommandFn, arity: i32, write: bool) {
        self.commands.insert(
            name,
            Command {
                name,
                handler,
                arity,
                write,
            },
        );
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &[u8]) -> Option<&Command> {
        let name = std::str::from_utf8(name).ok()?.to_ascii_lowercase();
        self.commands.get(name.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Lossy UTF-8 view of an argument, used for keys, fields and members.
pub fn arg_to_string(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).into_owned()
}

pub fn arg_to_i64(arg: &[u8]) -> ShardisResult<i64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(ShardisError::NotInteger)
}

/// Parse a float, accepting `inf`, `+inf` and `-inf` but never NaN.
pub fn arg_to_f64(arg: &[u8]) -> ShardisResult<f64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| !v.is_nan())
        .ok_or(ShardisError::NotFloat)
}

/// Parse a positive number of seconds for EXPIRE-style commands.
pub fn arg_to_ttl_millis(arg: &[u8], cmd: &str) -> ShardisResult<u64> {
    let seconds = arg_to_i64(arg)?;
    if seconds <= 0 {
        return Err(ShardisError::InvalidExpire(cmd.to_string()));
    }
    (seconds as u64)
        .checked_mul(1000)
        .ok_or_else(|| ShardisError::InvalidExpire(cmd.to_string()))
}

/// Resolve a Redis-style inclusive `[start, stop]` pair, where negative
/// indices count from the end, into a half-open range within `len`.
pub fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start >= len || stop < start {
        return None;
    }
    Some((start as usize, stop as usize + 1))
}

/// Resolve a single possibly-negative index.
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { len + index } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

/// Read a typed value. `Ok(None)` when the key is absent, a wrong-type error
/// when it holds another kind of value.
pub fn read_entity<T: ?Sized, R>(
    db: &Database,
    key: &str,
    project: fn(&DataEntity) -> Option<&T>,
    f: impl FnOnce(&T) -> R,
) -> ShardisResult<Option<R>> {
    match db.get(key).as_deref() {
        None => Ok(None),
        Some(entity) => project(entity).map(f).map(Some).ok_or(ShardisError::WrongType),
    }
}

/// Mutate a typed value under its entry lock. With `init`, an absent key is
/// created first; without it the result is `Ok(None)`. A container left
/// empty by `f` is removed from the keyspace.
pub fn update_entity<T: ?Sized, R>(
    db: &Database,
    key: &str,
    init: Option<fn() -> DataEntity>,
    project: fn(&mut DataEntity) -> Option<&mut T>,
    f: impl FnOnce(&mut T) -> R,
) -> ShardisResult<Option<R>> {
    let result = {
        let entry = match init {
            Some(init) => Some(db.get_or_insert_with(key, init)),
            None => db.get_mut(key),
        };
        let Some(mut entry) = entry else {
            return Ok(None);
        };
        let value = project(&mut *entry).ok_or(ShardisError::WrongType)?;
        f(value)
    };
    db.remove_if_empty(key);
    Ok(Some(result))
}
