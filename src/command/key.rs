use crate::command::{CommandTable, arg_to_string, arg_to_ttl_millis};
use crate::error::{ShardisError, ShardisResult};
use crate::glob::Pattern;
use crate::resp::RespValue;
use crate::store::{Database, now_millis};

pub(super) fn register(table: &mut CommandTable) {
    table.register("del", cmd_del, -2, true);
    table.register("exists", cmd_exists, -2, false);
    table.register("keys", cmd_keys, 2, false);
    table.register("flushdb", cmd_flushdb, 1, true);
    table.register("type", cmd_type, 2, false);
    table.register("rename", cmd_rename, 3, true);
    table.register("renamenx", cmd_renamenx, 3, true);
    table.register("expire", cmd_expire, 3, true);
    table.register("ttl", cmd_ttl, 2, false);
    table.register("persist", cmd_persist, 2, true);
}

fn cmd_del(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let keys: Vec<String> = args.iter().map(|k| arg_to_string(k)).collect();
    Ok(RespValue::integer(db.remove_many(&keys) as i64))
}

fn cmd_exists(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let count = args
        .iter()
        .filter(|k| db.contains(&arg_to_string(k)))
        .count();
    Ok(RespValue::integer(count as i64))
}

fn cmd_keys(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let pattern = Pattern::compile(&args[0]);
    Ok(RespValue::multi_bulk(db.keys(&pattern)))
}

fn cmd_flushdb(db: &Database, _args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    db.clear();
    Ok(RespValue::ok())
}

fn cmd_type(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let name = match db.get(&arg_to_string(&args[0])) {
        Some(entry) => entry.type_name(),
        None => "none",
    };
    Ok(RespValue::simple_string(name))
}

/// Move `old` to `new`, carrying its TTL along. The destination's own TTL is
/// discarded.
fn move_key(db: &Database, old: &str, new: &str) -> ShardisResult<()> {
    let deadline = db.deadline(old);
    let entity = db.remove(old).ok_or(ShardisError::NoSuchKey)?;
    db.put(new.to_string(), entity);
    if let Some(deadline) = deadline {
        db.expire(new, deadline);
    }
    Ok(())
}

fn cmd_rename(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let old = arg_to_string(&args[0]);
    let new = arg_to_string(&args[1]);
    if old != new {
        move_key(db, &old, &new)?;
    } else if !db.contains(&old) {
        return Err(ShardisError::NoSuchKey);
    }
    Ok(RespValue::ok())
}

fn cmd_renamenx(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let old = arg_to_string(&args[0]);
    let new = arg_to_string(&args[1]);
    if !db.contains(&old) {
        return Err(ShardisError::NoSuchKey);
    }
    if db.contains(&new) {
        return Ok(RespValue::integer(0));
    }
    move_key(db, &old, &new)?;
    Ok(RespValue::integer(1))
}

fn cmd_expire(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let ttl = arg_to_ttl_millis(&args[1], "expire")?;
    if !db.contains(&key) {
        return Ok(RespValue::integer(0));
    }
    db.expire(&key, now_millis() + ttl);
    Ok(RespValue::integer(1))
}

fn cmd_ttl(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let key = arg_to_string(&args[0]);
    if !db.contains(&key) {
        return Ok(RespValue::integer(-2));
    }
    let ttl = match db.deadline(&key) {
        Some(deadline) => (deadline.saturating_sub(now_millis()).div_ceil(1000)) as i64,
        None => -1,
    };
    Ok(RespValue::integer(ttl))
}

fn cmd_persist(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let removed = db.contains(&key) && db.persist(&key);
    Ok(RespValue::integer(removed as i64))
}
