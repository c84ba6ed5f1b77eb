use crate::command::{CommandTable, arg_to_string, read_entity, update_entity};
use crate::error::ShardisResult;
use crate::resp::RespValue;
use crate::store::Database;
use crate::types::DataEntity;
use std::collections::HashMap;

pub(super) fn register(table: &mut CommandTable) {
    table.register("hset", cmd_hset, 4, true);
    table.register("hget", cmd_hget, 3, false);
    table.register("hdel", cmd_hdel, -3, true);
    table.register("hkeys", cmd_hkeys, 2, false);
    table.register("hvals", cmd_hvals, 2, false);
    table.register("hgetall", cmd_hgetall, 2, false);
    table.register("hexists", cmd_hexists, 3, false);
    table.register("hlen", cmd_hlen, 2, false);
}

fn new_hash() -> DataEntity {
    DataEntity::Hash(HashMap::new())
}

fn cmd_hset(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let field = arg_to_string(&args[1]);
    let value = args[2].clone();
    let added = update_entity(
        db,
        &arg_to_string(&args[0]),
        Some(new_hash),
        DataEntity::as_hash_mut,
        |hash| hash.insert(field, value).is_none(),
    )?;
    Ok(RespValue::integer(added.unwrap_or(false) as i64))
}

fn cmd_hget(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let field = arg_to_string(&args[1]);
    let value = read_entity(db, &arg_to_string(&args[0]), DataEntity::as_hash, |hash| {
        hash.get(&field).cloned()
    })?;
    Ok(value
        .flatten()
        .map(RespValue::bulk_string)
        .unwrap_or_else(RespValue::null_bulk_string))
}

fn cmd_hdel(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let removed = update_entity(
        db,
        &arg_to_string(&args[0]),
        None,
        DataEntity::as_hash_mut,
        |hash| {
            args[1..]
                .iter()
                .filter(|f| hash.remove(&arg_to_string(f)).is_some())
                .count()
        },
    )?;
    Ok(RespValue::integer(removed.unwrap_or(0) as i64))
}

fn cmd_hkeys(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let keys = read_entity(db, &arg_to_string(&args[0]), DataEntity::as_hash, |hash| {
        hash.keys().cloned().collect::<Vec<_>>()
    })?;
    Ok(RespValue::multi_bulk(keys.unwrap_or_default()))
}

fn cmd_hvals(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let values = read_entity(db, &arg_to_string(&args[0]), DataEntity::as_hash, |hash| {
        hash.values().cloned().collect::<Vec<_>>()
    })?;
    Ok(RespValue::multi_bulk(values.unwrap_or_default()))
}

fn cmd_hgetall(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let pairs = read_entity(db, &arg_to_string(&args[0]), DataEntity::as_hash, |hash| {
        hash.iter()
            .flat_map(|(f, v)| [f.as_bytes().to_vec(), v.clone()])
            .collect::<Vec<_>>()
    })?;
    Ok(RespValue::multi_bulk(pairs.unwrap_or_default()))
}

fn cmd_hexists(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let field = arg_to_string(&args[1]);
    let found = read_entity(db, &arg_to_string(&args[0]), DataEntity::as_hash, |hash| {
        hash.contains_key(&field)
    })?;
    Ok(RespValue::integer(found.unwrap_or(false) as i64))
}

fn cmd_hlen(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let len = read_entity(db, &arg_to_string(&args[0]), DataEntity::as_hash, |hash| {
        hash.len()
    })?;
    Ok(RespValue::integer(len.unwrap_or(0) as i64))
}
