use crate::command::{CommandTable, arg_to_string, arg_to_ttl_millis, read_entity};
use crate::error::{ShardisError, ShardisResult};
use crate::resp::RespValue;
use crate::store::{Database, now_millis};
use crate::types::DataEntity;

pub(super) fn register(table: &mut CommandTable) {
    table.register("get", cmd_get, 2, false);
    table.register("set", cmd_set, 3, true);
    table.register("setnx", cmd_setnx, 3, true);
    table.register("setex", cmd_setex, 4, true);
    table.register("getset", cmd_getset, 3, true);
    table.register("strlen", cmd_strlen, 2, false);
}

fn cmd_get(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let value = read_entity(db, &arg_to_string(&args[0]), DataEntity::as_string, |s| {
        RespValue::bulk_string(s.clone())
    })?;
    Ok(value.unwrap_or_else(RespValue::null_bulk_string))
}

fn cmd_set(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let key = arg_to_string(&args[0]);
    db.put(key, DataEntity::String(args[1].clone()));
    Ok(RespValue::ok())
}

fn cmd_setnx(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let stored = db.put_if_absent(key, DataEntity::String(args[1].clone()));
    Ok(RespValue::integer(stored as i64))
}

fn cmd_setex(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let ttl = arg_to_ttl_millis(&args[1], "setex")?;
    db.put(key.clone(), DataEntity::String(args[2].clone()));
    db.expire(&key, now_millis() + ttl);
    Ok(RespValue::ok())
}

fn cmd_getset(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let mut entry = db.get_or_insert_with(&key, || DataEntity::String(Vec::new()));
    let DataEntity::String(current) = &mut *entry else {
        return Err(ShardisError::WrongType);
    };
    let old = std::mem::replace(current, args[1].clone());
    db.persist(&key);
    drop(entry);
    Ok(RespValue::bulk_string(old))
}

fn cmd_strlen(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let len = read_entity(db, &arg_to_string(&args[0]), DataEntity::as_string, |s| s.len())?;
    Ok(RespValue::integer(len.unwrap_or(0) as i64))
}
