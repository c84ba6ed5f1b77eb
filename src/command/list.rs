use crate::command::{
    CommandTable, arg_to_i64, arg_to_string, normalize_index, normalize_range, read_entity,
    update_entity,
};
use crate::error::{ShardisError, ShardisResult};
use crate::resp::RespValue;
use crate::store::Database;
use crate::types::DataEntity;
use crate::types::list::LinkedList;

pub(super) fn register(table: &mut CommandTable) {
    table.register("lpush", cmd_lpush, -3, true);
    table.register("rpush", cmd_rpush, -3, true);
    table.register("lpop", cmd_lpop, 2, true);
    table.register("rpop", cmd_rpop, 2, true);
    table.register("llen", cmd_llen, 2, false);
    table.register("lindex", cmd_lindex, 3, false);
    table.register("lrange", cmd_lrange, 4, false);
    table.register("lset", cmd_lset, 4, true);
    table.register("lrem", cmd_lrem, 4, true);
}

fn new_list() -> DataEntity {
    DataEntity::List(LinkedList::new())
}

fn push(db: &Database, args: &[Vec<u8>], front: bool) -> ShardisResult<RespValue> {
    let len = update_entity(
        db,
        &arg_to_string(&args[0]),
        Some(new_list),
        DataEntity::as_list_mut,
        |list| {
            for value in &args[1..] {
                if front {
                    list.push_front(value.clone());
                } else {
                    list.push_back(value.clone());
                }
            }
            list.len()
        },
    )?;
    Ok(RespValue::integer(len.unwrap_or(0) as i64))
}

fn pop(db: &Database, args: &[Vec<u8>], front: bool) -> ShardisResult<RespValue> {
    let value = update_entity(
        db,
        &arg_to_string(&args[0]),
        None,
        DataEntity::as_list_mut,
        |list| if front { list.pop_front() } else { list.pop_back() },
    )?;
    Ok(value
        .flatten()
        .map(RespValue::bulk_string)
        .unwrap_or_else(RespValue::null_bulk_string))
}

fn cmd_lpush(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    push(db, args, true)
}

fn cmd_rpush(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    push(db, args, false)
}

fn cmd_lpop(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    pop(db, args, true)
}

fn cmd_rpop(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    pop(db, args, false)
}

fn cmd_llen(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let len = read_entity(db, &arg_to_string(&args[0]), DataEntity::as_list, |l| l.len())?;
    Ok(RespValue::integer(len.unwrap_or(0) as i64))
}

fn cmd_lindex(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let index = arg_to_i64(&args[1])?;
    let value = read_entity(db, &arg_to_string(&args[0]), DataEntity::as_list, |list| {
        normalize_index(index, list.len())
            .and_then(|i| list.get(i))
            .map(<[u8]>::to_vec)
    })?;
    Ok(value
        .flatten()
        .map(RespValue::bulk_string)
        .unwrap_or_else(RespValue::null_bulk_string))
}

fn cmd_lrange(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let start = arg_to_i64(&args[1])?;
    let stop = arg_to_i64(&args[2])?;
    let items = read_entity(db, &arg_to_string(&args[0]), DataEntity::as_list, |list| {
        match normalize_range(start, stop, list.len()) {
            Some((from, to)) => list.range(from, to),
            None => Vec::new(),
        }
    })?;
    Ok(RespValue::multi_bulk(items.unwrap_or_default()))
}

fn cmd_lset(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let index = arg_to_i64(&args[1])?;
    let value = args[2].clone();
    let updated = update_entity(
        db,
        &arg_to_string(&args[0]),
        None,
        DataEntity::as_list_mut,
        |list| normalize_index(index, list.len()).is_some_and(|i| list.set(i, value)),
    )?;
    match updated {
        None => Err(ShardisError::NoSuchKey),
        Some(false) => Err(ShardisError::IndexOutOfRange),
        Some(true) => Ok(RespValue::ok()),
    }
}

/// LREM key count value: positive counts remove from the head, negative from
/// the tail, zero removes every match.
fn cmd_lrem(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let count = arg_to_i64(&args[1])?;
    let value = &args[2];
    let limit = count.unsigned_abs() as usize;
    let removed = update_entity(
        db,
        &arg_to_string(&args[0]),
        None,
        DataEntity::as_list_mut,
        |list| {
            if count < 0 {
                list.remove_from_tail(value, limit)
            } else {
                list.remove_from_head(value, limit)
            }
        },
    )?;
    Ok(RespValue::integer(removed.unwrap_or(0) as i64))
}

#[cfg(test)]
mod tests {
    use crate::command::test_util::{bulks, run};
    use crate::resp::RespValue;
    use crate::store::Database;

    #[test]
    fn test_push_and_range() {
        let db = Database::new();
        assert_eq!(run(&db, &["RPUSH", "l", "a", "b"]), RespValue::integer(2));
        assert_eq!(run(&db, &["RPUSH", "l", "c"]), RespValue::integer(3));
        assert_eq!(run(&db, &["LRANGE", "l", "0", "-1"]), bulks(&["a", "b", "c"]));
        assert_eq!(run(&db, &["LRANGE", "l", "-2", "100"]), bulks(&["b", "c"]));
        assert_eq!(run(&db, &["LRANGE", "l", "5", "10"]), RespValue::empty_array());
        assert_eq!(run(&db, &["LPUSH", "l", "z"]), RespValue::integer(4));
        assert_eq!(run(&db, &["LINDEX", "l", "0"]), RespValue::bulk_string("z"));
        assert_eq!(run(&db, &["LINDEX", "l", "-1"]), RespValue::bulk_string("c"));
        assert_eq!(run(&db, &["LINDEX", "l", "9"]), RespValue::null_bulk_string());
        assert_eq!(run(&db, &["LLEN", "l"]), RespValue::integer(4));
    }

    #[test]
    fn test_pop_removes_empty_list() {
        let db = Database::new();
        assert_eq!(run(&db, &["LPOP", "l"]), RespValue::null_bulk_string());
        run(&db, &["RPUSH", "l", "a", "b"]);
        assert_eq!(run(&db, &["RPOP", "l"]), RespValue::bulk_string("b"));
        assert_eq!(run(&db, &["LPOP", "l"]), RespValue::bulk_string("a"));
        assert_eq!(run(&db, &["EXISTS", "l"]), RespValue::integer(0));
        assert_eq!(run(&db, &["LPOP", "l"]), RespValue::null_bulk_string());
    }

    #[test]
    fn test_lset() {
        let db = Database::new();
        assert_eq!(
            run(&db, &["LSET", "l", "0", "x"]),
            RespValue::error("ERR no such key")
        );
        run(&db, &["RPUSH", "l", "a", "b"]);
        assert_eq!(run(&db, &["LSET", "l", "-1", "B"]), RespValue::ok());
        assert_eq!(
            run(&db, &["LSET", "l", "2", "x"]),
            RespValue::error("ERR index out of range")
        );
        assert_eq!(run(&db, &["LRANGE", "l", "0", "-1"]), bulks(&["a", "B"]));
    }

    #[test]
    fn test_lrem() {
        let db = Database::new();
        run(&db, &["RPUSH", "l", "x", "a", "x", "b", "x"]);
        assert_eq!(run(&db, &["LREM", "l", "-1", "x"]), RespValue::integer(1));
        assert_eq!(run(&db, &["LRANGE", "l", "0", "-1"]), bulks(&["x", "a", "x", "b"]));
        assert_eq!(run(&db, &["LREM", "l", "1", "x"]), RespValue::integer(1));
        assert_eq!(run(&db, &["LREM", "l", "0", "x"]), RespValue::integer(1));
        assert_eq!(run(&db, &["LRANGE", "l", "0", "-1"]), bulks(&["a", "b"]));
        run(&db, &["LREM", "l", "0", "a"]);
        run(&db, &["LREM", "l", "0", "b"]);
        assert_eq!(run(&db, &["EXISTS", "l"]), RespValue::integer(0));
    }

    #[test]
    fn test_bad_index() {
        let db = Database::new();
        run(&db, &["RPUSH", "l", "a"]);
        assert_eq!(
            run(&db, &["LINDEX", "l", "x"]),
            RespValue::error("ERR value is not an integer or out of range")
        );
    }
}
