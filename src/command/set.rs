use crate::command::{CommandTable, arg_to_i64, arg_to_string, read_entity, update_entity};
use crate::error::{ShardisError, ShardisResult};
use crate::resp::RespValue;
use crate::store::Database;
use crate::types::DataEntity;
use crate::types::set::MemberSet;
use std::collections::HashSet;

/// Largest reply SRANDMEMBER builds for a positive count.
const MAX_RANDOM_COUNT: i64 = 1024 * 1024;

pub(super) fn register(table: &mut CommandTable) {
    table.register("sadd", cmd_sadd, -3, true);
    table.register("srem", cmd_srem, -3, true);
    table.register("smembers", cmd_smembers, 2, false);
    table.register("sismember", cmd_sismember, 3, false);
    table.register("scard", cmd_scard, 2, false);
    table.register("srandmember", cmd_srandmember, -2, false);
    table.register("sdiff", cmd_sdiff, -2, false);
    table.register("sunion", cmd_sunion, -2, false);
    table.register("sinter", cmd_sinter, -2, false);
}

fn new_set() -> DataEntity {
    DataEntity::Set(MemberSet::new())
}

/// Snapshot of a set's members. The entry lock is released on return so
/// several keys can be combined without holding two locks at once.
fn members_of(db: &Database, key: &[u8]) -> ShardisResult<Option<HashSet<Vec<u8>>>> {
    read_entity(db, &arg_to_string(key), DataEntity::as_set, |set| {
        set.iter().cloned().collect()
    })
}

fn cmd_sadd(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let added = update_entity(
        db,
        &arg_to_string(&args[0]),
        Some(new_set),
        DataEntity::as_set_mut,
        |set| args[1..].iter().filter(|m| set.add(m.to_vec())).count(),
    )?;
    Ok(RespValue::integer(added.unwrap_or(0) as i64))
}

fn cmd_srem(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let removed = update_entity(
        db,
        &arg_to_string(&args[0]),
        None,
        DataEntity::as_set_mut,
        |set| args[1..].iter().filter(|m| set.remove(m)).count(),
    )?;
    Ok(RespValue::integer(removed.unwrap_or(0) as i64))
}

fn cmd_smembers(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let members = members_of(db, &args[0])?.unwrap_or_default();
    Ok(RespValue::multi_bulk(members))
}

fn cmd_sismember(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let found = read_entity(db, &arg_to_string(&args[0]), DataEntity::as_set, |set| {
        set.contains(&args[1])
    })?;
    Ok(RespValue::integer(found.unwrap_or(false) as i64))
}

fn cmd_scard(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let len = read_entity(db, &arg_to_string(&args[0]), DataEntity::as_set, |set| set.len())?;
    Ok(RespValue::integer(len.unwrap_or(0) as i64))
}

/// SRANDMEMBER key [count]. Without a count a single member (or null) is
/// returned; see [`MemberSet::random_members`] for the count semantics.
fn cmd_srandmember(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let key = arg_to_string(&args[0]);
    match args.len() {
        1 => {
            let member = read_entity(db, &key, DataEntity::as_set, |set| {
                set.random_member().cloned()
            })?;
            Ok(member
                .flatten()
                .map(RespValue::bulk_string)
                .unwrap_or_else(RespValue::null_bulk_string))
        }
        2 => {
            let count = arg_to_i64(&args[1])?;
            if count > MAX_RANDOM_COUNT {
                return Err(ShardisError::OutOfRange);
            }
            let members = read_entity(db, &key, DataEntity::as_set, |set| {
                set.random_members(count)
            })?;
            Ok(RespValue::multi_bulk(members.unwrap_or_default()))
        }
        _ => Err(ShardisError::Syntax),
    }
}

fn cmd_sdiff(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let Some(mut result) = members_of(db, &args[0])? else {
        return Ok(RespValue::empty_array());
    };
    for key in &args[1..] {
        if let Some(other) = members_of(db, key)? {
            result.retain(|m| !other.contains(m));
        }
    }
    Ok(RespValue::multi_bulk(result))
}

fn cmd_sunion(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let mut result = HashSet::new();
    for key in args {
        if let Some(members) = members_of(db, key)? {
            result.extend(members);
        }
    }
    Ok(RespValue::multi_bulk(result))
}

fn cmd_sinter(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let Some(mut result) = members_of(db, &args[0])? else {
        return Ok(RespValue::empty_array());
    };
    for key in &args[1..] {
        match members_of(db, key)? {
            Some(other) => result.retain(|m| other.contains(m)),
            None => return Ok(RespValue::empty_array()),
        }
    }
    Ok(RespValue::multi_bulk(result))
}

#[cfg(test)]
mod tests {
    use crate::command::test_util::run;
    use crate::resp::RespValue;
    use crate::store::Database;

    fn sorted(reply: RespValue) -> Vec<Vec<u8>> {
        let mut items = reply.into_args().unwrap();
        items.sort();
        items
    }

    fn owned(items: &[&str]) -> Vec<Vec<u8>> {
        items.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_sadd_counts_new_members() {
        let db = Database::new();
        assert_eq!(run(&db, &["SADD", "s", "a", "b", "a"]), RespValue::integer(2));
        assert_eq!(run(&db, &["SADD", "s", "b", "c"]), RespValue::integer(1));
        assert_eq!(run(&db, &["SCARD", "s"]), RespValue::integer(3));
        assert_eq!(run(&db, &["SISMEMBER", "s", "c"]), RespValue::integer(1));
        assert_eq!(run(&db, &["SISMEMBER", "s", "z"]), RespValue::integer(0));
        assert_eq!(sorted(run(&db, &["SMEMBERS", "s"])), owned(&["a", "b", "c"]));
    }

    #[test]
    fn test_srem_drops_empty_set() {
        let db = Database::new();
        run(&db, &["SADD", "s", "a"]);
        assert_eq!(run(&db, &["SREM", "s", "a", "b"]), RespValue::integer(1));
        assert_eq!(run(&db, &["EXISTS", "s"]), RespValue::integer(0));
        assert_eq!(run(&db, &["SMEMBERS", "s"]), RespValue::empty_array());
    }

    #[test]
    fn test_srandmember() {
        let db = Database::new();
        assert_eq!(run(&db, &["SRANDMEMBER", "s"]), RespValue::null_bulk_string());
        run(&db, &["SADD", "s", "a", "b", "c"]);
        assert_eq!(sorted(run(&db, &["SRANDMEMBER", "s", "-5"])), owned(&["a", "b", "c"]));
        assert_eq!(sorted(run(&db, &["SRANDMEMBER", "s", "7"])).len(), 7);
        assert_eq!(run(&db, &["SRANDMEMBER", "s", "0"]), RespValue::empty_array());
        assert!(matches!(run(&db, &["SRANDMEMBER", "s"]), RespValue::BulkString(Some(_))));
    }

    #[test]
    fn test_srandmember_rejects_oversized_count() {
        let db = Database::new();
        run(&db, &["SADD", "s", "a"]);
        assert_eq!(
            run(&db, &["SRANDMEMBER", "s", "1099511627776"]),
            RespValue::error("ERR value is out of range")
        );
        assert_eq!(sorted(run(&db, &["SRANDMEMBER", "s", "1048576"])).len(), 1048576);
        // Distinct sampling is bounded by the set itself.
        assert_eq!(
            run(&db, &["SRANDMEMBER", "s", "-1099511627776"]),
            RespValue::multi_bulk(["a"])
        );
    }

    #[test]
    fn test_set_algebra() {
        let db = Database::new();
        run(&db, &["SADD", "a", "1", "2", "3"]);
        run(&db, &["SADD", "b", "2", "4"]);
        assert_eq!(sorted(run(&db, &["SDIFF", "a", "b", "missing"])), owned(&["1", "3"]));
        assert_eq!(run(&db, &["SDIFF", "missing", "a"]), RespValue::empty_array());
        assert_eq!(
            sorted(run(&db, &["SUNION", "missing", "a", "b"])),
            owned(&["1", "2", "3", "4"])
        );
        assert_eq!(sorted(run(&db, &["SINTER", "a", "b"])), owned(&["2"]));
        assert_eq!(run(&db, &["SINTER", "a", "missing"]), RespValue::empty_array());
    }
}
