use crate::command::CommandTable;
use crate::error::{ShardisError, ShardisResult};
use crate::resp::RespValue;
use crate::store::Database;

pub(super) fn register(table: &mut CommandTable) {
    table.register("ping", cmd_ping, -1, false);
}

fn cmd_ping(_db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    match args {
        [] => Ok(RespValue::pong()),
        [message] => Ok(RespValue::bulk_string(message.clone())),
        _ => Err(ShardisError::WrongArgCount("ping".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use crate::command::test_util::run;
    use crate::resp::RespValue;
    use crate::store::Database;

    #[test]
    fn test_ping() {
        let db = Database::new();
        assert_eq!(run(&db, &["PING"]), RespValue::pong());
        assert_eq!(run(&db, &["ping", "hello"]), RespValue::bulk_string("hello"));
        assert_eq!(
            run(&db, &["PING", "a", "b"]),
            RespValue::error("ERR wrong number of arguments for 'ping' command")
        );
    }
}
