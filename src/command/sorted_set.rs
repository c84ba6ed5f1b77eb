use crate::command::{
    CommandTable, arg_to_f64, arg_to_i64, arg_to_string, normalize_range, read_entity,
    update_entity,
};
use crate::error::{ShardisError, ShardisResult};
use crate::resp::RespValue;
use crate::store::Database;
use crate::types::DataEntity;
use crate::types::border::ScoreBorder;
use crate::types::skiplist::Element;
use crate::types::sorted_set::SortedSet;

pub(super) fn register(table: &mut CommandTable) {
    table.register("zadd", cmd_zadd, -4, true);
    table.register("zscore", cmd_zscore, 3, false);
    table.register("zrank", cmd_zrank, 3, false);
    table.register("zrevrank", cmd_zrevrank, 3, false);
    table.register("zcard", cmd_zcard, 2, false);
    table.register("zrange", cmd_zrange, -4, false);
    table.register("zrevrange", cmd_zrevrange, -4, false);
    table.register("zcount", cmd_zcount, 4, false);
    table.register("zrangebyscore", cmd_zrangebyscore, -4, false);
    table.register("zrevrangebyscore", cmd_zrevrangebyscore, -4, false);
    table.register("zremrangebyscore", cmd_zremrangebyscore, 4, true);
    table.register("zremrangebyrank", cmd_zremrangebyrank, 4, true);
    table.register("zrem", cmd_zrem, -3, true);
}

fn new_zset() -> DataEntity {
    DataEntity::SortedSet(SortedSet::new())
}

fn format_score(score: f64) -> String {
    format!("{}", score)
}

fn elements_reply(elements: Vec<Element>, with_scores: bool) -> RespValue {
    let mut out = Vec::with_capacity(elements.len() * if with_scores { 2 } else { 1 });
    for e in elements {
        let score = e.score;
        out.push(e.member.into_bytes());
        if with_scores {
            out.push(format_score(score).into_bytes());
        }
    }
    RespValue::multi_bulk(out)
}

fn is_option(arg: &[u8], name: &str) -> bool {
    arg.eq_ignore_ascii_case(name.as_bytes())
}

/// ZADD key score member [score member ...]. Every score is validated before
/// the set is touched.
fn cmd_zadd(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let pairs = &args[1..];
    if pairs.len() % 2 != 0 {
        return Err(ShardisError::Syntax);
    }
    let mut entries = Vec::with_capacity(pairs.len() / 2);
    for pair in pairs.chunks_exact(2) {
        entries.push((arg_to_f64(&pair[0])?, arg_to_string(&pair[1])));
    }

    let added = update_entity(
        db,
        &arg_to_string(&args[0]),
        Some(new_zset),
        DataEntity::as_sorted_set_mut,
        |zset| {
            entries
                .into_iter()
                .filter(|(score, member)| zset.add(member.clone(), *score))
                .count()
        },
    )?;
    Ok(RespValue::integer(added.unwrap_or(0) as i64))
}

fn cmd_zscore(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let member = arg_to_string(&args[1]);
    let score = read_entity(db, &arg_to_string(&args[0]), DataEntity::as_sorted_set, |z| {
        z.score(&member)
    })?;
    Ok(score
        .flatten()
        .map(|s| RespValue::bulk_string(format_score(s)))
        .unwrap_or_else(RespValue::null_bulk_string))
}

fn rank(db: &Database, args: &[Vec<u8>], desc: bool) -> ShardisResult<RespValue> {
    let member = arg_to_string(&args[1]);
    let rank = read_entity(db, &arg_to_string(&args[0]), DataEntity::as_sorted_set, |z| {
        z.rank(&member, desc)
    })?;
    Ok(rank
        .flatten()
        .map(|r| RespValue::integer(r as i64))
        .unwrap_or_else(RespValue::null_bulk_string))
}

fn cmd_zrank(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    rank(db, args, false)
}

fn cmd_zrevrank(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    rank(db, args, true)
}

fn cmd_zcard(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let len = read_entity(db, &arg_to_string(&args[0]), DataEntity::as_sorted_set, |z| z.len())?;
    Ok(RespValue::integer(len.unwrap_or(0) as i64))
}

/// ZRANGE/ZREVRANGE key start stop [WITHSCORES]
fn range(db: &Database, args: &[Vec<u8>], desc: bool) -> ShardisResult<RespValue> {
    let with_scores = match &args[3..] {
        [] => false,
        [opt] if is_option(opt, "withscores") => true,
        _ => return Err(ShardisError::Syntax),
    };
    let start = arg_to_i64(&args[1])?;
    let stop = arg_to_i64(&args[2])?;
    let elements = read_entity(db, &arg_to_string(&args[0]), DataEntity::as_sorted_set, |z| {
        match normalize_range(start, stop, z.len()) {
            Some((from, to)) => z.range(from, to, desc),
            None => Vec::new(),
        }
    })?;
    Ok(elements_reply(elements.unwrap_or_default(), with_scores))
}

fn cmd_zrange(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    range(db, args, false)
}

fn cmd_zrevrange(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    range(db, args, true)
}

fn cmd_zcount(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let min = ScoreBorder::parse(&args[1])?;
    let max = ScoreBorder::parse(&args[2])?;
    let count = read_entity(db, &arg_to_string(&args[0]), DataEntity::as_sorted_set, |z| {
        z.count(&min, &max)
    })?;
    Ok(RespValue::integer(count.unwrap_or(0) as i64))
}

/// Trailing options of ZRANGEBYSCORE: `[WITHSCORES] [LIMIT offset count]`.
struct ScoreRangeOptions {
    with_scores: bool,
    offset: i64,
    limit: i64,
}

impl ScoreRangeOptions {
    fn parse(options: &[Vec<u8>]) -> ShardisResult<Self> {
        let mut parsed = ScoreRangeOptions {
            with_scores: false,
            offset: 0,
            limit: -1,
        };
        let mut i = 0;
        while i < options.len() {
            if is_option(&options[i], "withscores") {
                parsed.with_scores = true;
                i += 1;
            } else if is_option(&options[i], "limit") {
                let (Some(offset), Some(limit)) = (options.get(i + 1), options.get(i + 2)) else {
                    return Err(ShardisError::Syntax);
                };
                parsed.offset = arg_to_i64(offset)?;
                parsed.limit = arg_to_i64(limit)?;
                i += 3;
            } else {
                return Err(ShardisError::Syntax);
            }
        }
        Ok(parsed)
    }
}

fn range_by_score(
    db: &Database,
    key: &[u8],
    min: &[u8],
    max: &[u8],
    options: &[Vec<u8>],
    desc: bool,
) -> ShardisResult<RespValue> {
    let min = ScoreBorder::parse(min)?;
    let max = ScoreBorder::parse(max)?;
    let options = ScoreRangeOptions::parse(options)?;
    let Ok(offset) = usize::try_from(options.offset) else {
        return Ok(RespValue::empty_array());
    };
    let elements = read_entity(db, &arg_to_string(key), DataEntity::as_sorted_set, |z| {
        if ScoreBorder::is_empty_interval(&min, &max) {
            Vec::new()
        } else {
            z.range_by_score(&min, &max, offset, options.limit, desc)
        }
    })?;
    Ok(elements_reply(elements.unwrap_or_default(), options.with_scores))
}

fn cmd_zrangebyscore(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    range_by_score(db, &args[0], &args[1], &args[2], &args[3..], false)
}

/// ZREVRANGEBYSCORE key max min [...]: the borders come in reverse order.
fn cmd_zrevrangebyscore(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    range_by_score(db, &args[0], &args[2], &args[1], &args[3..], true)
}

fn cmd_zremrangebyscore(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let min = ScoreBorder::parse(&args[1])?;
    let max = ScoreBorder::parse(&args[2])?;
    let removed = update_entity(
        db,
        &arg_to_string(&args[0]),
        None,
        DataEntity::as_sorted_set_mut,
        |z| z.remove_by_score(&min, &max),
    )?;
    Ok(RespValue::integer(removed.unwrap_or(0) as i64))
}

fn cmd_zremrangebyrank(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let start = arg_to_i64(&args[1])?;
    let stop = arg_to_i64(&args[2])?;
    let removed = update_entity(
        db,
        &arg_to_string(&args[0]),
        None,
        DataEntity::as_sorted_set_mut,
        |z| match normalize_range(start, stop, z.len()) {
            Some((from, to)) => z.remove_by_rank(from, to),
            None => 0,
        },
    )?;
    Ok(RespValue::integer(removed.unwrap_or(0) as i64))
}

fn cmd_zrem(db: &Database, args: &[Vec<u8>]) -> ShardisResult<RespValue> {
    let removed = update_entity(
        db,
        &arg_to_string(&args[0]),
        None,
        DataEntity::as_sorted_set_mut,
        |z| {
            args[1..]
                .iter()
                .filter(|m| z.remove(&arg_to_string(m)))
                .count()
        },
    )?;
    Ok(RespValue::integer(removed.unwrap_or(0) as i64))
}
