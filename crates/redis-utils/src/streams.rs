//! Redis Streams helpers: append with an auto-generated ID, create/attach a
//! consumer group, and read pending entries for a consumer.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, FromRedisValue, RedisResult, Value};
use serde::Serialize;
use std::collections::HashMap;

/// One entry delivered to a consumer group: the Redis-assigned entry ID and
/// every field stored on it.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

/// Append `fields` to `stream_key`, letting Redis assign the monotonic ID.
/// Returns the assigned entry ID (e.g. `"1700000000000-0"`).
pub async fn append_fields(
    conn: &mut ConnectionManager,
    stream_key: &str,
    fields: &[(&str, &str)],
) -> Result<String> {
    let id: String = conn
        .xadd(stream_key, "*", fields)
        .await
        .context("XADD failed")?;
    Ok(id)
}

/// Append a single JSON-serialized field to `stream_key`.
pub async fn append_json<T: Serialize>(
    conn: &mut ConnectionManager,
    stream_key: &str,
    field: &str,
    payload: &T,
) -> Result<String> {
    let body = serde_json::to_string(payload).context("serializing stream payload")?;
    append_fields(conn, stream_key, &[(field, &body)]).await
}

/// Create a consumer group at `$` (only new entries) if it doesn't already
/// exist. Redis returns `BUSYGROUP` if the group is already there; that
/// case is treated as success.
pub async fn ensure_group(
    conn: &mut ConnectionManager,
    stream_key: &str,
    group: &str,
) -> Result<()> {
    let result: RedisResult<()> = redis::cmd("XGROUP")
        .arg("CREATE")
        .arg(stream_key)
        .arg(group)
        .arg("$")
        .arg("MKSTREAM")
        .query_async(conn)
        .await;

    match result {
        Ok(()) => Ok(()),
        Err(err) if err.to_string().contains("BUSYGROUP") => Ok(()),
        Err(err) => Err(err).context("XGROUP CREATE failed"),
    }
}

/// Trim a stream to approximately `max_len` entries. Approximate trimming
/// (`~`) avoids an O(n) scan on every call.
pub async fn trim_approx(
    conn: &mut ConnectionManager,
    stream_key: &str,
    max_len: usize,
) -> Result<()> {
    let _: i64 = redis::cmd("XTRIM")
        .arg(stream_key)
        .arg("MAXLEN")
        .arg("~")
        .arg(max_len)
        .query_async(conn)
        .await
        .context("XTRIM failed")?;
    Ok(())
}

/// Read new entries for `consumer` in `group`, blocking up to `block_ms`.
/// Entries are not acknowledged until [`ack`] is called, so a crash between
/// read and ack redelivers them — consumers must dedupe on entry contents.
pub async fn read_group(
    conn: &mut ConnectionManager,
    stream_key: &str,
    group: &str,
    consumer: &str,
    count: usize,
    block_ms: usize,
) -> Result<Vec<StreamEntry>> {
    let raw: Value = redis::cmd("XREADGROUP")
        .arg("GROUP")
        .arg(group)
        .arg(consumer)
        .arg("COUNT")
        .arg(count)
        .arg("BLOCK")
        .arg(block_ms)
        .arg("STREAMS")
        .arg(stream_key)
        .arg(">")
        .query_async(conn)
        .await
        .context("XREADGROUP failed")?;

    if raw == Value::Nil {
        return Ok(Vec::new());
    }

    let streams: Vec<(String, Vec<(String, Vec<(String, String)>)>)> =
        FromRedisValue::from_redis_value(&raw).context("decoding XREADGROUP reply")?;

    Ok(streams
        .into_iter()
        .flat_map(|(_, entries)| entries)
        .map(|(id, fields)| StreamEntry {
            id,
            fields: fields.into_iter().collect::<HashMap<_, _>>(),
        })
        .collect())
}

/// Acknowledge one or more entry IDs in `group`, removing them from the
/// group's pending-entries list.
pub async fn ack(
    conn: &mut ConnectionManager,
    stream_key: &str,
    group: &str,
    ids: &[String],
) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let _: i64 = conn
        .xack(stream_key, group, ids)
        .await
        .context("XACK failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Dummy {
        value: u32,
    }

    #[test]
    fn payload_serializes_to_json() {
        let dummy = Dummy { value: 42 };
        let body = serde_json::to_string(&dummy).unwrap();
        assert_eq!(body, r#"{"value":42}"#);
    }
}
