//! # Redis
//!
//! RAM database backing every collection.
//!
//! ## Layout
//! - `{collection}:{id}`: hash, one entry per top-level field, each value JSON-encoded
//! - `{collection}`: set of every id in the collection
//!
//! ## Atomicity
//! Writes run as Lua scripts so the before snapshot, the mutation and the
//! after snapshot happen as one step. Guards are all checked before anything
//! is written. Increments use the stored number directly and are written back
//! with 15 significant digits, so float sums don't pick up binary noise.
//! Arrays are decoded/encoded with `cjson` inside the script.
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use redis::{
    Client, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tracing::info;

use super::{Change, Document, DocumentStore, FieldUpdate, StoreError};

const SET_SCRIPT: &str = r#"
local existed = redis.call('SISMEMBER', KEYS[2], ARGV[1])
local before = redis.call('HGETALL', KEYS[1])
if ARGV[2] ~= '1' then
    redis.call('DEL', KEYS[1])
end
for i = 3, #ARGV, 2 do
    redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
end
redis.call('SADD', KEYS[2], ARGV[1])
return {existed, before, redis.call('HGETALL', KEYS[1])}
"#;

const UPDATE_SCRIPT: &str = r#"
if redis.call('SISMEMBER', KEYS[2], ARGV[1]) == 0 then
    return {0, {}, {}}
end
for i = 2, #ARGV, 3 do
    if ARGV[i] == 'min' then
        local current = tonumber(redis.call('HGET', KEYS[1], ARGV[i + 1]) or '0') or 0
        if current < tonumber(ARGV[i + 2]) then
            return {2, {}, {}}
        end
    end
end
local before = redis.call('HGETALL', KEYS[1])
for i = 2, #ARGV, 3 do
    local op, field, value = ARGV[i], ARGV[i + 1], ARGV[i + 2]
    if op == 'min' then
        -- checked above
    elseif op == 'set' then
        redis.call('HSET', KEYS[1], field, value)
    elseif op == 'incr' then
        local current = tonumber(redis.call('HGET', KEYS[1], field) or '0') or 0
        redis.call('HSET', KEYS[1], field, string.format('%.15g', current + tonumber(value)))
    else
        local raw = redis.call('HGET', KEYS[1], field)
        local items = {}
        if raw and raw ~= 'null' then
            items = cjson.decode(raw)
        end
        local item = cjson.decode(value)
        local present = false
        if op == 'union' then
            for _, existing in ipairs(items) do
                if existing == item then
                    present = true
                    break
                end
            end
        end
        if not present then
            table.insert(items, item)
        end
        redis.call('HSET', KEYS[1], field, cjson.encode(items))
    end
end
return {1, before, redis.call('HGETALL', KEYS[1])}
"#;

const MISSING: i64 = 0;
const GUARD_FAILED: i64 = 2;

const DELETE_SCRIPT: &str = r#"
local existed = redis.call('SREM', KEYS[2], ARGV[1])
local before = redis.call('HGETALL', KEYS[1])
redis.call('DEL', KEYS[1])
return {existed, before}
"#;

pub struct RedisStore {
    connection_manager: ConnectionManager,
    set_script: Script,
    update_script: Script,
    delete_script: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(100));

        let client = Client::open(redis_url)?;
        let connection_manager = client.get_connection_manager_with_config(config).await?;

        info!("Connected to Redis at {redis_url}");

        Ok(Self {
            connection_manager,
            set_script: Script::new(SET_SCRIPT),
            update_script: Script::new(UPDATE_SCRIPT),
            delete_script: Script::new(DELETE_SCRIPT),
        })
    }
}

fn document_key(collection: &str, id: &str) -> String {
    format!("{collection}:{id}")
}

/// Turns a flat `HGETALL` reply into a document.
fn decode_fields(key: &str, flat: Vec<String>) -> Result<Document, StoreError> {
    let mut document = Document::new();

    for pair in flat.chunks_exact(2) {
        let value = serde_json::from_str(&pair[1]).map_err(|_| StoreError::Malformed {
            key: key.to_string(),
            field: pair[0].clone(),
        })?;
        document.insert(pair[0].clone(), value);
    }

    Ok(document)
}

fn encode_update(update: &FieldUpdate) -> Result<(&'static str, String), StoreError> {
    Ok(match update {
        FieldUpdate::Set(_, value) => ("set", serde_json::to_string(value)?),
        FieldUpdate::Increment(_, by) => ("incr", by.to_string()),
        FieldUpdate::ArrayUnion(_, value) => ("union", serde_json::to_string(value)?),
        FieldUpdate::ArrayAppend(_, value) => ("append", serde_json::to_string(value)?),
        FieldUpdate::AtLeast(_, min) => ("min", min.to_string()),
    })
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let key = document_key(collection, id);
        let mut connection = self.connection_manager.clone();

        let (exists, fields): (bool, HashMap<String, String>) = redis::pipe()
            .sismember(collection, id)
            .hgetall(&key)
            .query_async(&mut connection)
            .await?;

        if !exists {
            return Ok(None);
        }

        let flat = fields.into_iter().flat_map(|(k, v)| [k, v]).collect();
        decode_fields(&key, flat).map(Some)
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError> {
        let mut connection = self.connection_manager.clone();

        let mut ids: Vec<String> = redis::cmd("SMEMBERS")
            .arg(collection)
            .query_async(&mut connection)
            .await?;
        ids.sort();

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(document_key(collection, id));
        }
        let replies: Vec<HashMap<String, String>> = pipe.query_async(&mut connection).await?;

        ids.into_iter()
            .zip(replies)
            .map(|(id, fields)| {
                let key = document_key(collection, &id);
                let flat = fields.into_iter().flat_map(|(k, v)| [k, v]).collect();
                Ok((id, decode_fields(&key, flat)?))
            })
            .collect()
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        document: Document,
        merge: bool,
    ) -> Result<Change, StoreError> {
        let key = document_key(collection, id);
        let mut connection = self.connection_manager.clone();

        let mut invocation = self.set_script.prepare_invoke();
        invocation
            .key(&key)
            .key(collection)
            .arg(id)
            .arg(if merge { "1" } else { "0" });
        for (field, value) in &document {
            invocation.arg(field).arg(serde_json::to_string(value)?);
        }

        let (existed, before, after): (i64, Vec<String>, Vec<String>) =
            invocation.invoke_async(&mut connection).await?;

        Ok(Change {
            before: if existed == 1 {
                Some(decode_fields(&key, before)?)
            } else {
                None
            },
            after: Some(decode_fields(&key, after)?),
        })
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: &[FieldUpdate],
    ) -> Result<Change, StoreError> {
        let key = document_key(collection, id);
        let mut connection = self.connection_manager.clone();

        let mut invocation = self.update_script.prepare_invoke();
        invocation.key(&key).key(collection).arg(id);
        for update in updates {
            let (op, value) = encode_update(update)?;
            invocation.arg(op).arg(update.field()).arg(value);
        }

        let (status, before, after): (i64, Vec<String>, Vec<String>) =
            invocation.invoke_async(&mut connection).await?;

        match status {
            MISSING => {
                return Err(StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                });
            }
            GUARD_FAILED => {
                return Err(StoreError::Precondition {
                    collection: collection.to_string(),
                    id: id.to_string(),
                });
            }
            _ => {}
        }

        Ok(Change {
            before: Some(decode_fields(&key, before)?),
            after: Some(decode_fields(&key, after)?),
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<Change, StoreError> {
        let key = document_key(collection, id);
        let mut connection = self.connection_manager.clone();

        let mut invocation = self.delete_script.prepare_invoke();
        invocation.key(&key).key(collection).arg(id);

        let (existed, before): (i64, Vec<String>) =
            invocation.invoke_async(&mut connection).await?;

        Ok(Change {
            before: if existed == 1 {
                Some(decode_fields(&key, before)?)
            } else {
                None
            },
            after: None,
        })
    }
}
