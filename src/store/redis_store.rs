//! Redis Stack backend: RediSearch for vectors, RedisJSON for results.

use super::VectorStore;
use crate::error::{OptimizeError, Result};
use crate::index::{ID_FIELD, IndexDocument, IndexSpec, IndexStatus, TEXT_FIELD, VECTOR_FIELD};
use crate::metrics::Hit;
use crate::settings::Algorithm;
use async_trait::async_trait;
use redis::Value;
use std::collections::HashSet;
use redis::aio::MultiplexedConnection;
use tracing::{debug, info};

/// Alias RediSearch assigns to the KNN score.
const DISTANCE_ALIAS: &str = "vector_distance";

/// Documents written per pipeline round trip.
const LOAD_BATCH_SIZE: usize = 500;

/// [`VectorStore`] backed by a Redis Stack server.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    url: String,
}

impl RedisStore {
    /// Connect to `url` (e.g., "redis://localhost:6379/0").
    ///
    /// Fails immediately if the server is unreachable; there is no retry.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| OptimizeError::Store(format!("invalid redis url '{}': {}", url, e)))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| OptimizeError::Store(format!("cannot connect to {}: {}", url, e)))?;

        debug!(url, "Connected to Redis");
        Ok(Self {
            conn,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn index_exists(&self, name: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let names: Vec<String> = redis::cmd("FT._LIST").query_async(&mut conn).await?;
        Ok(names.iter().any(|n| n == name))
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        let mut cmd = redis::cmd("FT.CREATE");
        cmd.arg(create_index_args(spec));

        let mut conn = self.conn.clone();
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }
}

/// Arguments of `FT.CREATE` for `spec`, index name first.
fn create_index_args(spec: &IndexSpec) -> Vec<String> {
    let key = &spec.key;
    let mut attrs: Vec<String> = vec![
        "TYPE".to_string(),
        key.vector_data_type.redis_name().to_string(),
        "DIM".to_string(),
        key.dim.to_string(),
        "DISTANCE_METRIC".to_string(),
        key.distance_metric.redis_name().to_string(),
    ];
    if let Some(graph) = key.graph {
        attrs.extend([
            "M".to_string(),
            graph.m.to_string(),
            "EF_CONSTRUCTION".to_string(),
            graph.ef_construction.to_string(),
        ]);
    }

    let mut args: Vec<String> = [
        spec.name.as_str(),
        "ON",
        "HASH",
        "PREFIX",
        "1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("{}:", spec.prefix));
    args.extend(
        [
            "SCHEMA",
            ID_FIELD,
            "TAG",
            TEXT_FIELD,
            "TEXT",
            VECTOR_FIELD,
            "VECTOR",
            key.algorithm.redis_name(),
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.push(attrs.len().to_string());
    args.extend(attrs);
    args
}

/// KNN query string for `FT.SEARCH`; HNSW indexes get `EF_RUNTIME`.
fn knn_query(spec: &IndexSpec, k: usize) -> String {
    match spec.key.algorithm {
        Algorithm::Flat => format!(
            "*=>[KNN {} @{} $vec AS {}]",
            k, VECTOR_FIELD, DISTANCE_ALIAS
        ),
        Algorithm::Hnsw => format!(
            "*=>[KNN {} @{} $vec EF_RUNTIME {} AS {}]",
            k, VECTOR_FIELD, spec.ef_runtime, DISTANCE_ALIAS
        ),
    }
}

#[async_trait]
impl VectorStore for RedisStore {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<IndexStatus> {
        let fingerprint = spec.key.fingerprint();
        let mut conn = self.conn.clone();

        let recorded: Option<String> = redis::cmd("GET")
            .arg(spec.fingerprint_key())
            .query_async(&mut conn)
            .await?;
        let exists = self.index_exists(&spec.name).await?;

        if exists && recorded.as_deref() == Some(fingerprint.as_str()) {
            debug!(index = %spec.name, key = %fingerprint, "Reusing existing index");
            return Ok(IndexStatus::Ready);
        }

        if exists {
            info!(
                index = %spec.name,
                previous = recorded.as_deref().unwrap_or("unknown"),
                key = %fingerprint,
                "Index key changed, recreating"
            );
            // Without DD the hashes stay and are overwritten on repopulation.
            let _: () = redis::cmd("FT.DROPINDEX")
                .arg(&spec.name)
                .query_async(&mut conn)
                .await?;
        } else {
            info!(index = %spec.name, key = %fingerprint, "Creating index");
        }

        self.create_index(spec).await?;

        let _: () = redis::cmd("SET")
            .arg(spec.fingerprint_key())
            .arg(&fingerprint)
            .query_async(&mut conn)
            .await?;

        Ok(IndexStatus::Created)
    }

    async fn doc_count(&self, spec: &IndexSpec) -> Result<usize> {
        let mut conn = self.conn.clone();
        let info: Value = redis::cmd("FT.INFO")
            .arg(&spec.name)
            .query_async(&mut conn)
            .await?;

        lookup(&info, "num_docs")
            .and_then(value_to_string)
            .and_then(|s| s.parse::<f64>().ok())
            .map(|n| n as usize)
            .ok_or_else(|| OptimizeError::Store("FT.INFO reply has no num_docs".to_string()))
    }

    async fn load(&self, spec: &IndexSpec, docs: Vec<IndexDocument>) -> Result<()> {
        let mut conn = self.conn.clone();

        for batch in docs.chunks(LOAD_BATCH_SIZE) {
            let mut pipe = redis::pipe();
            for doc in batch {
                pipe.cmd("HSET")
                    .arg(spec.doc_key(&doc.item_id))
                    .arg(ID_FIELD)
                    .arg(&doc.item_id)
                    .arg(TEXT_FIELD)
                    .arg(&doc.text)
                    .arg(VECTOR_FIELD)
                    .arg(doc.vector.as_slice())
                    .ignore();
            }
            let _: () = pipe.query_async(&mut conn).await?;
        }

        debug!(index = %spec.name, count = docs.len(), "Loaded documents");
        Ok(())
    }

    async fn remove_stale(&self, spec: &IndexSpec, keep: &HashSet<String>) -> Result<usize> {
        let mut conn = self.conn.clone();
        let prefix = format!("{}:", spec.prefix);
        let pattern = format!("{}*", prefix);

        let mut stale = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(LOAD_BATCH_SIZE)
                .query_async(&mut conn)
                .await?;
            stale.extend(keys.into_iter().filter(|key| {
                key.strip_prefix(&prefix)
                    .is_some_and(|id| !keep.contains(id))
            }));
            if next == 0 {
                break;
            }
            cursor = next;
        }

        for batch in stale.chunks(LOAD_BATCH_SIZE) {
            let _: () = redis::cmd("DEL").arg(batch).query_async(&mut conn).await?;
        }

        if !stale.is_empty() {
            info!(index = %spec.name, removed = stale.len(), "Removed stale documents");
        }
        Ok(stale.len())
    }

    async fn search(&self, spec: &IndexSpec, vector: &[u8], k: usize) -> Result<Vec<Hit>> {
        let query = knn_query(spec, k);

        let mut conn = self.conn.clone();
        let reply: Value = redis::cmd("FT.SEARCH")
            .arg(&spec.name)
            .arg(query)
            .arg("PARAMS")
            .arg(2)
            .arg("vec")
            .arg(vector)
            .arg("SORTBY")
            .arg(DISTANCE_ALIAS)
            .arg("ASC")
            .arg("RETURN")
            .arg(2)
            .arg(ID_FIELD)
            .arg(DISTANCE_ALIAS)
            .arg("LIMIT")
            .arg(0)
            .arg(k)
            .arg("DIALECT")
            .arg(2)
            .query_async(&mut conn)
            .await?;

        parse_search_reply(&reply)
    }

    async fn put_json(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("JSON.SET")
            .arg(key)
            .arg("$")
            .arg(serde_json::to_string(value)?)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("JSON.GET")
            .arg(key)
            .query_async(&mut conn)
            .await?;

        raw.map(|s| serde_json::from_str(&s).map_err(OptimizeError::from))
            .transpose()
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::SimpleString(s) => Some(s.clone()),
        Value::VerbatimString { text, .. } => Some(text.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Double(d) => Some(d.to_string()),
        _ => None,
    }
}

/// Find `name` in a flat key/value array or a map reply.
fn lookup<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    match value {
        Value::Array(items) => items
            .chunks_exact(2)
            .find(|pair| value_to_string(&pair[0]).as_deref() == Some(name))
            .map(|pair| &pair[1]),
        Value::Map(pairs) => pairs
            .iter()
            .find(|(k, _)| value_to_string(k).as_deref() == Some(name))
            .map(|(_, v)| v),
        _ => None,
    }
}

/// Parse `[total, key, [field, value, ...], key, [...], ...]`.
fn parse_search_reply(reply: &Value) -> Result<Vec<Hit>> {
    let Value::Array(items) = reply else {
        return Err(OptimizeError::Store(format!(
            "unexpected FT.SEARCH reply: {:?}",
            reply
        )));
    };

    let mut hits = Vec::new();
    for pair in items.get(1..).unwrap_or_default().chunks_exact(2) {
        let fields = &pair[1];
        let item_id = lookup(fields, ID_FIELD).and_then(value_to_string);
        let distance = lookup(fields, DISTANCE_ALIAS)
            .and_then(value_to_string)
            .and_then(|s| s.parse::<f64>().ok());

        match (item_id, distance) {
            (Some(item_id), Some(distance)) => hits.push(Hit { item_id, distance }),
            _ => {
                return Err(OptimizeError::Store(format!(
                    "FT.SEARCH result missing fields: {:?}",
                    pair
                )));
            }
        }
    }

    Ok(hits)
}
