//! Delta sync over `server_knowledge` cursors
//!
//! List endpoints return a `server_knowledge` value alongside the collection.
//! Sending it back as `last_knowledge_of_server` makes the service return only
//! entities created, modified or deleted since then. Deletions come back as
//! tombstones (`deleted: true`), not omissions.
//!
//! The client never stores cursors. [`DeltaCache`] is a helper for callers that
//! want to keep a local copy of a collection.

use super::constants::{SERVER_KNOWLEDGE_FIELD, SERVER_KNOWLEDGE_PARAM};
use super::error::ApiError;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Opaque, monotonically non-decreasing sync cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerKnowledge(pub u64);

impl fmt::Display for ServerKnowledge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entities that can arrive as deletion markers
pub trait Tombstoned {
    /// Stable identity used to reconcile a local cache
    fn key(&self) -> &str;
    fn is_deleted(&self) -> bool;
}

/// Result of a list call: the full collection when `since` is `None`,
/// otherwise only what changed after `since`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delta<T> {
    pub entities: Vec<T>,
    pub server_knowledge: ServerKnowledge,
    pub since: Option<ServerKnowledge>,
}

impl<T> Delta<T> {
    /// Whether this is a full listing rather than a delta
    pub fn is_full(&self) -> bool {
        self.since.is_none()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl<T: Tombstoned> Delta<T> {
    /// Entities created or updated
    pub fn changed(&self) -> impl Iterator<Item = &T> {
        self.entities.iter().filter(|e| !e.is_deleted())
    }

    /// Deletion markers
    pub fn tombstones(&self) -> impl Iterator<Item = &T> {
        self.entities.iter().filter(|e| e.is_deleted())
    }
}

/// Query parameters for a list request with an optional cursor
pub fn cursor_query(since: Option<ServerKnowledge>) -> Vec<(String, String)> {
    since
        .map(|cursor| vec![(SERVER_KNOWLEDGE_PARAM.to_string(), cursor.to_string())])
        .unwrap_or_default()
}

/// The service wraps payloads in `{"data": {...}}`; accept both wrapped and bare bodies
fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if matches!(map.get("data"), Some(Value::Object(_))) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn take_field(body: &mut Value, key: &str) -> Result<Value, ApiError> {
    body.as_object_mut()
        .and_then(|map| map.remove(key))
        .ok_or_else(|| ApiError::schema_mismatch(format!("response has no `{}` field", key)))
}

/// Decode a list response shaped `{ <key>: [...], server_knowledge: <int> }`
pub fn decode_delta<T: DeserializeOwned>(
    body: Value,
    key: &str,
    since: Option<ServerKnowledge>,
) -> Result<Delta<T>, ApiError> {
    let mut body = unwrap_envelope(body);

    let server_knowledge: ServerKnowledge = serde_json::from_value(take_field(&mut body, SERVER_KNOWLEDGE_FIELD)?)
        .map_err(|e| ApiError::schema_mismatch(format!("invalid `{}`: {}", SERVER_KNOWLEDGE_FIELD, e)))?;

    let entities: Vec<T> = serde_json::from_value(take_field(&mut body, key)?)
        .map_err(|e| ApiError::schema_mismatch(format!("invalid `{}` list: {}", key, e)))?;

    if let Some(cursor) = since {
        if server_knowledge < cursor {
            // Passed through untouched; the service owns cursor semantics
            warn!(
                "Server returned {} = {} below the supplied cursor {} for `{}`",
                SERVER_KNOWLEDGE_FIELD, server_knowledge, cursor, key
            );
        }
    }

    debug!(
        "Decoded {} `{}` entities (since {:?}, server_knowledge {})",
        entities.len(),
        key,
        since,
        server_knowledge
    );

    Ok(Delta {
        entities,
        server_knowledge,
        since,
    })
}

/// Decode a list response that carries no cursor, e.g. `{ "budgets": [...] }`
pub fn decode_list<T: DeserializeOwned>(body: Value, key: &str) -> Result<Vec<T>, ApiError> {
    let mut body = unwrap_envelope(body);
    serde_json::from_value(take_field(&mut body, key)?)
        .map_err(|e| ApiError::schema_mismatch(format!("invalid `{}` list: {}", key, e)))
}

/// Decode a single-entity response shaped `{ <key>: {...} }`
pub fn decode_entity<T: DeserializeOwned>(body: Value, key: &str) -> Result<T, ApiError> {
    let mut body = unwrap_envelope(body);
    serde_json::from_value(take_field(&mut body, key)?)
        .map_err(|e| ApiError::schema_mismatch(format!("invalid `{}`: {}", key, e)))
}

/// What [`DeltaCache::apply`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyOutcome {
    pub upserted: usize,
    pub removed: usize,
    /// The delta was older than the cache and was ignored
    pub stale: bool,
}

/// Caller-side cache of one collection, kept current by applying deltas
#[derive(Debug, Clone)]
pub struct DeltaCache<T> {
    entries: HashMap<String, T>,
    cursor: Option<ServerKnowledge>,
}

impl<T> Default for DeltaCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            cursor: None,
        }
    }
}

impl<T: Tombstoned> DeltaCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor to send with the next list call
    pub fn cursor(&self) -> Option<ServerKnowledge> {
        self.cursor
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    /// Apply a listing. A full listing replaces the cache; a delta upserts
    /// changed entities and drops tombstoned ones.
    pub fn apply(&mut self, delta: Delta<T>) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();

        if let Some(current) = self.cursor.filter(|_| !delta.is_full()) {
            if delta.server_knowledge < current {
                debug!(
                    "Ignoring stale delta at {} (cache is at {})",
                    delta.server_knowledge, current
                );
                outcome.stale = true;
                return outcome;
            }
        }

        if delta.is_full() {
            self.entries.clear();
        }

        for entity in delta.entities {
            if entity.is_deleted() {
                if self.entries.remove(entity.key()).is_some() {
                    outcome.removed += 1;
                }
            } else {
                self.entries.insert(entity.key().to_string(), entity);
                outcome.upserted += 1;
            }
        }

        self.cursor = Some(delta.server_knowledge);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ApiErrorKind;
    use crate::api::models::Record;
    use serde_json::json;

    fn record(id: &str, name: &str, deleted: bool) -> Record {
        serde_json::from_value(json!({"id": id, "name": name, "deleted": deleted})).unwrap()
    }

    fn delta(entities: Vec<Record>, knowledge: u64, since: Option<u64>) -> Delta<Record> {
        Delta {
            entities,
            server_knowledge: ServerKnowledge(knowledge),
            since: since.map(ServerKnowledge),
        }
    }

    #[test]
    fn test_cursor_query() {
        assert!(cursor_query(None).is_empty());
        assert_eq!(
            cursor_query(Some(ServerKnowledge(42))),
            vec![("last_knowledge_of_server".to_string(), "42".to_string())]
        );
    }

    #[test]
    fn test_decode_wrapped_delta() {
        let body = json!({
            "data": {
                "payees": [
                    {"id": "p1", "name": "Grocer", "deleted": false},
                    {"id": "p2", "name": "Old", "deleted": true}
                ],
                "server_knowledge": 105
            }
        });

        let delta: Delta<Record> = decode_delta(body, "payees", Some(ServerKnowledge(100))).unwrap();
        assert_eq!(delta.server_knowledge, ServerKnowledge(105));
        assert!(!delta.is_full());
        assert_eq!(delta.changed().count(), 1);
        assert_eq!(delta.tombstones().next().map(|r| r.id.as_str()), Some("p2"));
    }

    #[test]
    fn test_decode_bare_delta() {
        let body = json!({"accounts": [], "server_knowledge": 7});
        let delta: Delta<Record> = decode_delta(body, "accounts", None).unwrap();

        assert!(delta.is_full());
        assert!(delta.is_empty());
        assert_eq!(delta.server_knowledge, ServerKnowledge(7));
    }

    #[test]
    fn test_decode_missing_fields_is_validation_error() {
        let no_cursor = json!({"data": {"payees": []}});
        let err = decode_delta::<Record>(no_cursor, "payees", None).unwrap_err();
        assert_eq!(err.kind(), ApiErrorKind::ValidationError);

        let wrong_key = json!({"data": {"accounts": [], "server_knowledge": 1}});
        let err = decode_delta::<Record>(wrong_key, "payees", None).unwrap_err();
        assert_eq!(err.kind(), ApiErrorKind::ValidationError);

        let negative = json!({"payees": [], "server_knowledge": -1});
        let err = decode_delta::<Record>(negative, "payees", None).unwrap_err();
        assert_eq!(err.kind(), ApiErrorKind::ValidationError);
    }

    #[test]
    fn test_decode_entity_and_list() {
        let account: Record =
            decode_entity(json!({"data": {"account": {"id": "a1", "name": "Cash"}}}), "account").unwrap();
        assert_eq!(account.name(), Some("Cash"));

        let budgets: Vec<Record> =
            decode_list(json!({"data": {"budgets": [{"id": "b1"}, {"id": "b2"}]}}), "budgets").unwrap();
        assert_eq!(budgets.len(), 2);
    }

    #[test]
    fn test_cache_full_then_delta() {
        let mut cache = DeltaCache::new();

        let outcome = cache.apply(delta(
            vec![
                record("a", "A", false),
                record("b", "B", false),
                record("z", "Gone long ago", true),
            ],
            10,
            None,
        ));
        assert_eq!(outcome.upserted, 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.cursor(), Some(ServerKnowledge(10)));

        let outcome = cache.apply(delta(
            vec![record("a", "A renamed", false), record("b", "B", true), record("c", "C", false)],
            12,
            Some(10),
        ));
        assert_eq!(outcome, ApplyOutcome { upserted: 2, removed: 1, stale: false });
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").and_then(|r| r.name()), Some("A renamed"));
        assert!(cache.get("b").is_none());
        assert_eq!(cache.cursor(), Some(ServerKnowledge(12)));
    }

    #[test]
    fn test_cache_ignores_stale_delta() {
        let mut cache = DeltaCache::new();
        cache.apply(delta(vec![record("a", "A", false)], 20, None));

        let outcome = cache.apply(delta(vec![record("a", "A", true)], 15, Some(10)));
        assert!(outcome.stale);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.cursor(), Some(ServerKnowledge(20)));
    }

    #[test]
    fn test_full_listing_replaces_cache() {
        let mut cache = DeltaCache::new();
        cache.apply(delta(vec![record("a", "A", false)], 1, None));
        cache.apply(delta(vec![record("b", "B", false)], 2, None));

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }
}
