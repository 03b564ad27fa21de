//! JSON encoding of bulk documents.
//!
//! Record sets travel under `<set>_set` keys, deletions under
//! `deleted_sets` and the cursor under `last_synced`:
//!
//! ```json
//! {
//!   "host_set": [{"id": 4, "label": "web", "group": {"local_id": "9b2e..."}}],
//!   "group_set": [{"local_id": "9b2e...", "label": "prod"}],
//!   "deleted_sets": {"tag_set": [7]},
//!   "last_synced": "2024-01-01T00:00:00"
//! }
//! ```
//!
//! Remote ids are plain numbers. A record the remote side has never seen
//! carries `local_id` instead of its id field, and foreign keys pointing at
//! it are written as `{"local_id": ...}` objects.

use crate::bulk::{BulkAck, BulkSnapshot, BulkUpload, DeletedSets, IdAssignment};
use crate::error::{SyncError, SyncResult};
use serde_json::{json, Map, Number, Value as Json};
use sshconf_core::{Cardinality, RawRecord, Record, RecordId, SetSchema, Value};
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

const SET_SUFFIX: &str = "_set";
const DELETED_KEY: &str = "deleted_sets";
const CURSOR_KEY: &str = "last_synced";
const LOCAL_ID_KEY: &str = "local_id";

/// Returns the document key for a set name.
#[must_use]
pub fn set_key(set_name: &str) -> String {
    format!("{set_name}{SET_SUFFIX}")
}

/// Encodes an upload as a JSON document.
///
/// # Errors
///
/// Returns [`SyncError::Protocol`] if serialization fails.
pub fn encode_upload(upload: &BulkUpload) -> SyncResult<Vec<u8>> {
    let mut doc = Map::new();
    for (set_name, records) in &upload.sets {
        let items = records.iter().map(encode_record).collect();
        doc.insert(set_key(set_name), Json::Array(items));
    }
    doc.insert(DELETED_KEY.into(), encode_deleted(&upload.deleted));
    doc.insert(CURSOR_KEY.into(), json!(upload.last_synced));
    serde_json::to_vec(&Json::Object(doc)).map_err(|e| SyncError::protocol(e.to_string()))
}

/// Decodes a snapshot document against the registered schemas.
///
/// Sets not in `schemas` are skipped with a warning.
///
/// # Errors
///
/// Returns [`SyncError::Protocol`] for malformed JSON or records.
pub fn decode_snapshot(body: &[u8], schemas: &[&'static SetSchema]) -> SyncResult<BulkSnapshot> {
    let doc = parse_object(body)?;
    let mut snapshot = BulkSnapshot {
        last_synced: decode_cursor(&doc)?,
        deleted: decode_deleted(doc.get(DELETED_KEY))?,
        ..BulkSnapshot::default()
    };
    for (key, items) in &doc {
        let Some(set_name) = key.strip_suffix(SET_SUFFIX) else {
            continue;
        };
        let Some(schema) = schemas.iter().find(|s| s.set_name == set_name) else {
            warn!(set = set_name, "skipping unknown set in snapshot");
            continue;
        };
        let items = items
            .as_array()
            .ok_or_else(|| SyncError::protocol(format!("{key} is not a list")))?;
        let records = items
            .iter()
            .map(|item| decode_record(schema, item))
            .collect::<SyncResult<Vec<_>>>()?;
        snapshot.sets.insert(set_name.to_string(), records);
    }
    Ok(snapshot)
}

/// Decodes an acknowledgement document.
///
/// Each `<set>_set` entry lists `{"id": n, "local_id": "..."}` pairs; an
/// entry without `local_id` acknowledges a record sent under its remote id.
///
/// # Errors
///
/// Returns [`SyncError::Protocol`] for malformed JSON.
pub fn decode_ack(body: &[u8]) -> SyncResult<BulkAck> {
    let doc = parse_object(body)?;
    let mut ack = BulkAck {
        last_synced: decode_cursor(&doc)?,
        deleted: decode_deleted(doc.get(DELETED_KEY))?,
        ..BulkAck::default()
    };
    for (key, items) in &doc {
        let Some(set_name) = key.strip_suffix(SET_SUFFIX) else {
            continue;
        };
        let items = items
            .as_array()
            .ok_or_else(|| SyncError::protocol(format!("{key} is not a list")))?;
        for item in items {
            let assigned = item
                .get("id")
                .and_then(Json::as_u64)
                .map(RecordId::Remote)
                .ok_or_else(|| SyncError::protocol(format!("{key} entry without an id")))?;
            let sent = match item.get(LOCAL_ID_KEY) {
                Some(local) => RecordId::Local(parse_uuid(local)?),
                None => assigned,
            };
            ack.accepted.push(IdAssignment {
                set_name: set_name.to_string(),
                sent,
                assigned,
            });
        }
    }
    Ok(ack)
}

/// Encodes a snapshot document, as the remote side does.
///
/// # Errors
///
/// Returns [`SyncError::Protocol`] if serialization fails.
pub fn encode_snapshot(snapshot: &BulkSnapshot) -> SyncResult<Vec<u8>> {
    let mut doc = Map::new();
    for (set_name, records) in &snapshot.sets {
        let items = records.iter().map(encode_record).collect();
        doc.insert(set_key(set_name), Json::Array(items));
    }
    doc.insert(DELETED_KEY.into(), encode_deleted(&snapshot.deleted));
    doc.insert(CURSOR_KEY.into(), json!(snapshot.last_synced));
    serde_json::to_vec(&Json::Object(doc)).map_err(|e| SyncError::protocol(e.to_string()))
}

/// Decodes an upload document, as the remote side does.
///
/// # Errors
///
/// Returns [`SyncError::Protocol`] for malformed JSON, records, or sets not
/// in `schemas`.
pub fn decode_upload(body: &[u8], schemas: &[&'static SetSchema]) -> SyncResult<BulkUpload> {
    let doc = parse_object(body)?;
    let mut upload = BulkUpload {
        last_synced: decode_cursor(&doc)?,
        deleted: decode_deleted(doc.get(DELETED_KEY))?,
        ..BulkUpload::default()
    };
    for (key, items) in &doc {
        let Some(set_name) = key.strip_suffix(SET_SUFFIX) else {
            continue;
        };
        let schema = schemas
            .iter()
            .find(|s| s.set_name == set_name)
            .ok_or_else(|| SyncError::protocol(format!("unknown set {set_name}")))?;
        let items = items
            .as_array()
            .ok_or_else(|| SyncError::protocol(format!("{key} is not a list")))?;
        let records = items
            .iter()
            .map(|item| decode_record(schema, item))
            .collect::<SyncResult<Vec<_>>>()?;
        upload.sets.insert(set_name.to_string(), records);
    }
    Ok(upload)
}

/// Encodes an acknowledgement document, as the remote side does.
///
/// # Errors
///
/// Returns [`SyncError::Protocol`] if serialization fails or an assigned id
/// is not a remote id.
pub fn encode_ack(ack: &BulkAck) -> SyncResult<Vec<u8>> {
    let mut sets: BTreeMap<String, Vec<Json>> = BTreeMap::new();
    for assignment in &ack.accepted {
        let assigned = assignment.assigned.remote().ok_or_else(|| {
            SyncError::protocol(format!("{} assigned a local id", assignment.set_name))
        })?;
        let mut entry = Map::new();
        entry.insert("id".into(), json!(assigned));
        if let RecordId::Local(uuid) = assignment.sent {
            entry.insert(LOCAL_ID_KEY.into(), json!(uuid.to_string()));
        }
        sets.entry(set_key(&assignment.set_name))
            .or_default()
            .push(Json::Object(entry));
    }
    let mut doc: Map<String, Json> = sets
        .into_iter()
        .map(|(key, items)| (key, Json::Array(items)))
        .collect();
    doc.insert(DELETED_KEY.into(), encode_deleted(&ack.deleted));
    doc.insert(CURSOR_KEY.into(), json!(ack.last_synced));
    serde_json::to_vec(&Json::Object(doc)).map_err(|e| SyncError::protocol(e.to_string()))
}

/// Encodes one record, relations written as ids.
#[must_use]
pub fn encode_record(record: &Record) -> Json {
    let id_name = record.schema().id_name;
    let mut object = Map::new();
    for (field, value) in record.raw() {
        if field == id_name {
            match value.as_id() {
                Some(RecordId::Remote(id)) => {
                    object.insert(field.clone(), json!(id));
                }
                Some(RecordId::Local(uuid)) => {
                    object.insert(LOCAL_ID_KEY.into(), json!(uuid.to_string()));
                }
                None => {}
            }
            continue;
        }
        object.insert(field.clone(), encode_value(value));
    }
    Json::Object(object)
}

/// Decodes one record of `schema`.
///
/// # Errors
///
/// Returns [`SyncError::Protocol`] if the item is not an object or holds a
/// value with no local representation.
pub fn decode_record(schema: &'static SetSchema, item: &Json) -> SyncResult<Record> {
    let object = item
        .as_object()
        .ok_or_else(|| SyncError::protocol(format!("{} record is not an object", schema.set_name)))?;
    let mut raw = RawRecord::new();
    for (field, value) in object {
        if field == LOCAL_ID_KEY {
            if !object.contains_key(schema.id_name) {
                raw.insert(schema.id_name, RecordId::Local(parse_uuid(value)?));
            }
            continue;
        }
        let decoded = if field == schema.id_name {
            decode_id_or_null(value)?
        } else if let Some(relation) = schema.relation(field) {
            match relation.cardinality {
                Cardinality::One => decode_id_or_null(value)?,
                Cardinality::Many => match value {
                    Json::Null => Value::List(Vec::new()),
                    Json::Array(items) => Value::List(
                        items
                            .iter()
                            .map(|item| decode_id(item).map(Value::Id))
                            .collect::<SyncResult<_>>()?,
                    ),
                    other => {
                        return Err(SyncError::protocol(format!(
                            "{}.{field} expects a list of ids, got {other}",
                            schema.set_name
                        )))
                    }
                },
            }
        } else {
            decode_plain(value).ok_or_else(|| {
                SyncError::protocol(format!(
                    "{}.{field} holds an unsupported value",
                    schema.set_name
                ))
            })?
        };
        raw.insert(field.clone(), decoded);
    }
    Ok(Record::from_raw(schema, raw))
}

fn encode_value(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Integer(n) => Json::Number(Number::from(*n)),
        Value::Text(s) => Json::String(s.clone()),
        Value::Id(id) => encode_id(*id),
        Value::List(items) => Json::Array(items.iter().map(encode_value).collect()),
    }
}

fn encode_id(id: RecordId) -> Json {
    match id {
        RecordId::Remote(id) => json!(id),
        RecordId::Local(uuid) => json!({ LOCAL_ID_KEY: uuid.to_string() }),
    }
}

fn encode_deleted(deleted: &DeletedSets) -> Json {
    let object = deleted
        .iter()
        .map(|(set_name, ids)| {
            let ids = ids.iter().copied().map(encode_id).collect();
            (set_key(set_name), Json::Array(ids))
        })
        .collect();
    Json::Object(object)
}

fn decode_deleted(value: Option<&Json>) -> SyncResult<DeletedSets> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Ok(DeletedSets::new());
    };
    let object = value
        .as_object()
        .ok_or_else(|| SyncError::protocol(format!("{DELETED_KEY} is not an object")))?;
    let mut deleted = BTreeMap::new();
    for (key, ids) in object {
        let set_name = key.strip_suffix(SET_SUFFIX).unwrap_or(key);
        let ids = ids
            .as_array()
            .ok_or_else(|| SyncError::protocol(format!("{DELETED_KEY}.{key} is not a list")))?
            .iter()
            .map(decode_id)
            .collect::<SyncResult<Vec<_>>>()?;
        deleted.insert(set_name.to_string(), ids);
    }
    Ok(deleted)
}

fn decode_cursor(doc: &Map<String, Json>) -> SyncResult<Option<String>> {
    match doc.get(CURSOR_KEY) {
        None | Some(Json::Null) => Ok(None),
        Some(Json::String(s)) => Ok(Some(s.clone())),
        Some(Json::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(SyncError::protocol(format!(
            "{CURSOR_KEY} has unexpected value {other}"
        ))),
    }
}

fn decode_id_or_null(value: &Json) -> SyncResult<Value> {
    if value.is_null() {
        Ok(Value::Null)
    } else {
        decode_id(value).map(Value::Id)
    }
}

fn decode_id(value: &Json) -> SyncResult<RecordId> {
    match value {
        Json::Number(n) => n
            .as_u64()
            .map(RecordId::Remote)
            .ok_or_else(|| SyncError::protocol(format!("invalid id {n}"))),
        Json::Object(object) => {
            if let Some(id) = object.get("id").filter(|v| !v.is_null()) {
                decode_id(id)
            } else if let Some(local) = object.get(LOCAL_ID_KEY) {
                parse_uuid(local).map(RecordId::Local)
            } else {
                Err(SyncError::protocol("reference without id or local_id"))
            }
        }
        other => Err(SyncError::protocol(format!("invalid id {other}"))),
    }
}

fn decode_plain(value: &Json) -> Option<Value> {
    Some(match value {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(n) => Value::Integer(n),
            None => Value::Text(n.to_string()),
        },
        Json::String(s) => Value::Text(s.clone()),
        Json::Array(items) => Value::List(items.iter().map(decode_plain).collect::<Option<_>>()?),
        Json::Object(_) => return None,
    })
}

fn parse_uuid(value: &Json) -> SyncResult<Uuid> {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| SyncError::protocol(format!("invalid {LOCAL_ID_KEY} {value}")))
}

fn parse_object(body: &[u8]) -> SyncResult<Map<String, Json>> {
    match serde_json::from_slice(body) {
        Ok(Json::Object(doc)) => Ok(doc),
        Ok(_) => Err(SyncError::protocol("bulk document is not an object")),
        Err(e) => Err(SyncError::protocol(format!("invalid bulk document: {e}"))),
    }
}
