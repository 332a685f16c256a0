//! Schemaless records, as stored in both data sources

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::config::PLACEHOLDER_IDS;
use crate::error::StoreError;

/// Name of the identifier member in a serialized record
pub const ID_FIELD: &str = "id";
/// Set once, when a record is created
pub const CREATED_AT: &str = "createdAt";
/// Set on every write
pub const UPDATED_AT: &str = "updatedAt";

/// The fields of a record (everything but its identifier)
pub type Fields = Map<String, Value>;


/// A non-empty, trimmed, non-placeholder record identifier.
///
/// It is either assigned by the remote store or minted by the local cache (see [`RecordId::random`]),
/// and a record keeps it for its whole life.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    content: String,
}

impl RecordId {
    /// Normalize a raw identifier. Returns `None` for empty or placeholder values (`"undefined"`, `"null"`)
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if PLACEHOLDER_IDS.contains(&trimmed) {
            return None;
        }
        Some(Self { content: trimmed.to_string() })
    }

    /// Mint a new identifier for a record created in the local cache.
    ///
    /// This is the creation time (milliseconds, base 36) followed by a random suffix, so that two records created
    /// during the same millisecond still get different identifiers.
    pub fn random() -> Self {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        let random = uuid::Uuid::new_v4().to_simple().to_string();
        Self { content: format!("{}-{}", to_base36(millis), &random[..10]) }
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

impl FromStr for RecordId {
    type Err = StoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| StoreError::InvalidId(s.to_string()))
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", self.content)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.content
    }
}

/// Used to support serde
impl Serialize for RecordId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.content)
    }
}
/// Used to support serde
impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<RecordId, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        RecordId::parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid record identifier {:?}", raw)))
    }
}


/// Extract the identifier of a raw JSON record.
///
/// Numbers are accepted and converted to their decimal representation. Anything else (missing member,
/// placeholder string, other JSON types) gives `None`
pub fn id_of(value: &Value) -> Option<RecordId> {
    match value.get(ID_FIELD)? {
        Value::String(s) => RecordId::parse(s),
        Value::Number(n) => RecordId::parse(&n.to_string()),
        _ => None,
    }
}


/// A record: an identifier and a map of fields
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    id: RecordId,
    fields: Fields,
}

impl Record {
    /// Build a record. Any `id` member of `fields` is dropped, `id` is the only source of truth for identity
    pub fn new(id: RecordId, mut fields: Fields) -> Self {
        strip_id(&mut fields);
        Self { id, fields }
    }

    /// Parse a raw JSON record. Returns `None` when it is not an object or has no valid identifier
    pub fn from_value(value: Value) -> Option<Self> {
        let id = id_of(&value)?;
        match value {
            Value::Object(fields) => Some(Self::new(id, fields)),
            _ => None,
        }
    }

    /// The JSON object form of this record, identifier included
    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        object.insert(ID_FIELD.to_string(), Value::String(self.id.to_string()));
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }

    pub fn id(&self) -> &RecordId          { &self.id }
    pub fn fields(&self) -> &Fields        { &self.fields }
    pub fn get(&self, key: &str) -> Option<&Value> { self.fields.get(key) }
    pub fn get_str(&self, key: &str) -> Option<&str> { self.fields.get(key).and_then(|v| v.as_str()) }
    pub fn created_at(&self) -> Option<&str> { self.get_str(CREATED_AT) }
    pub fn updated_at(&self) -> Option<&str> { self.get_str(UPDATED_AT) }

    pub fn into_parts(self) -> (RecordId, Fields) {
        (self.id, self.fields)
    }

    /// Shallow merge: members of `patch` overwrite or extend this record, other fields are untouched
    pub fn merge(&mut self, patch: &Fields) {
        for (key, value) in patch {
            if key == ID_FIELD {
                continue;
            }
            self.fields.insert(key.clone(), value.clone());
        }
    }
}

/// Used to support serde
impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}
/// Used to support serde
impl<'de> Deserialize<'de> for Record {
    fn deserialize<D>(deserializer: D) -> Result<Record, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Record::from_value(value).ok_or_else(|| serde::de::Error::custom("record without a valid identifier"))
    }
}


/// A typed view of the records of one collection
pub trait Document: Serialize + DeserializeOwned {
    /// The collection these documents live in
    const COLLECTION: &'static str;

    /// The identifier of this document, if it has been saved already
    fn id(&self) -> Option<&RecordId>;

    fn from_record(record: &Record) -> Result<Self, StoreError> {
        Ok(serde_json::from_value(record.to_value())?)
    }

    /// The fields to save (identifier excluded)
    fn to_fields(&self) -> Result<Fields, StoreError> {
        match serde_json::to_value(self)? {
            Value::Object(mut fields) => {
                strip_id(&mut fields);
                Ok(fields)
            },
            other => Err(StoreError::InvalidResponse(format!("a {} document must serialize to an object, not {}", Self::COLLECTION, other))),
        }
    }
}


/// Current time, in the format used for `createdAt` and `updatedAt`
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Remove any embedded identifier from a payload
pub fn strip_id(fields: &mut Fields) {
    fields.remove(ID_FIELD);
}

/// Timestamps of a record that is being created
pub fn stamp_created(fields: &mut Fields, now: &str) {
    fields.insert(CREATED_AT.to_string(), Value::String(now.to_string()));
    fields.insert(UPDATED_AT.to_string(), Value::String(now.to_string()));
}

/// Timestamps of a record that is being updated. `createdAt` is never overwritten
pub fn stamp_updated(fields: &mut Fields, now: &str) {
    fields.remove(CREATED_AT);
    fields.insert(UPDATED_AT.to_string(), Value::String(now.to_string()));
}

/// Build a `Fields` map out of a JSON object literal. Non-objects give an empty map
pub fn fields_from(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn placeholders_are_not_identifiers() {
        assert_eq!(RecordId::parse(""), None);
        assert_eq!(RecordId::parse("   "), None);
        assert_eq!(RecordId::parse("undefined"), None);
        assert_eq!(RecordId::parse(" null "), None);
        assert_eq!(RecordId::parse(" 42 ").unwrap().as_str(), "42");
        assert!("undefined".parse::<RecordId>().is_err());
    }

    #[test]
    fn minted_ids_are_unique() {
        let ids: std::collections::HashSet<RecordId> = (0..500).map(|_| RecordId::random()).collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn numeric_ids_are_accepted() {
        let rec = Record::from_value(json!({"id": 42, "name": "Dr. House"})).unwrap();
        assert_eq!(rec.id().as_str(), "42");
        assert_eq!(rec.get_str("name"), Some("Dr. House"));
        assert!(rec.get("id").is_none());
    }

    #[test]
    fn invalid_records_are_rejected() {
        assert!(Record::from_value(json!({"name": "no id"})).is_none());
        assert!(Record::from_value(json!({"id": "undefined"})).is_none());
        assert!(Record::from_value(json!({"id": ["a"]})).is_none());
        assert!(Record::from_value(json!("just a string")).is_none());
        assert!(serde_json::from_value::<Record>(json!({"id": "null"})).is_err());
    }

    #[test]
    fn merge_keeps_untouched_fields() {
        let mut rec = Record::from_value(json!({"id": "a", "name": "Ana", "phone": "123"})).unwrap();
        rec.merge(&fields_from(json!({"phone": "456", "id": "b", "email": "ana@example.org"})));
        assert_eq!(rec.id().as_str(), "a");
        assert_eq!(rec.to_value(), json!({"id": "a", "name": "Ana", "phone": "456", "email": "ana@example.org"}));
    }

    #[test]
    fn update_stamp_never_touches_created_at() {
        let mut fields = fields_from(json!({"createdAt": "1999-01-01T00:00:00.000Z", "name": "x"}));
        stamp_updated(&mut fields, "2024-01-01T00:00:00.000Z");
        assert!(fields.get(CREATED_AT).is_none());
        assert_eq!(fields.get(UPDATED_AT), Some(&json!("2024-01-01T00:00:00.000Z")));
    }
}
