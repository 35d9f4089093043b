//! Conversion of raw bus payloads into canonical event records
//!
//! MinIO and other S3-compatible stores publish notifications as an envelope
//! carrying a top-level `EventName` and `Key` plus an S3 `Records` array.
//! Each entry of `Records` becomes one [`CanonicalEventRecord`].

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::error::{Result, WatcherError};
use crate::watcher::logging::ComponentLog;

/// Normalized view of one S3 event record.
///
/// Filters run against `event_name`, `bucket` and `object_key`. The record
/// JSON is kept alongside, with schema keys in camelCase, and is what a job
/// receives on stdin.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEventRecord {
    event_name: String,
    bucket: String,
    object_key: String,
    raw: JsonValue,
}

impl CanonicalEventRecord {
    /// Build a record from a raw S3 record object.
    ///
    /// PascalCase schema keys (`EventName`, `S3.Bucket.Name`, ...) are
    /// rewritten to their camelCase form, so jobs always see the standard
    /// S3 record layout. User metadata and request/response maps keep their
    /// keys as published.
    ///
    /// # Errors
    ///
    /// Returns `WatcherError::Malformed` if `raw` is not a JSON object.
    pub fn from_raw(mut raw: JsonValue) -> Result<Self> {
        if !raw.is_object() {
            return Err(WatcherError::Malformed(
                "event record is not a JSON object".to_string(),
            ));
        }

        normalize_keys(&mut raw);

        let view: RecordView = serde_json::from_value(raw.clone())?;

        Ok(Self {
            event_name: view.event_name,
            bucket: view.s3.bucket.name,
            object_key: view.s3.object.key,
            raw,
        })
    }

    /// S3 event name, e.g. `s3:ObjectCreated:Put`.
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// Bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key as published by the store.
    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    /// Record JSON as forwarded to jobs.
    pub fn raw(&self) -> &JsonValue {
        &self.raw
    }

    /// UTF-8 JSON encoding handed to job processes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl Serialize for CanonicalEventRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

/// Record sections whose keys belong to the S3 notification schema.
const SCHEMA_SECTIONS: &[&[&str]] = &[
    &[],
    &["userIdentity"],
    &["source"],
    &["s3"],
    &["s3", "bucket"],
    &["s3", "bucket", "ownerIdentity"],
    &["s3", "object"],
];

fn normalize_keys(raw: &mut JsonValue) {
    for path in SCHEMA_SECTIONS {
        let mut section = Some(&mut *raw);
        for key in path.iter() {
            section = section.and_then(|value| value.get_mut(*key));
        }

        if let Some(map) = section.and_then(JsonValue::as_object_mut) {
            camel_case_keys(map);
        }
    }
}

fn camel_case_keys(map: &mut serde_json::Map<String, JsonValue>) {
    let renames: Vec<(String, String)> = map
        .keys()
        .filter_map(|key| {
            let camel = lower_first(key);
            (camel != *key && !map.contains_key(&camel)).then(|| (key.clone(), camel))
        })
        .collect();

    for (from, to) in renames {
        if let Some(value) = map.remove(&from) {
            map.insert(to, value);
        }
    }
}

fn lower_first(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Deserialize)]
struct NotificationEnvelope {
    #[serde(rename = "EventName", default)]
    event_name: String,

    #[serde(rename = "Key", default)]
    key: String,

    #[serde(rename = "Records", default)]
    records: Vec<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct RecordView {
    #[serde(rename = "eventName", default)]
    event_name: String,

    #[serde(default)]
    s3: S3Entity,
}

#[derive(Debug, Default, Deserialize)]
struct S3Entity {
    #[serde(default)]
    bucket: BucketEntity,

    #[serde(default)]
    object: ObjectEntity,
}

#[derive(Debug, Default, Deserialize)]
struct BucketEntity {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectEntity {
    #[serde(default)]
    key: String,
}

/// Parses notification payloads into canonical records.
#[derive(Debug, Clone)]
pub struct EventConverter {
    log: ComponentLog,
}

impl EventConverter {
    /// Create a converter logging under `log`.
    pub fn new(log: ComponentLog) -> Self {
        Self { log }
    }

    /// Convert one raw payload into zero or more records.
    ///
    /// # Errors
    ///
    /// Returns `WatcherError::Malformed` if the payload is not valid JSON,
    /// if `EventName` or `Key` is empty or missing, or if any record is not
    /// a JSON object.
    ///
    /// # Examples
    ///
    /// ```
    /// use s3_data_watcher::watcher::event::EventConverter;
    /// use s3_data_watcher::watcher::logging::ComponentLog;
    ///
    /// let converter = EventConverter::new(ComponentLog::new("converter"));
    /// let payload = br#"{
    ///     "EventName": "s3:ObjectCreated:Put",
    ///     "Key": "data-prod/x/y.txt",
    ///     "Records": [{
    ///         "eventName": "s3:ObjectCreated:Put",
    ///         "s3": {"bucket": {"name": "data-prod"}, "object": {"key": "x/y.txt"}}
    ///     }]
    /// }"#;
    ///
    /// let records = converter.convert(payload).unwrap();
    /// assert_eq!(records.len(), 1);
    /// assert_eq!(records[0].bucket(), "data-prod");
    /// ```
    pub fn convert(&self, payload: &[u8]) -> Result<Vec<CanonicalEventRecord>> {
        let span = self.log.span("convert");
        let _enter = span.enter();

        let envelope: NotificationEnvelope = serde_json::from_slice(payload)?;

        if envelope.event_name.is_empty() {
            return Err(WatcherError::Malformed("empty event name".to_string()));
        }

        if envelope.key.is_empty() {
            return Err(WatcherError::Malformed("empty key".to_string()));
        }

        let records = envelope
            .records
            .into_iter()
            .map(CanonicalEventRecord::from_raw)
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            event_name = %envelope.event_name,
            key = %envelope.key,
            records = records.len(),
            "Converted notification"
        );

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn converter() -> EventConverter {
        EventConverter::new(ComponentLog::new("converter"))
    }

    fn minio_payload() -> String {
        json!({
            "EventName": "s3:ObjectCreated:Put",
            "Key": "data-prod/x/y.txt",
            "Records": [
                {
                    "eventVersion": "2.0",
                    "eventSource": "minio:s3",
                    "eventName": "s3:ObjectCreated:Put",
                    "s3": {
                        "s3SchemaVersion": "1.0",
                        "bucket": {"name": "data-prod", "arn": "arn:aws:s3:::data-prod"},
                        "object": {"key": "x/y.txt", "size": 42, "eTag": "abc"}
                    }
                },
                {
                    "eventName": "s3:ObjectRemoved:Delete",
                    "s3": {
                        "bucket": {"name": "data-prod"},
                        "object": {"key": "x/z.txt"}
                    }
                }
            ]
        })
        .to_string()
    }

    #[test]
    fn test_convert_multiple_records() {
        let records = converter().convert(minio_payload().as_bytes()).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].event_name(), "s3:ObjectCreated:Put");
        assert_eq!(records[0].bucket(), "data-prod");
        assert_eq!(records[0].object_key(), "x/y.txt");

        assert_eq!(records[1].event_name(), "s3:ObjectRemoved:Delete");
        assert_eq!(records[1].object_key(), "x/z.txt");
    }

    #[test]
    fn test_convert_keeps_raw_record() {
        let records = converter().convert(minio_payload().as_bytes()).unwrap();
        assert_eq!(records[0].raw()["s3"]["object"]["size"], json!(42));

        let encoded: JsonValue = serde_json::from_slice(&records[0].to_json().unwrap()).unwrap();
        assert_eq!(&encoded, records[0].raw());
    }

    #[test]
    fn test_convert_accepts_pascal_case_records() {
        let payload = json!({
            "EventName": "s3:ObjectCreated:Copy",
            "Key": "b/k",
            "Records": [{
                "EventName": "s3:ObjectCreated:Copy",
                "S3": {"Bucket": {"Name": "b"}, "Object": {"Key": "k"}}
            }]
        });
        let records = converter()
            .convert(payload.to_string().as_bytes())
            .unwrap();
        assert_eq!(records[0].event_name(), "s3:ObjectCreated:Copy");
        assert_eq!(records[0].bucket(), "b");
        assert_eq!(records[0].object_key(), "k");
    }

    #[test]
    fn test_pascal_case_record_is_forwarded_in_camel_case() {
        let record = CanonicalEventRecord::from_raw(json!({
            "EventName": "s3:ObjectCreated:Put",
            "AwsRegion": "us-east-1",
            "S3": {
                "S3SchemaVersion": "1.0",
                "Bucket": {"Name": "b", "OwnerIdentity": {"PrincipalId": "minio"}},
                "Object": {
                    "Key": "k",
                    "ETag": "abc",
                    "UserMetadata": {"X-Amz-Meta-Owner": "alice"}
                }
            }
        }))
        .unwrap();

        let encoded: JsonValue = serde_json::from_slice(&record.to_json().unwrap()).unwrap();
        assert_eq!(
            encoded,
            json!({
                "eventName": "s3:ObjectCreated:Put",
                "awsRegion": "us-east-1",
                "s3": {
                    "s3SchemaVersion": "1.0",
                    "bucket": {"name": "b", "ownerIdentity": {"principalId": "minio"}},
                    "object": {
                        "key": "k",
                        "eTag": "abc",
                        "userMetadata": {"X-Amz-Meta-Owner": "alice"}
                    }
                }
            })
        );
    }

    #[test]
    fn test_camel_case_key_wins_over_pascal_duplicate() {
        let record = CanonicalEventRecord::from_raw(json!({
            "eventName": "s3:ObjectCreated:Put",
            "EventName": "ignored",
            "s3": {"bucket": {"name": "b"}, "object": {"key": "k"}}
        }))
        .unwrap();

        assert_eq!(record.event_name(), "s3:ObjectCreated:Put");
        assert_eq!(record.raw()["EventName"], "ignored");
    }

    #[test]
    fn test_convert_without_records_yields_nothing() {
        let payload = br#"{"EventName": "s3:ObjectCreated:Put", "Key": "b/k"}"#;
        assert!(converter().convert(payload).unwrap().is_empty());
    }

    #[test]
    fn test_convert_rejects_missing_event_name() {
        let payload = br#"{"Key": "b/k", "Records": []}"#;
        let err = converter().convert(payload).unwrap_err();
        assert!(matches!(err, WatcherError::Malformed(ref m) if m == "empty event name"));
    }

    #[test]
    fn test_convert_rejects_empty_key() {
        let payload = br#"{"EventName": "s3:ObjectCreated:Put", "Key": "", "Records": []}"#;
        let err = converter().convert(payload).unwrap_err();
        assert!(matches!(err, WatcherError::Malformed(ref m) if m == "empty key"));
    }

    #[test]
    fn test_convert_rejects_invalid_json() {
        let err = converter().convert(b"not json").unwrap_err();
        assert!(matches!(err, WatcherError::Malformed(_)));
    }

    #[test]
    fn test_convert_rejects_non_object_record() {
        let payload = br#"{"EventName": "e", "Key": "k", "Records": ["oops"]}"#;
        let err = converter().convert(payload).unwrap_err();
        assert!(matches!(err, WatcherError::Malformed(_)));
    }

    #[test]
    fn test_record_missing_s3_section_has_empty_fields() {
        let record = CanonicalEventRecord::from_raw(json!({"eventName": "e"})).unwrap();
        assert_eq!(record.event_name(), "e");
        assert_eq!(record.bucket(), "");
        assert_eq!(record.object_key(), "");
    }
}
