//! Wire envelope codec
//!
//! Every payload travels as base64 of JSON inside a JSON envelope
//! `{ "data": "<base64>", "index": "..." }`. Entries carry their own `data`
//! field base64-encoded a second time.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::{Cache, Entry};
use crate::endpoint::Mode;
use crate::error::ProtocolError;
use crate::patch::{Operation, RawOperation};

/// Standard alphabet, emits padding, accepts input with or without it
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The wire unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    /// Set on full-state frames; absent on patch frames
    #[serde(default, skip_serializing_if = "is_false")]
    pub snapshot: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Envelope {
    /// Parse a received frame
    pub fn from_slice(frame: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(frame)?)
    }
}

/// Outbound delete request
#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    op: &'static str,
    index: &'a str,
}

/// Time channel frame; `data` may be a string or a number
#[derive(Debug, Deserialize)]
struct TimeFrame {
    data: Value,
}

/// base64(JSON(value))
pub fn encode_value<T: Serialize + ?Sized>(value: &T) -> Result<String, ProtocolError> {
    let json = serde_json::to_string(value)?;
    Ok(BASE64.encode(json))
}

/// JSON(base64-decoded text)
pub fn decode_value(encoded: &str) -> Result<Value, ProtocolError> {
    let text = decode_text(encoded)?;
    Ok(serde_json::from_str(&text)?)
}

fn decode_text(encoded: &str) -> Result<String, ProtocolError> {
    let bytes = BASE64.decode(encoded.trim())?;
    Ok(String::from_utf8(bytes)?)
}

/// Build the envelope for a write
pub fn encode<T: Serialize + ?Sized>(
    data: &T,
    index: Option<&str>,
) -> Result<Envelope, ProtocolError> {
    Ok(Envelope {
        data: encode_value(data)?,
        index: index.map(str::to_string),
        snapshot: false,
    })
}

/// Serialized write frame, ready for the socket
pub fn set_frame<T: Serialize + ?Sized>(
    data: &T,
    index: Option<&str>,
) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(&encode(data, index)?)?)
}

/// Serialized delete frame, ready for the socket
pub fn del_frame(index: &str) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(&DeleteRequest { op: "del", index })?)
}

/// Decode a snapshot envelope into a cache of the given mode.
///
/// An empty payload decodes to the empty entry for singular mode and to an
/// empty list otherwise.
pub fn decode(envelope: &Envelope, mode: &Mode) -> Result<Cache, ProtocolError> {
    let text = decode_text(&envelope.data)?;
    if text.trim().is_empty() {
        return Ok(Cache::empty(mode));
    }
    decode_payload(serde_json::from_str(&text)?, mode)
}

/// Decode an already-unwrapped payload (entries with encoded `data`)
pub fn decode_payload(payload: Value, mode: &Mode) -> Result<Cache, ProtocolError> {
    match mode {
        Mode::Singular => decode_entry(payload).map(Cache::Entry),
        _ => match payload {
            Value::Array(items) => items
                .into_iter()
                .map(decode_entry)
                .collect::<Result<Vec<_>, _>>()
                .map(Cache::Collection),
            _ => Ok(Cache::Collection(Vec::new())),
        },
    }
}

/// Decode one entry whose `data` field is base64 JSON
pub fn decode_entry(value: Value) -> Result<Entry, ProtocolError> {
    let mut entry: Entry = serde_json::from_value(value)
        .map_err(|e| ProtocolError::Shape(format!("expected an entry: {}", e)))?;
    entry.data = decode_field(entry.data)?;
    Ok(entry)
}

fn decode_field(data: Value) -> Result<Value, ProtocolError> {
    match data {
        Value::String(encoded) => decode_value(&encoded),
        other => Err(ProtocolError::Shape(format!(
            "entry data must be base64 text, got {}",
            other
        ))),
    }
}

/// Parse a frame from the time channel
pub fn parse_time(frame: &[u8]) -> Result<i64, ProtocolError> {
    let frame: TimeFrame = serde_json::from_slice(frame)?;
    match &frame.data {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| ProtocolError::InvalidTime(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| ProtocolError::InvalidTime(s.clone())),
        other => Err(ProtocolError::InvalidTime(other.to_string())),
    }
}

/// What an operation's path addresses, derived from the cache schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedField {
    /// A whole entry; its `data` member is encoded
    Entry,
    /// An entry's `data` field
    EntryData,
    /// The whole collection; every entry's `data` is encoded
    Entries,
    /// Anything else; plain JSON
    Plain,
}

impl EncodedField {
    /// Classify a path against the shape of `cache`
    pub fn of(cache: &Cache, path: &[String]) -> Self {
        match (cache, path) {
            (Cache::Entry(_), []) => EncodedField::Entry,
            (Cache::Entry(_), [field]) if field == "data" => EncodedField::EntryData,
            (Cache::Collection(_), []) => EncodedField::Entries,
            (Cache::Collection(_), [position]) if is_position(position) => EncodedField::Entry,
            (Cache::Collection(_), [position, field]) if is_position(position) && field == "data" => {
                EncodedField::EntryData
            }
            _ => EncodedField::Plain,
        }
    }
}

fn is_position(token: &str) -> bool {
    token == "-" || (!token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()))
}

/// Decode a patch envelope into operations ready to apply to `cache`
pub fn decode_patch(envelope: &Envelope, cache: &Cache) -> Result<Vec<Operation>, ProtocolError> {
    let raw: Vec<RawOperation> = serde_json::from_str(&decode_text(&envelope.data)?)?;
    raw.into_iter()
        .map(|raw| {
            let mut op = Operation::try_from(raw)?;
            let field = EncodedField::of(cache, op.path().tokens());
            if let Some(value) = op.value_mut() {
                decode_operation_value(field, value)?;
            }
            Ok(op)
        })
        .collect()
}

fn decode_operation_value(field: EncodedField, value: &mut Value) -> Result<(), ProtocolError> {
    match field {
        EncodedField::Plain => Ok(()),
        EncodedField::EntryData => {
            let encoded = match value.take() {
                Value::Object(mut map) if map.contains_key("data") => {
                    map.remove("data").unwrap_or_default()
                }
                other => other,
            };
            *value = decode_field(encoded)?;
            Ok(())
        }
        EncodedField::Entry => {
            *value = serde_json::to_value(decode_entry(value.take())?)?;
            Ok(())
        }
        EncodedField::Entries => {
            let Value::Array(items) = value.take() else {
                return Err(ProtocolError::Shape("expected a list of entries".to_string()));
            };
            let entries = items
                .into_iter()
                .map(decode_entry)
                .collect::<Result<Vec<_>, _>>()?;
            *value = serde_json::to_value(entries)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope_of(payload: &Value) -> Envelope {
        Envelope {
            data: BASE64.encode(payload.to_string()),
            index: None,
            snapshot: true,
        }
    }

    fn wire_entry(index: &str, created: i64, updated: i64, data: &Value) -> Value {
        json!({
            "index": index,
            "created": created,
            "updated": updated,
            "data": encode_value(data).unwrap(),
        })
    }

    #[test]
    fn test_encode_shape() {
        let frame = set_frame(&json!({"name": "a box"}), Some("box")).unwrap();
        let parsed: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["index"], "box");
        assert_eq!(
            decode_value(parsed["data"].as_str().unwrap()).unwrap(),
            json!({"name": "a box"})
        );
        assert!(parsed.get("snapshot").is_none());

        let frame = set_frame(&json!(1), None).unwrap();
        assert_eq!(frame, r#"{"data":"MQ=="}"#);

        assert_eq!(del_frame("box").unwrap(), r#"{"op":"del","index":"box"}"#);
    }

    #[test]
    fn test_singular_round_trip() {
        for value in [json!({"name": "a box"}), json!([1, 2]), json!("text"), json!(null)] {
            let payload = wire_entry("box", 1, 0, &value);
            let cache = decode(&envelope_of(&payload), &Mode::Singular).unwrap();
            assert_eq!(cache.as_entry().unwrap().data, value);
        }
    }

    #[test]
    fn test_empty_payload_defaults() {
        let empty = Envelope {
            data: String::new(),
            index: None,
            snapshot: true,
        };
        assert_eq!(
            decode(&empty, &Mode::Singular).unwrap(),
            Cache::Entry(Entry::default())
        );
        assert_eq!(
            decode(&empty, &Mode::Collection).unwrap(),
            Cache::Collection(vec![])
        );
    }

    #[test]
    fn test_collection_and_unknown_modes() {
        let payload = json!([
            wire_entry("a", 1, 0, &json!({"n": 1})),
            wire_entry("b", 2, 0, &json!({"n": 2}))
        ]);
        let cache = decode(&envelope_of(&payload), &Mode::Collection).unwrap();
        assert_eq!(cache.entries().len(), 2);
        assert_eq!(cache.get("b").unwrap().data, json!({"n": 2}));

        let cache = decode(&envelope_of(&payload), &Mode::Unknown("zz".into())).unwrap();
        assert_eq!(cache.entries().len(), 2);

        let single = wire_entry("a", 1, 0, &json!({}));
        let cache = decode(&envelope_of(&single), &Mode::Collection).unwrap();
        assert_eq!(cache, Cache::Collection(vec![]));
    }

    #[test]
    fn test_unpadded_base64_accepted() {
        assert_eq!(decode_value("e30").unwrap(), json!({}));
        assert!(decode_value("***").is_err());
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time(br#"{"data":"1700000000000"}"#).unwrap(), 1_700_000_000_000);
        assert_eq!(parse_time(br#"{"data":42}"#).unwrap(), 42);
        assert!(matches!(
            parse_time(br#"{"data":"soon"}"#),
            Err(ProtocolError::InvalidTime(_))
        ));
    }

    #[test]
    fn test_encoded_field_classification() {
        let entry = Cache::Entry(Entry::default());
        let list = Cache::Collection(vec![]);
        let path = |s: &str| crate::patch::Pointer::parse(s).unwrap().tokens().to_vec();

        assert_eq!(EncodedField::of(&entry, &path("")), EncodedField::Entry);
        assert_eq!(EncodedField::of(&entry, &path("/data")), EncodedField::EntryData);
        assert_eq!(EncodedField::of(&entry, &path("/updated")), EncodedField::Plain);
        assert_eq!(EncodedField::of(&entry, &path("/data/name")), EncodedField::Plain);

        assert_eq!(EncodedField::of(&list, &path("")), EncodedField::Entries);
        assert_eq!(EncodedField::of(&list, &path("/3")), EncodedField::Entry);
        assert_eq!(EncodedField::of(&list, &path("/-")), EncodedField::Entry);
        assert_eq!(EncodedField::of(&list, &path("/0/data")), EncodedField::EntryData);
        assert_eq!(EncodedField::of(&list, &path("/0/created")), EncodedField::Plain);
        // A key named "metadata" is not the data field
        assert_eq!(EncodedField::of(&list, &path("/0/metadata")), EncodedField::Plain);
    }

    #[test]
    fn test_decode_patch_values() {
        let cache = Cache::Collection(vec![]);
        let ops = json!([
            {"op": "add", "path": "/0", "value": wire_entry("a", 1, 0, &json!({"n": 1}))},
            {"op": "replace", "path": "/0/data", "value": encode_value(&json!({"n": 2})).unwrap()},
            {"op": "replace", "path": "/0/data", "value": {"data": encode_value(&json!({"n": 3})).unwrap()}},
            {"op": "replace", "path": "/0/updated", "value": 5}
        ]);
        let ops = decode_patch(&envelope_of(&ops), &cache).unwrap();

        assert_eq!(
            ops[0],
            Operation::Add {
                path: crate::patch::Pointer::parse("/0").unwrap(),
                value: json!({"index": "a", "created": 1, "updated": 0, "data": {"n": 1}}),
            }
        );
        assert_eq!(
            ops[1],
            Operation::Replace {
                path: crate::patch::Pointer::parse("/0/data").unwrap(),
                value: json!({"n": 2}),
            }
        );
        assert!(matches!(&ops[2], Operation::Replace { value, .. } if *value == json!({"n": 3})));
        assert!(matches!(&ops[3], Operation::Replace { value, .. } if *value == json!(5)));
    }
}
