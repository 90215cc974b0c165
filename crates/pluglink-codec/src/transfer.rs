//! Object transfer layer: a replacer/reviver pair used inside the JSON
//! codec rule.
//!
//! A closed set of opaque composite values (URIs, line/character ranges,
//! binary blobs) cannot survive a plain JSON round trip. Before
//! serialization the replacer rewrites each of them to a marked object
//! `{"$type": <discriminant>, "data": <string>}`; after parsing the reviver
//! switches on the discriminant and rebuilds the original composite.
//! Ordinary objects, arrays and primitives pass through untouched.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{CodecError, Result};

/// Discriminant: internal URI.
pub const TRANSFER_URI: u8 = 0;
/// Discriminant: externally-defined URI (recognized by its `$mid` marker).
pub const TRANSFER_EXT_URI: u8 = 1;
/// Discriminant: line/character range.
pub const TRANSFER_RANGE: u8 = 2;
/// Discriminant: opaque binary blob.
pub const TRANSFER_BLOB: u8 = 3;

/// Marker field value identifying the externally-defined URI shape.
///
/// That type serializes itself to a plain object before the replacer
/// observes it, so it is recognized by field shape rather than identity.
const EXT_URI_MARKER: u64 = 1;

/// An opaque internal URI, kept in its string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri(String);

impl Uri {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An externally-defined URI, carried by components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ExtUri {
    pub scheme: String,
    pub authority: String,
    pub path: String,
    pub query: String,
    pub fragment: String,
}

impl ExtUri {
    /// Parse the string rendering produced by [`ExtUri::to_uri_string`].
    pub fn parse(input: &str) -> Result<Self> {
        let (scheme, rest) = input
            .split_once(':')
            .ok_or_else(|| CodecError::Malformed(format!("uri without scheme: {input}")))?;
        let rest = rest.strip_prefix("//").ok_or_else(|| {
            CodecError::Malformed(format!("uri without authority separator: {input}"))
        })?;

        let (body, fragment) = match rest.split_once('#') {
            Some((body, fragment)) => (body, fragment),
            None => (rest, ""),
        };
        let (body, query) = match body.split_once('?') {
            Some((body, query)) => (body, query),
            None => (body, ""),
        };
        let (authority, path) = match body.find('/') {
            Some(idx) => (&body[..idx], &body[idx..]),
            None => (body, ""),
        };

        Ok(Self {
            scheme: scheme.to_string(),
            authority: authority.to_string(),
            path: path.to_string(),
            query: query.to_string(),
            fragment: fragment.to_string(),
        })
    }

    /// Render as `scheme://authority/path?query#fragment`, omitting empty
    /// query/fragment parts.
    pub fn to_uri_string(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.scheme);
        out.push_str("://");
        out.push_str(&self.authority);
        out.push_str(&self.path);
        if !self.query.is_empty() {
            out.push('?');
            out.push_str(&self.query);
        }
        if !self.fragment.is_empty() {
            out.push('#');
            out.push_str(&self.fragment);
        }
        out
    }
}

impl fmt::Display for ExtUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri_string())
    }
}

/// A zero-based line/character position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A start/end position pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// An opaque binary blob that must survive the JSON path byte-for-byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Blob(pub Vec<u8>);

impl Blob {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Serialize, Deserialize)]
struct BlobRepr {
    bytes: Vec<u8>,
}

/// A JSON-compatible value tree extended with the transferable composites.
#[derive(Debug, Clone, PartialEq)]
pub enum PlainValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<PlainValue>),
    Object(BTreeMap<String, PlainValue>),
    Uri(Uri),
    ExtUri(ExtUri),
    Range(Range),
    Blob(Blob),
}

impl PlainValue {
    /// Structural conversion from a parsed JSON value. No revival happens
    /// here; marked objects stay plain objects until [`reviver`] runs.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => PlainValue::Null,
            Value::Bool(b) => PlainValue::Bool(b),
            Value::Number(n) => PlainValue::Number(n),
            Value::String(s) => PlainValue::String(s),
            Value::Array(items) => {
                PlainValue::Array(items.into_iter().map(PlainValue::from_json).collect())
            }
            Value::Object(map) => PlainValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, PlainValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for PlainValue {
    fn from(value: bool) -> Self {
        PlainValue::Bool(value)
    }
}

impl From<i64> for PlainValue {
    fn from(value: i64) -> Self {
        PlainValue::Number(value.into())
    }
}

impl From<i32> for PlainValue {
    fn from(value: i32) -> Self {
        PlainValue::Number(value.into())
    }
}

impl From<u32> for PlainValue {
    fn from(value: u32) -> Self {
        PlainValue::Number(value.into())
    }
}

impl From<&str> for PlainValue {
    fn from(value: &str) -> Self {
        PlainValue::String(value.to_string())
    }
}

impl From<String> for PlainValue {
    fn from(value: String) -> Self {
        PlainValue::String(value)
    }
}

fn marked(tag: u8, data: String) -> Value {
    json!({ "$type": tag, "data": data })
}

fn ext_uri_from_fields(map: &BTreeMap<String, PlainValue>) -> ExtUri {
    let field = |name: &str| match map.get(name) {
        Some(PlainValue::String(s)) => s.clone(),
        _ => String::new(),
    };
    ExtUri {
        scheme: field("scheme"),
        authority: field("authority"),
        path: field("path"),
        query: field("query"),
        fragment: field("fragment"),
    }
}

fn is_ext_uri_shape(map: &BTreeMap<String, PlainValue>) -> bool {
    matches!(map.get("$mid"), Some(PlainValue::Number(n)) if n.as_u64() == Some(EXT_URI_MARKER))
}

/// Rewrite transferable composites into their marked JSON form.
pub fn replacer(value: &PlainValue) -> Result<Value> {
    Ok(match value {
        PlainValue::Null => Value::Null,
        PlainValue::Bool(b) => Value::Bool(*b),
        PlainValue::Number(n) => Value::Number(n.clone()),
        PlainValue::String(s) => Value::String(s.clone()),
        PlainValue::Array(items) => {
            Value::Array(items.iter().map(replacer).collect::<Result<_>>()?)
        }
        PlainValue::Object(map) if is_ext_uri_shape(map) => {
            let uri = ext_uri_from_fields(map);
            marked(TRANSFER_EXT_URI, uri.to_uri_string())
        }
        PlainValue::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.clone(), replacer(value)?);
            }
            Value::Object(out)
        }
        PlainValue::Uri(uri) => marked(TRANSFER_URI, uri.to_string()),
        PlainValue::ExtUri(uri) => marked(TRANSFER_EXT_URI, uri.to_uri_string()),
        PlainValue::Range(range) => marked(TRANSFER_RANGE, serde_json::to_string(range)?),
        PlainValue::Blob(blob) => marked(
            TRANSFER_BLOB,
            serde_json::to_string(&BlobRepr {
                bytes: blob.0.clone(),
            })?,
        ),
    })
}

fn marked_parts(map: &Map<String, Value>) -> Option<(u8, &str)> {
    let tag = map.get("$type")?.as_u64()?;
    let data = map.get("data")?.as_str()?;
    u8::try_from(tag).ok().map(|tag| (tag, data))
}

/// Rebuild transferable composites from their marked JSON form.
pub fn reviver(value: &Value) -> Result<PlainValue> {
    Ok(match value {
        Value::Null => PlainValue::Null,
        Value::Bool(b) => PlainValue::Bool(*b),
        Value::Number(n) => PlainValue::Number(n.clone()),
        Value::String(s) => PlainValue::String(s.clone()),
        Value::Array(items) => {
            PlainValue::Array(items.iter().map(reviver).collect::<Result<_>>()?)
        }
        Value::Object(map) => match marked_parts(map) {
            Some((TRANSFER_URI, data)) => PlainValue::Uri(Uri::new(data)),
            Some((TRANSFER_EXT_URI, data)) => PlainValue::ExtUri(ExtUri::parse(data)?),
            Some((TRANSFER_RANGE, data)) => PlainValue::Range(serde_json::from_str(data)?),
            Some((TRANSFER_BLOB, data)) => {
                let repr: BlobRepr = serde_json::from_str(data)?;
                PlainValue::Blob(Blob(repr.bytes))
            }
            Some((tag, _)) => {
                return Err(CodecError::Malformed(format!(
                    "unknown transfer discriminant {tag}"
                )))
            }
            None => {
                let mut out = BTreeMap::new();
                for (key, value) in map {
                    out.insert(key.clone(), reviver(value)?);
                }
                PlainValue::Object(out)
            }
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: PlainValue) -> PlainValue {
        let json = replacer(&value).unwrap();
        let text = serde_json::to_string(&json).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        reviver(&parsed).unwrap()
    }

    #[test]
    fn uri_survives_roundtrip() {
        let value = PlainValue::Uri(Uri::new("file:///tmp/project/main.rs"));
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn range_survives_roundtrip() {
        let value = PlainValue::Range(Range::new(Position::new(3, 14), Position::new(15, 9)));
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn blob_survives_roundtrip() {
        let value = PlainValue::Blob(Blob::new(vec![0u8, 1, 2, 255]));
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn ext_uri_survives_roundtrip() {
        let uri = ExtUri {
            scheme: "vscode".into(),
            authority: "host".into(),
            path: "/a/b".into(),
            query: "q=1".into(),
            fragment: "frag".into(),
        };
        let value = PlainValue::ExtUri(uri);
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn ext_uri_shape_is_recognized_by_marker_field() {
        let mut map = BTreeMap::new();
        map.insert("$mid".to_string(), PlainValue::from(1i64));
        map.insert("scheme".to_string(), PlainValue::from("file"));
        map.insert("authority".to_string(), PlainValue::from(""));
        map.insert("path".to_string(), PlainValue::from("/etc/hosts"));

        let revived = roundtrip(PlainValue::Object(map));
        let PlainValue::ExtUri(uri) = revived else {
            panic!("expected ExtUri, got {revived:?}");
        };
        assert_eq!(uri.scheme, "file");
        assert_eq!(uri.path, "/etc/hosts");
    }

    #[test]
    fn plain_objects_pass_through() {
        let mut inner = BTreeMap::new();
        inner.insert("answer".to_string(), PlainValue::from(42i64));
        let value = PlainValue::Array(vec![
            PlainValue::Object(inner),
            PlainValue::from("text"),
            PlainValue::Null,
        ]);
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn colliding_keys_without_both_fields_pass_through() {
        // `$type` alone (or `data` alone) must not trigger revival.
        let mut only_type = BTreeMap::new();
        only_type.insert("$type".to_string(), PlainValue::from(0i64));
        let value = PlainValue::Object(only_type);
        assert_eq!(roundtrip(value.clone()), value);

        let mut only_data = BTreeMap::new();
        only_data.insert("data".to_string(), PlainValue::from("payload"));
        let value = PlainValue::Object(only_data);
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn unknown_discriminant_is_rejected() {
        let parsed: Value = serde_json::from_str(r#"{"$type": 99, "data": "x"}"#).unwrap();
        assert!(matches!(
            reviver(&parsed).unwrap_err(),
            CodecError::Malformed(_)
        ));
    }

    #[test]
    fn ext_uri_parse_rejects_garbage() {
        assert!(ExtUri::parse("no-scheme-here").is_err());
    }

    #[test]
    fn ext_uri_string_form_parses_back() {
        let uri = ExtUri {
            scheme: "file".into(),
            authority: String::new(),
            path: "/usr/bin".into(),
            query: String::new(),
            fragment: String::new(),
        };
        assert_eq!(uri.to_uri_string(), "file:///usr/bin");
        assert_eq!(ExtUri::parse(&uri.to_uri_string()).unwrap(), uri);
    }
}
