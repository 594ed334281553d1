use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};

// E.g. `tank/vms/disk0`
pub type DatasetName = String;
// E.g. `tank/vms/disk0@daily_2025-10-12`
pub type SnapshotFullName = String;

/// One object's properties, flattened to scalar values, in the order the service sent them.
pub type Record = IndexMap<String, Value>;

/// Which representation of a property value to prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueOrder {
    /// Human friendly, e.g. `1.5G`.
    #[default]
    Humanized,
    /// Typed or raw stored values, e.g. `1610612736`.
    Parsable,
}

impl ValueOrder {
    pub fn new(parsable: bool) -> Self {
        if parsable { Self::Parsable } else { Self::Humanized }
    }

    /// Keys of a property entry, in preference order.
    pub fn keys(self) -> &'static [&'static str] {
        match self {
            Self::Humanized => &["value", "parsed", "rawvalue"],
            Self::Parsable => &["parsed", "rawvalue", "value"],
        }
    }
}

/// A property as the service reports it, e.g.
/// `{"value": "LZ4", "rawvalue": "lz4", "parsed": "lz4", "source": "LOCAL"}`.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct PropertyEntry {
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub rawvalue: Option<Value>,
    #[serde(default)]
    pub parsed: Option<Value>,
}

impl PropertyEntry {
    fn pick(&self, order: ValueOrder) -> Value {
        order
            .keys()
            .iter()
            .filter_map(|key| match *key {
                "value" => self.value.as_ref(),
                "rawvalue" => self.rawvalue.as_ref(),
                _ => self.parsed.as_ref(),
            })
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(Value::Null)
    }
}

/// Keys whose object value holds further properties, merged into the record.
const NESTED_PROPERTY_KEYS: &[&str] = &["properties", "user_properties"];

fn is_property_entry(object: &Map<String, Value>) -> bool {
    ["value", "rawvalue", "parsed"].iter().any(|k| object.contains_key(*k))
}

/// Flatten one queried object into a [`Record`].
///
/// Property entries collapse to the value chosen by `order`; nested property maps are merged
/// in; child lists and other structured values are dropped.
pub fn flatten_record(object: &Map<String, Value>, order: ValueOrder) -> Record {
    let mut record = Record::new();
    flatten_into(&mut record, object, order);
    record
}

fn flatten_into(record: &mut Record, object: &Map<String, Value>, order: ValueOrder) {
    for (key, value) in object {
        match value {
            Value::Object(inner) if is_property_entry(inner) => {
                let entry: PropertyEntry = serde_json::from_value(value.clone()).unwrap_or_default();
                record.insert(key.clone(), entry.pick(order));
            }
            Value::Object(inner) if NESTED_PROPERTY_KEYS.contains(&key.as_str()) => {
                flatten_into(record, inner, order);
            }
            Value::Object(_) | Value::Array(_) => {}
            scalar => {
                record.insert(key.clone(), scalar.clone());
            }
        }
    }
}

/// One element of a `core.bulk` job result.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct BulkItem {
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<String>,
}

/// An NFS share as returned by `sharing.nfs.query`.
#[derive(Deserialize, Debug, Clone)]
pub struct NfsShare {
    pub id: i64,
    pub path: String,
}
