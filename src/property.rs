use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::flags::{FlagSet, canonical_flag_name};
use crate::schema::{PropertyKind, PropertySchema};

/// A typed property value as written into a request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    /// Byte count.
    Size(i64),
    String(String),
    List(Vec<UserProperty>),
    Strings(Vec<String>),
    Map(PropertyPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProperty {
    pub key: String,
    pub value: PropertyValue,
}

/// Insertion-ordered property name to value mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PropertyPayload(IndexMap<String, PropertyValue>);

impl PropertyPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.0.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Validate `raw` against what `schema` says about `name` and type it.
pub fn encode(name: &str, raw: &str, schema: &PropertySchema) -> Result<PropertyValue> {
    match schema.kind(name) {
        PropertyKind::Enum(allowed) => allowed
            .iter()
            .find(|candidate| candidate.eq_ignore_ascii_case(raw))
            .map(|canonical| PropertyValue::String((*canonical).to_owned()))
            .ok_or_else(|| {
                Error::validation(format!(
                    "invalid value `{raw}` for {name}, must be one of: {}",
                    allowed.join(", ")
                ))
            }),
        PropertyKind::Size => {
            let size = parse_size(raw).map_err(|e| Error::validation(format!("failed to parse {name}: {e}")))?;
            if size < 0 {
                return Err(Error::validation(format!(
                    "failed to parse {name}: negative numbers are not permitted"
                )));
            }
            Ok(PropertyValue::Size(size))
        }
        PropertyKind::Percentage => {
            let percent: i64 = raw
                .trim()
                .parse()
                .map_err(|_| Error::validation(format!("failed to parse {name}: `{raw}` is not a number")))?;
            if !(0..=100).contains(&percent) {
                return Err(Error::validation(format!(
                    "{name} must be a percentage between 1 and 100, or 0 (got {percent})"
                )));
            }
            Ok(PropertyValue::Int(percent))
        }
        PropertyKind::Integer => raw
            .trim()
            .parse()
            .map(PropertyValue::Int)
            .map_err(|_| Error::validation(format!("failed to parse {name}: `{raw}` is not an integer"))),
        PropertyKind::Boolean => parse_bool(raw)
            .map(PropertyValue::Bool)
            .ok_or_else(|| Error::validation(format!("failed to parse {name}: `{raw}` is not true or false"))),
        PropertyKind::Free => Ok(PropertyValue::String(raw.to_owned())),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Parse `<integer><unit>?`, where the unit is one of K, M, G, T, P (binary multiples),
/// optionally followed by `B` or `iB`. A bare `B` means bytes.
pub fn parse_size(raw: &str) -> std::result::Result<i64, String> {
    let s = raw.trim();
    let digits_end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && matches!(c, '-' | '+'))))
        .map_or(s.len(), |(i, _)| i);
    let (number, unit) = s.split_at(digits_end);
    if number.is_empty() || number == "-" || number == "+" {
        return Err(format!("`{raw}` is not a size"));
    }
    let number: i64 = number.parse().map_err(|_| format!("`{raw}` is out of range"))?;

    let unit = unit.trim().to_ascii_uppercase();
    let unit = unit
        .strip_suffix("IB")
        .or_else(|| unit.strip_suffix('B'))
        .unwrap_or(&unit);
    let shift = match unit {
        "" => 0,
        "K" => 10,
        "M" => 20,
        "G" => 30,
        "T" => 40,
        "P" => 50,
        other => return Err(format!("unknown size unit `{other}` in `{raw}`")),
    };
    number
        .checked_mul(1i64 << shift)
        .ok_or_else(|| format!("`{raw}` is out of range"))
}

/// Split `k1=v1,k2=v2` into `[k1, v1, k2, v2]`.
///
/// The result always has an even length. Values may themselves contain `=`.
pub fn parse_kv_list(raw: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for pair in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(Error::validation(format!(
                "malformed property list `{raw}`: expected key=value, got `{pair}`"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::validation(format!("malformed property list `{raw}`: empty key")));
        }
        out.push(key.to_owned());
        out.push(value.to_owned());
    }
    Ok(out)
}

/// `--option k=v,...`: each pair lands in `payload` under its own key. Keys naming a schema
/// property are canonicalised (`special-small-block-size`); any other key is kept as written.
pub fn merge_options(payload: &mut PropertyPayload, raw: &str, schema: &PropertySchema) -> Result<()> {
    for pair in parse_kv_list(raw)?.chunks_exact(2) {
        if let [key, value] = pair {
            let canonical = canonical_flag_name(key);
            let key = if schema.contains(&canonical) { canonical } else { key.clone() };
            let value = encode(&key, value, schema)?;
            payload.insert(key, value);
        }
    }
    Ok(())
}

/// `--user-props k=v,...`: an ordered list of `{key, value}` records. Keys are kept verbatim.
pub fn parse_user_properties(raw: &str, schema: &PropertySchema) -> Result<Vec<UserProperty>> {
    parse_kv_list(raw)?
        .chunks_exact(2)
        .filter_map(|pair| match pair {
            [key, value] => Some((key, value)),
            _ => None,
        })
        .map(|(key, value)| {
            Ok(UserProperty {
                key: key.clone(),
                value: encode(&canonical_flag_name(key), value, schema)?,
            })
        })
        .collect()
}

/// Explicitly set flags as loosely typed options: booleans and integers keep their type,
/// everything else is a string.
pub fn encode_used_flags(flags: &FlagSet) -> PropertyPayload {
    let mut payload = PropertyPayload::new();
    for (name, raw) in flags.used() {
        let value = match raw {
            "true" => PropertyValue::Bool(true),
            "false" => PropertyValue::Bool(false),
            _ => raw
                .parse()
                .map(PropertyValue::Int)
                .unwrap_or_else(|_| PropertyValue::String(raw.to_owned())),
        };
        payload.insert(name, value);
    }
    payload
}
