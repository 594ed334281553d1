use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::log_if_verbose;
use crate::session::Session;
use crate::zfs_types::*;

/// How the service should interpret a query target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    /// Full object name.
    Name,
    /// Everything in a pool (or just the pool's root when not recursing).
    Pool,
    /// Snapshots of a dataset.
    Dataset,
    /// Snapshots with this short name, on any dataset.
    SnapshotName,
}

impl TypeTag {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Name => "name",
            TypeTag::Pool => "pool",
            TypeTag::Dataset => "dataset",
            TypeTag::SnapshotName => "snapshot_name",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTarget {
    /// The caller's argument, verbatim. Results matching it are keyed by this.
    pub original: String,
    pub tag: TypeTag,
    /// The value sent to the service.
    pub value: String,
}

impl QueryTarget {
    pub fn new(original: impl Into<String>, tag: TypeTag, value: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            tag,
            value: value.into(),
        }
    }

    #[cfg(test)]
    pub fn name(name: &str) -> Self {
        Self::new(name, TypeTag::Name, name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryParams {
    pub value_order: ValueOrder,
    pub all_props: bool,
    pub user_props: bool,
    pub recurse: bool,
}

impl QueryParams {
    /// Parsable values, nothing extra: enough to learn what exists.
    pub fn existence() -> Self {
        Self {
            value_order: ValueOrder::Parsable,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    /// Objects by name. An object whose name is a caller's argument (after normalisation) is
    /// keyed by that argument exactly as the caller wrote it.
    pub results_map: IndexMap<String, Record>,
}

impl QueryResponse {
    pub fn contains(&self, original: &str) -> bool {
        self.results_map.contains_key(original)
    }

    pub fn records(&self) -> Vec<Record> {
        self.results_map.values().cloned().collect()
    }
}

/// Query `<object_type>.query` for `targets`, projecting to `properties`.
///
/// With no targets the whole tree is listed, regardless of `params.recurse`.
pub fn query(
    session: &mut dyn Session,
    object_type: &str,
    targets: &[QueryTarget],
    properties: &[String],
    params: QueryParams,
    timeout_seconds: u64,
) -> Result<QueryResponse> {
    let method = format!("{object_type}.query");
    let mut params = params;
    if targets.is_empty() {
        params.recurse = true;
    }
    // Namespaced properties only show up among user properties.
    if properties.iter().any(|p| p.contains(':')) {
        params.user_props = true;
    }

    let request = build_request(object_type, targets, properties, params);
    let shown = Value::Array(request.clone());
    log_if_verbose!("{method} {shown}");

    let output = session.call(&method, timeout_seconds, &request)?;
    let parsed = if output.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&output).map_err(|e| Error::remote(&method, format!("malformed response: {e}")))?
    };
    let objects = match parsed {
        Value::Array(objects) => objects,
        Value::Null => Vec::new(),
        _ => return Err(Error::remote(&method, "malformed response: expected a list of objects")),
    };

    let mut results_map = IndexMap::new();
    for object in objects {
        let Value::Object(object) = object else {
            return Err(Error::remote(&method, "malformed response: expected a list of objects"));
        };
        let record = flatten_record(&object, params.value_order);
        let Some(name) = record.get("name").and_then(Value::as_str).map(str::to_owned) else {
            continue;
        };
        let key = targets
            .iter()
            .find(|t| t.tag == TypeTag::Name && t.value == name)
            .map_or(name, |t| t.original.clone());
        results_map.insert(key, record);
    }
    Ok(QueryResponse { results_map })
}

fn build_request(object_type: &str, targets: &[QueryTarget], properties: &[String], params: QueryParams) -> Vec<Value> {
    let snapshots = object_type.ends_with("snapshot");
    let clauses: Vec<Vec<Value>> = targets
        .iter()
        .flat_map(|t| target_clauses(t, params.recurse, snapshots))
        .collect();

    let filters = match clauses.as_slice() {
        [] => json!([]),
        [only] => Value::Array(only.clone()),
        many => {
            let branches = many
                .iter()
                .map(|clause| match clause.as_slice() {
                    [single] => single.clone(),
                    _ => Value::Array(clause.clone()),
                })
                .collect::<Vec<_>>();
            json!([["OR", branches]])
        }
    };

    let mut extra = serde_json::Map::new();
    extra.insert("flat".to_owned(), json!(true));
    extra.insert("retrieve_children".to_owned(), json!(params.recurse));
    extra.insert("user_properties".to_owned(), json!(params.user_props));
    if !params.all_props {
        extra.insert("properties".to_owned(), json!(properties));
    }
    if snapshots {
        extra.insert("retrieve_properties".to_owned(), json!(params.all_props || !properties.is_empty()));
    }

    vec![filters, json!({ "extra": extra })]
}

/// Conjunctive filter clauses, any of which selects objects for `target`.
fn target_clauses(target: &QueryTarget, recurse: bool, snapshots: bool) -> Vec<Vec<Value>> {
    let v = target.value.as_str();
    match target.tag {
        TypeTag::Name => match v.split_once('@') {
            Some((dataset, name)) if recurse => vec![
                vec![json!(["dataset", "=", dataset]), json!(["snapshot_name", "=", name])],
                vec![json!(["dataset", "^", format!("{dataset}/")]), json!(["snapshot_name", "=", name])],
            ],
            _ if recurse => vec![vec![json!(["name", "=", v])], vec![json!(["name", "^", format!("{v}/")])]],
            _ => vec![vec![json!(["name", "=", v])]],
        },
        TypeTag::Pool if recurse => vec![vec![json!(["pool", "=", v])]],
        TypeTag::Pool if snapshots => vec![vec![json!(["dataset", "=", v])]],
        TypeTag::Pool => vec![vec![json!(["name", "=", v])]],
        TypeTag::Dataset if recurse => {
            vec![vec![json!(["dataset", "=", v])], vec![json!(["dataset", "^", format!("{v}/")])]]
        }
        TypeTag::Dataset => vec![vec![json!(["dataset", "=", v])]],
        TypeTag::SnapshotName => vec![vec![json!(["snapshot_name", "=", v])]],
    }
}
