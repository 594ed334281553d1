use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::log_if_verbose;
use crate::query::*;
use crate::session::Session;

/// One target of a bulk call: the name it's reported under, and the values substituted into
/// the call's parameters for it.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkTarget {
    pub label: String,
    /// `(field, value)` pairs. An empty field makes the value the leading positional argument;
    /// any other field is set on the object passed as the first argument.
    pub fields: Vec<(String, Value)>,
}

impl BulkTarget {
    pub fn new(label: impl Into<String>, field: &str, value: impl Into<Value>) -> Self {
        Self {
            label: label.into(),
            fields: vec![(field.to_owned(), value.into())],
        }
    }

    pub fn also(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.push((field.to_owned(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkCallRequest {
    pub method: String,
    /// Parameters shared by every target, before substitution.
    pub shared_params: Vec<Value>,
    pub targets: Vec<BulkTarget>,
    pub timeout_seconds: u64,
    /// Record per-target failures instead of failing the call.
    pub best_effort: bool,
}

impl BulkCallRequest {
    /// Every target substituted into `target_field`.
    pub fn new(
        method: &str,
        timeout_seconds: u64,
        shared_params: Vec<Value>,
        target_field: &str,
        targets: &[String],
    ) -> Self {
        Self {
            method: method.to_owned(),
            shared_params,
            targets: targets
                .iter()
                .map(|t| BulkTarget::new(t.as_str(), target_field, t.as_str()))
                .collect(),
            timeout_seconds,
            best_effort: false,
        }
    }

    pub fn with_targets(mut self, targets: Vec<BulkTarget>) -> Self {
        self.targets = targets;
        self
    }

    pub fn best_effort(mut self) -> Self {
        self.best_effort = true;
        self
    }

    /// The parameter list for `target`.
    pub fn params_for(&self, target: &BulkTarget) -> Vec<Value> {
        let mut params = self.shared_params.clone();
        for (field, value) in &target.fields {
            if field.is_empty() {
                params.insert(0, value.clone());
                continue;
            }
            if !matches!(params.first(), Some(Value::Object(_))) {
                params.insert(0, Value::Object(Map::new()));
            }
            if let Some(Value::Object(object)) = params.first_mut() {
                object.insert(field.clone(), value.clone());
            }
        }
        params
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkCallResult {
    pub raw_output: Vec<u8>,
    /// Every target's label, with its error if it failed.
    pub per_target_error: IndexMap<String, Option<String>>,
}

impl BulkCallResult {
    pub fn failures(&self) -> Vec<(String, String)> {
        self.per_target_error
            .iter()
            .filter_map(|(target, error)| error.as_ref().map(|e| (target.clone(), e.clone())))
            .collect()
    }
}

/// One direct call for a single target, one bulk job for several.
///
/// Unless the request is best-effort, any failing target fails the whole call. Nothing is
/// undone: targets that succeeded before a failure keep their effect.
pub fn bulk_call(session: &mut dyn Session, request: &BulkCallRequest) -> Result<BulkCallResult> {
    let method = request.method.as_str();
    let mut result = BulkCallResult::default();

    match request.targets.as_slice() {
        [] => return Err(Error::validation(format!("{method}: no targets given"))),
        [target] => {
            let params = request.params_for(target);
            let shown = Value::Array(params.clone());
            log_if_verbose!("{method} {shown}");
            match session.call(method, request.timeout_seconds, &params) {
                Ok(output) => {
                    result.raw_output = output;
                    result.per_target_error.insert(target.label.clone(), None);
                }
                Err(e) if request.best_effort => {
                    result.per_target_error.insert(target.label.clone(), Some(e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }
        targets => {
            let arg_sets = targets.iter().map(|t| request.params_for(t)).collect::<Vec<_>>();
            log_if_verbose!("core.bulk {method} {}", serde_json::to_string(&arg_sets).unwrap_or_default());
            match session.bulk_call(method, request.timeout_seconds, &arg_sets) {
                Ok(outcome) => {
                    result.raw_output = outcome.raw_output;
                    for (target, item) in targets.iter().zip(outcome.items) {
                        result.per_target_error.insert(target.label.clone(), item.err());
                    }
                }
                Err(e) if request.best_effort => {
                    let message = e.to_string();
                    for target in targets {
                        result.per_target_error.insert(target.label.clone(), Some(message.clone()));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    log_if_verbose!("{method} -> {}", String::from_utf8_lossy(&result.raw_output));
    let failures = result.failures();
    if !failures.is_empty() && !request.best_effort {
        return Err(Error::PartialBulk {
            method: method.to_owned(),
            failures,
        });
    }
    Ok(result)
}

/// Timeout that grows with the number of objects an operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmartTimeout {
    pub base: u64,
    pub per_object: u64,
}

impl SmartTimeout {
    pub const DELETE: Self = Self {
        base: 10,
        per_object: 10,
    };

    pub fn scaled(self, affected: usize) -> u64 {
        let affected = u64::try_from(affected).unwrap_or(u64::MAX);
        self.base.saturating_add(self.per_object.saturating_mul(affected))
    }

    /// Count what a recursive operation on `targets` would touch and scale to it.
    pub fn measure(
        self,
        session: &mut dyn Session,
        object_type: &str,
        targets: &[QueryTarget],
        query_timeout: u64,
    ) -> Result<u64> {
        let params = QueryParams {
            recurse: true,
            ..QueryParams::existence()
        };
        let response = query(session, object_type, targets, &[], params, query_timeout)?;
        log_if_verbose!("{} objects affected under {object_type}", response.results_map.len());
        Ok(self.scaled(response.results_map.len()))
    }
}
