use serde_json::Value;

use crate::commands::*;
use crate::error::{Error, Result};
use crate::schema::Schemas;
use crate::typed_command::*;
use crate::zfs_types::BulkItem;

/// Result of one bulk invocation: the job's raw output plus one outcome per argument set, in
/// the order the argument sets were given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOutcome {
    pub raw_output: Vec<u8>,
    pub items: Vec<std::result::Result<Value, String>>,
}

/// The remote middleware, seen as a method call interface.
pub trait Session {
    /// Run `method` once with `params` as its positional arguments.
    fn call(&mut self, method: &str, timeout_seconds: u64, params: &[Value]) -> Result<Vec<u8>>;

    /// Run `method` once per argument set as a single job.
    fn bulk_call(&mut self, method: &str, timeout_seconds: u64, arg_sets: &[Vec<Value>]) -> Result<BulkOutcome>;
}

/// Queries can't change anything, so they are never dry-run.
pub fn is_read_only(method: &str) -> bool {
    method.ends_with(".query") || method.ends_with(".get_instance")
}

#[derive(Debug, Clone)]
pub struct MidcltSession {
    pub midclt: String,
    /// Run through `ssh <remote> --` when set.
    pub remote: Option<String>,
    pub dry_run: bool,
}

impl MidcltSession {
    fn via_remote<T: OutputType, const RO: bool>(&self, c: TypedCommand<T, RO>) -> TypedCommand<T, RO> {
        match &self.remote {
            Some(remote) => make_run_via_ssh_command(remote, c),
            None => c,
        }
    }
}

impl Session for MidcltSession {
    fn call(&mut self, method: &str, timeout_seconds: u64, params: &[Value]) -> Result<Vec<u8>> {
        let output = if is_read_only(method) {
            let c: TypedCommand<RawOutput, true> =
                make_midclt_call_command(&self.midclt, timeout_seconds, false, method, params)
                    .map_err(|e| Error::remote(method, e))?;
            self.via_remote(c).run()
        } else {
            let c: TypedCommand<RawOutput, false> =
                make_midclt_call_command(&self.midclt, timeout_seconds, false, method, params)
                    .map_err(|e| Error::remote(method, e))?;
            self.via_remote(c).run_or_dry_run(self.dry_run)
        };
        output.map(|o| o.output).map_err(|e| Error::remote(method, format!("{e:#}")))
    }

    fn bulk_call(&mut self, method: &str, timeout_seconds: u64, arg_sets: &[Vec<Value>]) -> Result<BulkOutcome> {
        let c = make_midclt_bulk_command(&self.midclt, timeout_seconds, method, arg_sets)
            .map_err(|e| Error::remote(method, e))?;
        if self.dry_run {
            self.via_remote(c)
                .run_or_dry_run(true)
                .map_err(|e| Error::remote(method, format!("{e:#}")))?;
            return Ok(BulkOutcome {
                raw_output: Vec::new(),
                items: arg_sets.iter().map(|_| Ok(Value::Null)).collect(),
            });
        }

        let items: Vec<BulkItem> = self
            .via_remote(c)
            .run()
            .map_err(|e| Error::remote(method, format!("{e:#}")))?
            .output;
        if items.len() != arg_sets.len() {
            return Err(Error::remote(
                method,
                format!("bulk job returned {} results for {} calls", items.len(), arg_sets.len()),
            ));
        }
        let raw_output = serde_json::to_vec(&items.iter().map(|i| &i.result).collect::<Vec<_>>())
            .map_err(|e| Error::remote(method, e))?;
        Ok(BulkOutcome {
            raw_output,
            items: items
                .into_iter()
                .map(|item| match item.error {
                    Some(error) => Err(error),
                    None => Ok(item.result),
                })
                .collect(),
        })
    }
}

/// Default timeout for direct calls and queries.
pub const DEFAULT_CALL_TIMEOUT: u64 = 30;

/// Everything a command handler needs for one invocation.
pub struct Ctx<'a> {
    pub session: &'a mut dyn Session,
    pub schemas: &'a Schemas,
    pub timeout: u64,
}
