use serde_json::Value;
use shell_quote::QuoteInto;
use std::ffi::{OsStr, OsString};

use crate::typed_command::*;

/// `midclt -t <timeout> call [-j] <method> <arg>...`, one JSON document per argument.
pub fn make_midclt_call_command<Output: OutputType, const READ_ONLY: bool>(
    midclt: &str,
    timeout_seconds: u64,
    job: bool,
    method: &str,
    params: &[Value],
) -> anyhow::Result<TypedCommand<Output, READ_ONLY>> {
    let mut c = TypedCommand::new(midclt);
    c.args(["-t", &timeout_seconds.to_string(), "call"]);
    if job {
        c.arg("-j");
    }
    c.arg(method);
    for param in params {
        c.arg(serde_json::to_string(param)?);
    }
    Ok(c)
}

/// `midclt ... call -j core.bulk <method> <[[args], ...]>`: one job running `method` once per
/// argument set.
pub fn make_midclt_bulk_command(
    midclt: &str,
    timeout_seconds: u64,
    method: &str,
    arg_sets: &[Vec<Value>],
) -> anyhow::Result<TypedCommand<ParseableOutput<Vec<crate::zfs_types::BulkItem>>, false>> {
    let params = [Value::String(method.to_owned()), serde_json::to_value(arg_sets)?];
    make_midclt_call_command(midclt, timeout_seconds, true, "core.bulk", &params)
}

/// ssh joins its arguments and hands them to the remote shell, so each one is quoted here.
pub fn make_run_via_ssh_command<T: OutputType, const RO: bool>(
    target: &str,
    nested_command: TypedCommand<T, RO>,
) -> TypedCommand<T, RO> {
    let mut c = TypedCommand::new("ssh");
    c.args([target, "--"]);
    c.arg(sh_quoted(nested_command.get_program()));
    c.args(nested_command.get_args().map(sh_quoted));
    c
}

fn sh_quoted(arg: &OsStr) -> OsString {
    let mut s = OsString::new();
    shell_quote::Sh::quote_into(arg, &mut s);
    s
}
