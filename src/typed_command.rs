use serde::de::DeserializeOwned;
use shell_quote::QuoteInto;
use std::{marker::PhantomData, process::Command};

use crate::{log, log_if_verbose};

pub trait OutputType: Sized {
    fn parse(output: Vec<u8>) -> anyhow::Result<Self>;
    /// What a dry run reports in place of real output.
    fn dry_run() -> Self;
}

pub struct RawOutput {
    pub output: Vec<u8>,
}
impl OutputType for RawOutput {
    fn parse(output: Vec<u8>) -> anyhow::Result<Self> {
        Ok(Self { output })
    }
    fn dry_run() -> Self {
        Self { output: Vec::new() }
    }
}

pub struct ParseableOutput<T> {
    pub output: T,
}
impl<T: DeserializeOwned + Default> OutputType for ParseableOutput<T> {
    fn parse(output: Vec<u8>) -> anyhow::Result<Self> {
        Ok(Self {
            output: serde_json::from_slice::<T>(&output)?,
        })
    }
    fn dry_run() -> Self {
        Self { output: T::default() }
    }
}

pub trait Runnable<Output: OutputType> {
    /// Run the command and deserialise the output.
    fn run(&mut self) -> anyhow::Result<Output>;
}
pub trait DryRunnable<Output: OutputType> {
    /// Log the command instead of running it when `dry_run` is set.
    fn run_or_dry_run(&mut self, dry_run: bool) -> anyhow::Result<Output>;
}
/// Only mutating commands are dry-runnable: read-only ones always run, since later decisions
/// (existence checks, timeouts) depend on what they return.
impl<Output: OutputType> DryRunnable<Output> for TypedCommand<Output, false> {
    fn run_or_dry_run(&mut self, dry_run: bool) -> anyhow::Result<Output> {
        if dry_run {
            log!("DRY RUN: {}", self);
            Ok(Output::dry_run())
        } else {
            self.run()
        }
    }
}

/// A `std::process::Command` along with a type hint about what data should be output, and
/// whether running it can change remote state.
pub struct TypedCommand<Output, const READ_ONLY: bool> {
    command: Command,
    t: PhantomData<Output>,
}
impl<Output: OutputType, const READ_ONLY: bool> TypedCommand<Output, READ_ONLY> {
    pub fn new<S: AsRef<std::ffi::OsStr>>(program: S) -> Self {
        Self {
            command: std::process::Command::new(program),
            t: PhantomData,
        }
    }

    pub fn arg<S: AsRef<std::ffi::OsStr>>(&mut self, arg: S) -> &mut Command {
        self.command.arg(arg)
    }
    pub fn args<I, S>(&mut self, args: I) -> &mut Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        self.command.args(args)
    }

    pub fn get_program(&self) -> &std::ffi::OsStr {
        self.command.get_program()
    }
    pub fn get_args(&self) -> std::process::CommandArgs<'_> {
        self.command.get_args()
    }
}
impl<Output: OutputType, const READ_ONLY: bool> Runnable<Output> for TypedCommand<Output, READ_ONLY> {
    fn run(&mut self) -> anyhow::Result<Output> {
        log_if_verbose!("RUN: `{}`", self);

        let output = self.command.output()?;
        if !output.status.success() {
            anyhow::bail!(
                "running command failed with {:?}: `{}`\nStdout:\n{}\nStderr:\n{}",
                output.status.code(),
                self,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr),
            );
        }
        Output::parse(output.stdout)
    }
}
impl<Output, const READ_ONLY: bool> std::fmt::Display for TypedCommand<Output, READ_ONLY> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = std::ffi::OsString::new();
        s.push(self.command.get_program());
        for arg in self.command.get_args() {
            s.push(" ");
            shell_quote::Sh::quote_into(arg, &mut s);
        }
        f.write_str(&String::from_utf8_lossy(s.as_encoded_bytes()))
    }
}
