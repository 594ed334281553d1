#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
#![cfg_attr(
    test,
    allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)
)]

use clap::{CommandFactory, FromArgMatches};

mod args;
use args::*;
mod bulk;
mod commands;
mod dataset;
use dataset::WriteMode;
mod error;
mod flags;
use flags::FlagSet;
mod logging;
mod namespec;
mod property;
mod query;
mod render;
mod schema;
use schema::Schemas;
mod session;
use session::*;
mod snapshot;
mod typed_command;
mod zfs_types;

/// Run one command. Listing commands return what to print.
fn dispatch(ctx: &mut Ctx<'_>, command: &Commands, flags: &FlagSet) -> error::Result<Option<String>> {
    match command {
        Commands::Dataset(command) => match command {
            DatasetCommands::Create { targets, .. } => {
                dataset::create_or_update(ctx, WriteMode::Create, targets, flags).map(|()| None)
            }
            DatasetCommands::Update { targets, .. } => {
                dataset::create_or_update(ctx, WriteMode::Update, targets, flags).map(|()| None)
            }
            DatasetCommands::Delete { targets, .. } => dataset::delete(ctx, targets, flags).map(|()| None),
            DatasetCommands::List { targets, .. } => dataset::list(ctx, targets, flags).map(Some),
            DatasetCommands::Promote { targets } => dataset::promote(ctx, targets).map(|()| None),
            DatasetCommands::Rename { source, dest, .. } => dataset::rename(ctx, source, dest, flags).map(|()| None),
        },
        Commands::Snapshot(command) => match command {
            SnapshotCommands::Clone { snapshot: source, dest } => snapshot::clone(ctx, source, dest).map(|()| None),
            SnapshotCommands::Create { targets, .. } => snapshot::create(ctx, targets, flags).map(|()| None),
            SnapshotCommands::Delete { targets, .. } => {
                snapshot::delete_or_rollback(ctx, snapshot::Verb::Delete, targets, flags).map(|()| None)
            }
            SnapshotCommands::List { targets, .. } => snapshot::list(ctx, targets, flags).map(Some),
            SnapshotCommands::Rename { source, dest } => snapshot::rename(ctx, source, dest).map(|()| None),
            SnapshotCommands::Rollback { targets, .. } => {
                snapshot::delete_or_rollback(ctx, snapshot::Verb::Rollback, targets, flags).map(|()| None)
            }
        },
    }
}

fn main() -> anyhow::Result<()> {
    // Parse through `ArgMatches` so we can tell explicitly set flags from defaults.
    let command = Args::command();
    let matches = command.clone().get_matches();
    let args = Args::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    logging::init(args.verbose);
    let flags = FlagSet::from_matches(&command, &matches);
    log_if_verbose!("flags: {:?}", flags);

    let schemas = Schemas::new();
    let mut session = MidcltSession {
        midclt: args.connection.midclt.clone(),
        remote: args.connection.remote.clone(),
        dry_run: args.connection.dry_run,
    };
    let mut ctx = Ctx {
        session: &mut session,
        schemas: &schemas,
        timeout: args.connection.timeout,
    };

    if let Some(output) = dispatch(&mut ctx, &args.command, &flags)? {
        print!("{output}");
    }
    Ok(())
}
