use clap::{Parser, Subcommand};

use crate::session::DEFAULT_CALL_TIMEOUT;

/// Manage datasets, zvols and snapshots through the TrueNAS middleware.
#[derive(Parser, Debug)]
#[command(name = "zfs-ctl", version)]
pub struct Args {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Print verbose tracelogs.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Args, Debug)]
pub struct ConnectionArgs {
    /// Remote to run `midclt` on, compatible with SSH naming (e.g. IP/hostname/...). Local if unset.
    #[arg(long, env = "ZFS_CTL_REMOTE", global = true)]
    pub remote: Option<String>,
    /// Middleware client binary.
    #[arg(long, env = "ZFS_CTL_MIDCLT", default_value = "midclt", global = true)]
    pub midclt: String,
    /// Timeout in seconds for queries and single calls.
    #[arg(long, default_value_t = DEFAULT_CALL_TIMEOUT, global = true)]
    pub timeout: u64,
    /// Print mutating calls instead of running them. Queries still run.
    #[arg(long, global = true, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Edit or list datasets/zvols and their shares.
    #[command(subcommand)]
    Dataset(DatasetCommands),
    /// Edit or list snapshots.
    #[command(subcommand, visible_alias = "snap")]
    Snapshot(SnapshotCommands),
}

// Flag fields are read through `FlagSet`; handlers only take positionals from here.
#[allow(dead_code)]
#[derive(Subcommand, Debug)]
pub enum DatasetCommands {
    /// Create datasets/zvols.
    Create {
        #[command(flatten)]
        properties: DatasetPropertyArgs,
        #[arg(required = true, value_name = "DATASET")]
        targets: Vec<String>,
    },
    /// Update existing datasets/zvols.
    #[command(visible_alias = "set")]
    Update {
        /// Create datasets that don't exist yet.
        #[arg(short, long, default_value_t = false)]
        create: bool,
        #[command(flatten)]
        properties: DatasetPropertyArgs,
        #[arg(required = true, value_name = "DATASET")]
        targets: Vec<String>,
    },
    /// Delete datasets/zvols.
    #[command(visible_alias = "rm")]
    Delete {
        /// Also delete all children.
        #[arg(short, long, default_value_t = false)]
        recursive: bool,
        /// Delete busy datasets.
        #[arg(short, long, default_value_t = false)]
        force: bool,
        /// Don't list the tree first to size the call's timeout.
        #[arg(long, default_value_t = false)]
        no_smart_timeout: bool,
        #[arg(required = true, value_name = "DATASET")]
        targets: Vec<String>,
    },
    /// Print a table of datasets/zvols. Everything when no dataset is named.
    #[command(visible_alias = "ls")]
    List {
        #[command(flatten)]
        list: ListArgs,
        #[arg(value_name = "DATASET")]
        targets: Vec<String>,
    },
    /// Promote clones to no longer depend on their origin snapshot.
    Promote {
        #[arg(required = true, value_name = "DATASET")]
        targets: Vec<String>,
    },
    /// Rename a dataset, or a snapshot within its dataset.
    #[command(visible_alias = "mv")]
    Rename {
        /// Repoint the NFS share of the old mount point.
        #[arg(short = 's', long, default_value_t = false)]
        update_shares: bool,
        #[arg(value_name = "OLD")]
        source: String,
        #[arg(value_name = "NEW")]
        dest: String,
    },
}

/// Property flags shared by `dataset create` and `dataset update`.
///
/// Only explicitly set flags are sent, so defaults here are documentation. Values are read
/// through `FlagSet` and validated against the dataset schema.
#[allow(dead_code)]
#[derive(clap::Args, Debug)]
pub struct DatasetPropertyArgs {
    /// User defined comments.
    #[arg(long)]
    comments: Option<String>,
    /// Manager of this dataset, must not be empty.
    #[arg(long, default_value = "zfs-ctl")]
    managedby: String,
    #[arg(long)]
    recordsize: Option<String>,
    /// standard, always or disabled.
    #[arg(long, default_value = "standard")]
    sync: String,
    /// disabled, visible or hidden.
    #[arg(long, default_value = "hidden")]
    snapdir: String,
    /// Compression algorithm, e.g. off, lz4, zstd, gzip-9.
    #[arg(long, default_value = "off")]
    compression: String,
    #[arg(long, default_value = "inherit")]
    atime: String,
    #[arg(long, default_value = "inherit")]
    exec: String,
    #[arg(long, default_value = "inherit")]
    acltype: String,
    #[arg(long, default_value = "inherit")]
    aclmode: String,
    #[arg(long, default_value = "inherit")]
    deduplication: String,
    #[arg(long, default_value = "inherit")]
    checksum: String,
    #[arg(long, default_value = "inherit")]
    readonly: String,
    #[arg(long, default_value = "inherit")]
    casesensitivity: String,
    #[arg(long, default_value = "inherit")]
    share_type: String,
    #[arg(long, default_value = "0")]
    quota: String,
    /// Percentage (1-100 or 0).
    #[arg(long, default_value = "0")]
    quota_warning: String,
    /// Percentage (1-100 or 0).
    #[arg(long, default_value = "0")]
    quota_critical: String,
    #[arg(long, default_value = "0")]
    refquota: String,
    /// Percentage (1-100 or 0).
    #[arg(long, default_value = "0")]
    refquota_warning: String,
    /// Percentage (1-100 or 0).
    #[arg(long, default_value = "0")]
    refquota_critical: String,
    #[arg(long, default_value = "0")]
    reservation: String,
    #[arg(long, default_value = "0")]
    refreservation: String,
    #[arg(long, default_value = "0")]
    special_small_block_size: String,
    #[arg(long, default_value = "0")]
    copies: String,
    /// Create all missing parent datasets.
    #[arg(short = 'p', long, default_value_t = false)]
    create_parents: bool,
    /// User properties, `key=value,...`.
    #[arg(short, long)]
    user_props: Option<String>,
    /// Any other property, `property=value,...`.
    #[arg(short, long)]
    option: Option<String>,
    /// Permit shrinking a volume.
    #[arg(long, default_value_t = false)]
    allow_shrinking: bool,
    /// Create a volume of this size instead of a filesystem.
    #[arg(short = 'V', long)]
    volsize: Option<String>,
    /// Volume block size.
    #[arg(short = 'b', long, default_value = "512")]
    volblocksize: String,
    /// Create a sparse volume with no reservation.
    #[arg(short, long, default_value_t = false)]
    sparse: bool,
    #[arg(long, default_value_t = false)]
    force_size: bool,
    /// hidden or visible.
    #[arg(long, default_value = "hidden")]
    snapdev: String,
}

/// Flags shared by the `list` commands. Read through `FlagSet`.
#[allow(dead_code)]
#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Include children.
    #[arg(short, long, default_value_t = false)]
    recursive: bool,
    /// Include user properties.
    #[arg(short, long, default_value_t = false)]
    user_properties: bool,
    /// Equivalent to --format=json.
    #[arg(short, long, default_value_t = false)]
    json: bool,
    /// Equivalent to --format=compact. More easily parsed by scripts.
    #[arg(short = 'c', long, default_value_t = false)]
    no_headers: bool,
    /// table, compact, csv or json.
    #[arg(long, default_value = "table")]
    format: String,
    /// Comma separated properties to show.
    #[arg(short, long)]
    output: Option<String>,
    /// Show raw values instead of humanized ones.
    #[arg(short, long, default_value_t = false)]
    parsable: bool,
    /// Show every property.
    #[arg(short, long, default_value_t = false)]
    all: bool,
}

#[allow(dead_code)]
#[derive(Subcommand, Debug)]
pub enum SnapshotCommands {
    /// Clone a snapshot into a new dataset.
    Clone {
        #[arg(value_name = "DATASET@SNAPSHOT")]
        snapshot: String,
        #[arg(value_name = "DATASET")]
        dest: String,
    },
    /// Take snapshots of datasets, possibly recursively.
    Create {
        /// Delete the snapshot first if it exists already.
        #[arg(short, long, default_value_t = false)]
        delete: bool,
        #[arg(short, long, default_value_t = false)]
        recursive: bool,
        /// Comma separated datasets to exclude.
        #[arg(long)]
        exclude: Option<String>,
        /// Snapshot properties, `property=value,...`.
        #[arg(short, long)]
        option: Option<String>,
        #[arg(long, default_value_t = false)]
        suspend_vms: bool,
        #[arg(long, default_value_t = false)]
        vmware_sync: bool,
        #[arg(required = true, value_name = "DATASET@SNAPSHOT")]
        targets: Vec<String>,
    },
    /// Delete snapshots, possibly recursively.
    #[command(visible_alias = "rm")]
    Delete {
        /// Also delete same-named snapshots of children.
        #[arg(short, long, default_value_t = false)]
        recursive: bool,
        /// Defer the deletion.
        #[arg(long, default_value_t = false)]
        defer: bool,
        /// Don't list the tree first to size the call's timeout.
        #[arg(long, default_value_t = false)]
        no_smart_timeout: bool,
        #[arg(required = true, value_name = "DATASET@SNAPSHOT")]
        targets: Vec<String>,
    },
    /// List snapshots. Everything when nothing is named.
    #[command(visible_alias = "ls")]
    List {
        #[command(flatten)]
        list: ListArgs,
        #[arg(value_name = "[DATASET][@SNAPSHOT]")]
        targets: Vec<String>,
    },
    /// Rename a snapshot within its dataset.
    #[command(visible_alias = "mv")]
    Rename {
        #[arg(value_name = "DATASET@SNAPSHOT")]
        source: String,
        #[arg(value_name = "SNAPSHOT")]
        dest: String,
    },
    /// Roll datasets back to snapshots.
    Rollback {
        /// Force unmount of any clones.
        #[arg(short, long, default_value_t = false)]
        force: bool,
        /// Destroy any snapshots and bookmarks more recent than the one given.
        #[arg(short, long, default_value_t = false)]
        recursive: bool,
        /// Like --recursive, but also destroy any clones.
        #[arg(short = 'R', long, default_value_t = false)]
        recursive_clones: bool,
        /// Roll back every child's same-named snapshot as well.
        #[arg(long, default_value_t = false)]
        recursive_rollback: bool,
        #[arg(required = true, value_name = "DATASET@SNAPSHOT")]
        targets: Vec<String>,
    },
}
