use indexmap::IndexMap;

/// How a property's raw flag value is checked and typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    /// One of a fixed set of values, matched case-insensitively.
    Enum(&'static [&'static str]),
    /// Non-negative byte count with an optional binary unit suffix.
    Size,
    /// `0` or `1..=100`.
    Percentage,
    Integer,
    Boolean,
    /// Anything goes; sent as a string.
    Free,
}

/// Property name to kind. Names absent from the table are [`PropertyKind::Free`].
#[derive(Debug, Clone, Default)]
pub struct PropertySchema {
    kinds: IndexMap<&'static str, PropertyKind>,
}

impl PropertySchema {
    pub fn new(kinds: impl IntoIterator<Item = (&'static str, PropertyKind)>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    pub fn kind(&self, name: &str) -> &PropertyKind {
        self.kinds.get(name).unwrap_or(&PropertyKind::Free)
    }

    pub fn allowed(&self, name: &str) -> Option<&'static [&'static str]> {
        match self.kinds.get(name) {
            Some(PropertyKind::Enum(values)) => Some(values),
            _ => None,
        }
    }

    /// The schema's own spelling of `value`, if `name` is enumerated and `value` is allowed.
    pub fn canonical(&self, name: &str, value: &str) -> Option<&'static str> {
        self.allowed(name)?
            .iter()
            .find(|allowed| allowed.eq_ignore_ascii_case(value))
            .copied()
    }
}

pub const COMPRESSION: &[&str] = &[
    "on", "off", "gzip", "gzip-1", "gzip-9", "lz4", "lzjb", "zle", "zstd", "zstd-1", "zstd-2", "zstd-3", "zstd-4",
    "zstd-5", "zstd-6", "zstd-7", "zstd-8", "zstd-9", "zstd-10", "zstd-11", "zstd-12", "zstd-13", "zstd-14",
    "zstd-15", "zstd-16", "zstd-17", "zstd-18", "zstd-19", "zstd-fast", "zstd-fast-1", "zstd-fast-2",
    "zstd-fast-3", "zstd-fast-4", "zstd-fast-5", "zstd-fast-6", "zstd-fast-7", "zstd-fast-8", "zstd-fast-9",
    "zstd-fast-10", "zstd-fast-20", "zstd-fast-30", "zstd-fast-40", "zstd-fast-50", "zstd-fast-60",
    "zstd-fast-70", "zstd-fast-80", "zstd-fast-90", "zstd-fast-100", "zstd-fast-500", "zstd-fast-1000",
];

const INHERIT_ON_OFF: &[&str] = &["inherit", "on", "off"];

pub const OUTPUT_FORMATS: &[&str] = &["csv", "json", "table", "compact"];

/// Every schema the command families need, built once at startup.
#[derive(Debug, Clone)]
pub struct Schemas {
    pub dataset: PropertySchema,
    pub list: PropertySchema,
    /// Snapshot `--option` values are passed through untouched.
    pub snapshot: PropertySchema,
}

impl Schemas {
    pub fn new() -> Self {
        Self {
            dataset: dataset_schema(),
            list: PropertySchema::new([("format", PropertyKind::Enum(OUTPUT_FORMATS))]),
            snapshot: PropertySchema::default(),
        }
    }
}

impl Default for Schemas {
    fn default() -> Self {
        Self::new()
    }
}

fn dataset_schema() -> PropertySchema {
    use PropertyKind::*;
    PropertySchema::new([
        ("sync", Enum(&["standard", "always", "disabled"])),
        ("snapdir", Enum(&["disabled", "hidden", "visible"])),
        ("compression", Enum(COMPRESSION)),
        ("atime", Enum(INHERIT_ON_OFF)),
        ("exec", Enum(INHERIT_ON_OFF)),
        ("acltype", Enum(&["inherit", "posix", "nfsv4", "off"])),
        ("aclmode", Enum(&["inherit", "passthrough", "restricted", "discard"])),
        ("deduplication", Enum(&["inherit", "on", "verify", "off"])),
        (
            "checksum",
            Enum(&[
                "inherit", "on", "off", "fletcher2", "fletcher4", "sha256", "sha512", "skein", "edonr", "blake3",
            ]),
        ),
        ("readonly", Enum(INHERIT_ON_OFF)),
        ("casesensitivity", Enum(&["inherit", "sensitive", "insensitive"])),
        ("share_type", Enum(&["inherit", "generic", "multiprotocol", "nfs", "smb", "apps"])),
        ("volblocksize", Enum(&["512", "1K", "2K", "4K", "8K", "16K", "32K", "64K", "128K"])),
        ("snapdev", Enum(&["hidden", "visible"])),
        ("type", Enum(&["volume", "filesystem"])),
        ("quota", Size),
        ("refquota", Size),
        ("reservation", Size),
        ("refreservation", Size),
        ("special_small_block_size", Size),
        ("volsize", Size),
        ("quota_warning", Percentage),
        ("quota_critical", Percentage),
        ("refquota_warning", Percentage),
        ("refquota_critical", Percentage),
        ("copies", Integer),
        ("sparse", Boolean),
        ("force_size", Boolean),
    ])
}
