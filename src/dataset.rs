//! `dataset` verbs: create, update, delete, list, promote, rename.

use serde_json::{Value, json};

use crate::bulk::*;
use crate::error::{Error, Result};
use crate::flags::FlagSet;
use crate::namespec::*;
use crate::property::*;
use crate::query::*;
use crate::render::*;
use crate::schema::PropertySchema;
use crate::session::Ctx;
use crate::snapshot::resolve_snapshot_destination;
use crate::zfs_types::{DatasetName, NfsShare, ValueOrder};
use crate::{log, log_if_verbose};

const OBJECT_TYPE: &str = "pool.dataset";
const WRITE_TIMEOUT: u64 = 10;
const DELETE_TIMEOUT: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

impl WriteMode {
    fn command(self) -> &'static str {
        match self {
            WriteMode::Create => "dataset create",
            WriteMode::Update => "dataset update",
        }
    }
}

/// Create/update request body plus the flags that steer the command rather than the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPayload {
    pub payload: PropertyPayload,
    /// `update --create`: create targets that don't exist yet.
    pub create_missing: bool,
    pub allow_shrinking: bool,
}

/// Encode every explicitly set property flag.
pub fn build_dataset_payload(flags: &FlagSet, schema: &PropertySchema) -> Result<DatasetPayload> {
    let mut flags = flags.clone();
    let create_missing = flags.remove("create").is_some_and(|v| v == "true");
    let allow_shrinking = flags.remove("allow_shrinking").is_some_and(|v| v == "true");

    let mut payload = PropertyPayload::new();
    let mut user_properties = None;
    for (name, raw) in flags.used() {
        match name {
            "create_parents" => payload.insert("create_ancestors", PropertyValue::Bool(raw == "true")),
            "user_props" => user_properties = Some(parse_user_properties(raw, schema)?),
            "option" => merge_options(&mut payload, raw, schema)?,
            _ => payload.insert(name, encode(name, raw, schema)?),
        }
    }
    if let Some(user_properties) = user_properties.filter(|p| !p.is_empty()) {
        payload.insert("user_properties", PropertyValue::List(user_properties));
    }

    Ok(DatasetPayload {
        payload,
        create_missing,
        allow_shrinking,
    })
}

pub fn create_or_update(ctx: &mut Ctx<'_>, mode: WriteMode, targets: &[String], flags: &FlagSet) -> Result<()> {
    let allowed: &[Kind] = match mode {
        WriteMode::Create => &[Kind::Dataset],
        // A pool's root dataset can have its properties changed.
        WriteMode::Update => &[Kind::Dataset, Kind::Pool],
    };
    let specs = classify_all(targets, allowed, mode.command())?;
    let DatasetPayload {
        payload,
        create_missing,
        allow_shrinking,
    } = build_dataset_payload(flags, &ctx.schemas.dataset)?;
    if allow_shrinking {
        log_if_verbose!("--allow-shrinking is accepted but not sent to the service");
    }

    let (to_update, to_create) = match mode {
        WriteMode::Create => (Vec::new(), specs.iter().map(|s| s.normalized.clone()).collect()),
        WriteMode::Update if specs.len() > 1 || create_missing => split_by_existence(ctx, &specs, create_missing)?,
        WriteMode::Update => (specs.iter().map(|s| s.normalized.clone()).collect(), Vec::new()),
    };

    if !to_update.is_empty() {
        let request = BulkCallRequest::new(
            "pool.dataset.update",
            WRITE_TIMEOUT,
            vec![payload.to_json()],
            "",
            &to_update,
        );
        bulk_call(ctx.session, &request)?;
    }

    if !to_create.is_empty() {
        let mut payload = payload;
        let kind = if payload.contains("volsize") { "VOLUME" } else { "FILESYSTEM" };
        payload.insert("type", PropertyValue::String(kind.to_owned()));
        let request = BulkCallRequest::new(
            "pool.dataset.create",
            WRITE_TIMEOUT,
            vec![payload.to_json()],
            "name",
            &to_create,
        );
        bulk_call(ctx.session, &request)?;
    }
    Ok(())
}

/// Split `specs` into (existing, missing) with one query. Missing targets are an error unless
/// `create_missing` is set.
fn split_by_existence(
    ctx: &mut Ctx<'_>,
    specs: &[Namespec],
    create_missing: bool,
) -> Result<(Vec<DatasetName>, Vec<DatasetName>)> {
    let targets = specs
        .iter()
        .map(|s| QueryTarget::new(s.original.as_str(), TypeTag::Name, s.normalized.as_str()))
        .collect::<Vec<_>>();
    let response = query(ctx.session, OBJECT_TYPE, &targets, &[], QueryParams::existence(), ctx.timeout)?;

    let mut to_update = Vec::new();
    let mut to_create = Vec::new();
    for spec in specs {
        if response.contains(&spec.original) {
            to_update.push(spec.normalized.clone());
        } else if create_missing {
            to_create.push(spec.normalized.clone());
        } else {
            return Err(Error::NotFound(format!(
                "could not find dataset `{}`; pass -c/--create to create datasets that don't exist",
                spec.original
            )));
        }
    }
    Ok((to_update, to_create))
}

pub fn delete(ctx: &mut Ctx<'_>, targets: &[String], flags: &FlagSet) -> Result<()> {
    let specs = classify_all(targets, &[Kind::Dataset], "dataset delete")?;
    let mut flags = flags.clone();
    let no_smart_timeout = flags.remove("no_smart_timeout").is_some_and(|v| v == "true");

    let timeout = if !no_smart_timeout && flags.is_true("recursive") {
        let query_targets = specs
            .iter()
            .map(|s| QueryTarget::new(s.original.as_str(), TypeTag::Name, s.normalized.as_str()))
            .collect::<Vec<_>>();
        SmartTimeout::DELETE.measure(ctx.session, OBJECT_TYPE, &query_targets, ctx.timeout)?
    } else {
        DELETE_TIMEOUT
    };

    let names = specs.iter().map(|s| s.normalized.clone()).collect::<Vec<_>>();
    let options = encode_used_flags(&flags);
    let request = BulkCallRequest::new("pool.dataset.delete", timeout, vec![options.to_json()], "", &names);
    bulk_call(ctx.session, &request)?;
    Ok(())
}

/// Query targets for `dataset list`. Only names and pools can be listed directly.
pub fn list_targets(targets: &[String]) -> Result<Vec<QueryTarget>> {
    targets
        .iter()
        .map(|target| {
            let spec = Namespec::classify(target)?;
            let tag = match spec.kind {
                Kind::Dataset => TypeTag::Name,
                Kind::Pool => TypeTag::Pool,
                Kind::Share | Kind::Id => return Err(unsupported(&spec, "querying datasets by mount point is not yet supported")),
                Kind::Snapshot | Kind::SnapshotOnly => {
                    return Err(unsupported(&spec, "querying datasets by snapshot is not yet supported"));
                }
            };
            Ok(QueryTarget::new(spec.original.as_str(), tag, spec.lookup_value()))
        })
        .collect()
}

pub(crate) fn unsupported(spec: &Namespec, message: &str) -> Error {
    Error::Namespec {
        spec: spec.original.clone(),
        kind: Some(spec.kind),
        message: format!("{message} (`{}` is a {})", spec.original, spec.kind),
    }
}

pub fn list(ctx: &mut Ctx<'_>, targets: &[String], flags: &FlagSet) -> Result<String> {
    let format = resolve_format(flags, &ctx.schemas.list)?;
    let properties = flags.list("output");
    let query_targets = list_targets(targets)?;

    // Like `zfs list`, naming nothing lists everything.
    let params = QueryParams {
        value_order: ValueOrder::new(flags.is_true("parsable")),
        all_props: flags.is_true("all"),
        user_props: flags.is_true("user_properties"),
        recurse: targets.is_empty() || flags.is_true("recursive"),
    };
    let response = query(ctx.session, OBJECT_TYPE, &query_targets, &properties, params, ctx.timeout)?;

    let mut records = response.records();
    canonicalize_enum_values(&mut records, &ctx.schemas.dataset);
    let columns = select_columns(params.all_props, &properties, &["name"], &records);
    render(format, "datasets", &columns, &records)
}

pub fn promote(ctx: &mut Ctx<'_>, targets: &[String]) -> Result<()> {
    let names = classify_all(targets, &[Kind::Dataset], "dataset promote")?
        .into_iter()
        .map(|s| s.normalized)
        .collect::<Vec<_>>();
    let request = BulkCallRequest::new("pool.dataset.promote", WRITE_TIMEOUT, Vec::new(), "", &names);
    bulk_call(ctx.session, &request)?;
    Ok(())
}

/// Rename a dataset, or a snapshot within its dataset. With `--update-shares`, an NFS share
/// exported from the old mount point follows the dataset.
pub fn rename(ctx: &mut Ctx<'_>, source: &str, dest: &str, flags: &FlagSet) -> Result<()> {
    let source = Namespec::classify(source)?.require(&[Kind::Dataset, Kind::Snapshot], "dataset rename")?;
    let new_name = match source.kind {
        Kind::Snapshot => resolve_snapshot_destination(&source, dest)?,
        _ => Namespec::classify(dest)?.require(&[Kind::Dataset], "dataset rename")?.normalized,
    };

    let params = [json!(source.normalized), json!({ "new_name": new_name })];
    let shown = Value::from(params.to_vec());
    log_if_verbose!("zfs.dataset.rename {shown}");
    let out = ctx.session.call("zfs.dataset.rename", ctx.timeout, &params)?;
    log_if_verbose!("zfs.dataset.rename -> {}", String::from_utf8_lossy(&out));

    // Snapshots have no shares of their own.
    if flags.is_true("update_shares") && source.kind == Kind::Dataset {
        let old_path = format!("/mnt/{}", source.normalized);
        let Some(id) = lookup_nfs_share_id(ctx, &old_path)? else {
            log!("INFO: `{}` did not appear to have a share", source.original);
            return Ok(());
        };
        let params = [json!(id), json!({ "path": format!("/mnt/{new_name}") })];
        let out = ctx.session.call("sharing.nfs.update", ctx.timeout, &params)?;
        log_if_verbose!("sharing.nfs.update -> {}", String::from_utf8_lossy(&out));
    }
    Ok(())
}

/// Id of the NFS share exported from `path`, if there is one.
pub fn lookup_nfs_share_id(ctx: &mut Ctx<'_>, path: &str) -> Result<Option<i64>> {
    let method = "sharing.nfs.query";
    let out = ctx.session.call(method, ctx.timeout, &[json!([["path", "=", path]])])?;
    let shares: Option<Vec<NfsShare>> =
        serde_json::from_slice(&out).map_err(|e| Error::remote(method, format!("malformed response: {e}")))?;
    Ok(shares
        .unwrap_or_default()
        .into_iter()
        .find(|share| share.path == path)
        .map(|share| share.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schemas;
    use crate::session::testing::*;

    fn strings(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    fn run<T>(session: &mut FakeSession, f: impl FnOnce(&mut Ctx<'_>) -> T) -> T {
        let schemas = Schemas::new();
        let mut ctx = Ctx {
            session,
            schemas: &schemas,
            timeout: 30,
        };
        f(&mut ctx)
    }

    fn create_update_defaults() -> FlagSet {
        let mut flags = FlagSet::default();
        flags
            .set_default("sync", "standard")
            .set_default("compression", "off")
            .set_default("managedby", "zfs-ctl")
            .set_default("create_parents", "false")
            .set_default("allow_shrinking", "false");
        flags
    }

    #[test]
    fn create_two_datasets_is_one_bulk_create() {
        let mut flags = create_update_defaults();
        flags.set("compression", "LZ4");
        let mut session = FakeSession::default();
        run(&mut session, |ctx| {
            create_or_update(ctx, WriteMode::Create, &strings(&["pool/a", "pool/b"]), &flags)
        })
        .unwrap();

        assert_eq!(
            session.calls,
            vec![Recorded::Bulk {
                method: "pool.dataset.create".to_owned(),
                timeout: 10,
                arg_sets: vec![
                    vec![json!({"compression": "lz4", "type": "FILESYSTEM", "name": "pool/a"})],
                    vec![json!({"compression": "lz4", "type": "FILESYSTEM", "name": "pool/b"})],
                ],
            }]
        );
    }

    #[test]
    fn update_splits_existing_from_missing_when_creating() {
        let mut flags = create_update_defaults();
        flags.set("create", "true").set("sync", "always");
        let mut session = FakeSession::default();
        session.reply("pool.dataset.query", Ok(json!([{"name": "pool/a"}])));
        run(&mut session, |ctx| {
            create_or_update(ctx, WriteMode::Update, &strings(&["pool/a", "pool/missing"]), &flags)
        })
        .unwrap();

        assert_eq!(
            session.methods(),
            vec!["pool.dataset.query", "pool.dataset.update", "pool.dataset.create"]
        );
        assert_eq!(
            session.calls[1],
            Recorded::Call {
                method: "pool.dataset.update".to_owned(),
                timeout: 10,
                params: vec![json!("pool/a"), json!({"sync": "always"})],
            }
        );
        assert_eq!(
            session.calls[2],
            Recorded::Call {
                method: "pool.dataset.create".to_owned(),
                timeout: 10,
                params: vec![json!({"sync": "always", "type": "FILESYSTEM", "name": "pool/missing"})],
            }
        );
    }

    #[test]
    fn update_of_missing_dataset_without_create_is_not_found() {
        let flags = create_update_defaults();
        let mut session = FakeSession::default();
        session.reply("pool.dataset.query", Ok(json!([{"name": "pool/a"}])));
        let err = run(&mut session, |ctx| {
            create_or_update(ctx, WriteMode::Update, &strings(&["pool/a", "pool/missing"]), &flags)
        })
        .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(session.methods(), vec!["pool.dataset.query"]);
    }

    #[test]
    fn single_update_skips_existence_query() {
        let flags = create_update_defaults();
        let mut session = FakeSession::default();
        run(&mut session, |ctx| create_or_update(ctx, WriteMode::Update, &strings(&["pool"]), &flags)).unwrap();
        assert_eq!(session.methods(), vec!["pool.dataset.update"]);
    }

    #[test]
    fn bad_enum_value_fails_before_any_call() {
        let mut flags = create_update_defaults();
        flags.set("sync", "fast");
        let mut session = FakeSession::default();
        let err = run(&mut session, |ctx| {
            create_or_update(ctx, WriteMode::Create, &strings(&["pool/a"]), &flags)
        })
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("standard, always, disabled"), "{err}");
        assert!(session.calls.is_empty());
    }

    #[test]
    fn create_rejects_pools_before_any_call() {
        let flags = create_update_defaults();
        let mut session = FakeSession::default();
        let err = run(&mut session, |ctx| {
            create_or_update(ctx, WriteMode::Create, &strings(&["pool/a", "pool"]), &flags)
        })
        .unwrap_err();
        assert!(matches!(err, Error::Namespec { kind: Some(Kind::Pool), .. }));
        assert!(session.calls.is_empty());
    }

    #[test]
    fn payload_covers_sizes_options_user_properties_and_volumes() {
        let mut flags = create_update_defaults();
        flags
            .set("volsize", "10G")
            .set("create_parents", "true")
            .set("quota_warning", "80")
            .set("copies", "2")
            .set("sparse", "true")
            .set("user_props", "org:owner=ops,org:tier=gold")
            .set("option", "atime=ON,recordsize=1M")
            .set("allow_shrinking", "true");
        let schemas = Schemas::new();
        let built = build_dataset_payload(&flags, &schemas.dataset).unwrap();
        assert!(built.allow_shrinking);
        assert!(!built.create_missing);
        assert_eq!(
            built.payload.to_json(),
            json!({
                "create_ancestors": true,
                "volsize": 10i64 << 30,
                "quota_warning": 80,
                "copies": 2,
                "sparse": true,
                "atime": "on",
                "recordsize": "1M",
                "user_properties": [
                    {"key": "org:owner", "value": "ops"},
                    {"key": "org:tier", "value": "gold"},
                ],
            })
        );

        let mut session = FakeSession::default();
        run(&mut session, |ctx| {
            create_or_update(ctx, WriteMode::Create, &strings(&["pool/vol"]), &flags)
        })
        .unwrap();
        match &session.calls[0] {
            Recorded::Call { params, .. } => assert_eq!(params[0]["type"], json!("VOLUME")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn recursive_delete_scales_timeout_to_subtree() {
        let mut flags = FlagSet::default();
        flags.set("recursive", "true").set_default("force", "false").set_default("no_smart_timeout", "false");
        let mut session = FakeSession::default();
        session.reply(
            "pool.dataset.query",
            Ok(json!([{"name": "pool/a"}, {"name": "pool/a/b"}, {"name": "pool/a/c"}, {"name": "pool/a/c/d"}])),
        );
        run(&mut session, |ctx| delete(ctx, &strings(&["pool/a"]), &flags)).unwrap();

        assert_eq!(session.methods(), vec!["pool.dataset.query", "pool.dataset.delete"]);
        assert_eq!(
            session.calls[1],
            Recorded::Call {
                method: "pool.dataset.delete".to_owned(),
                timeout: 50,
                params: vec![json!("pool/a"), json!({"recursive": true})],
            }
        );
    }

    #[test]
    fn no_smart_timeout_skips_listing() {
        let mut flags = FlagSet::default();
        flags.set("recursive", "true").set("no_smart_timeout", "true");
        let mut session = FakeSession::default();
        run(&mut session, |ctx| delete(ctx, &strings(&["pool/a", "pool/b"]), &flags)).unwrap();
        assert_eq!(
            session.calls,
            vec![Recorded::Bulk {
                method: "pool.dataset.delete".to_owned(),
                timeout: 20,
                arg_sets: vec![
                    vec![json!("pool/a"), json!({"recursive": true})],
                    vec![json!("pool/b"), json!({"recursive": true})],
                ],
            }]
        );
    }

    #[test]
    fn list_renders_union_of_columns_with_canonical_enums() {
        let mut flags = FlagSet::default();
        flags
            .set_default("format", "table")
            .set_default("json", "false")
            .set_default("no_headers", "false")
            .set("all", "true");
        let mut session = FakeSession::default();
        session.reply(
            "pool.dataset.query",
            Ok(json!([
                {"name": "pool", "compression": {"value": "LZ4", "rawvalue": "lz4"}},
                {"name": "pool/a", "used": {"value": "1K", "rawvalue": "1024"}},
            ])),
        );
        let out = run(&mut session, |ctx| list(ctx, &[], &flags)).unwrap();
        assert_eq!(out, "NAME    COMPRESSION  USED\npool    lz4          -\npool/a  -            1K\n");
        match &session.calls[0] {
            Recorded::Call { params, .. } => {
                assert_eq!(params[0], json!([]));
                assert_eq!(params[1]["extra"]["retrieve_children"], json!(true));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn list_rejects_mount_points_and_snapshots() {
        for target in ["/mnt/pool/a", "12", "pool/a@s", "@s"] {
            assert!(
                matches!(list_targets(&strings(&[target])), Err(Error::Namespec { .. })),
                "{target}"
            );
        }
        assert_eq!(
            list_targets(&strings(&["pool", "pool/a/"])).unwrap(),
            vec![
                QueryTarget::new("pool", TypeTag::Pool, "pool"),
                QueryTarget::new("pool/a/", TypeTag::Name, "pool/a"),
            ]
        );
    }

    #[test]
    fn promote_many_is_one_bulk_call() {
        let mut session = FakeSession::default();
        run(&mut session, |ctx| promote(ctx, &strings(&["pool/a", "pool/b"]))).unwrap();
        assert_eq!(
            session.calls,
            vec![Recorded::Bulk {
                method: "pool.dataset.promote".to_owned(),
                timeout: 10,
                arg_sets: vec![vec![json!("pool/a")], vec![json!("pool/b")]],
            }]
        );
    }

    #[test]
    fn rename_moves_nfs_share_along() {
        let mut flags = FlagSet::default();
        flags.set("update_shares", "true");
        let mut session = FakeSession::default();
        session.reply("sharing.nfs.query", Ok(json!([{"id": 7, "path": "/mnt/pool/a"}])));
        run(&mut session, |ctx| rename(ctx, "pool/a", "pool/b", &flags)).unwrap();

        assert_eq!(
            session.methods(),
            vec!["zfs.dataset.rename", "sharing.nfs.query", "sharing.nfs.update"]
        );
        assert_eq!(
            session.calls[0],
            Recorded::Call {
                method: "zfs.dataset.rename".to_owned(),
                timeout: 30,
                params: vec![json!("pool/a"), json!({"new_name": "pool/b"})],
            }
        );
        assert_eq!(
            session.calls[2],
            Recorded::Call {
                method: "sharing.nfs.update".to_owned(),
                timeout: 30,
                params: vec![json!(7), json!({"path": "/mnt/pool/b"})],
            }
        );
    }

    #[test]
    fn rename_without_share_is_not_an_error() {
        let mut flags = FlagSet::default();
        flags.set("update_shares", "true");
        let mut session = FakeSession::default();
        session.reply("sharing.nfs.query", Ok(json!([])));
        run(&mut session, |ctx| rename(ctx, "pool/a", "pool/b", &flags)).unwrap();
        assert_eq!(session.methods(), vec!["zfs.dataset.rename", "sharing.nfs.query"]);
    }

    #[test]
    fn renaming_a_snapshot_accepts_a_bare_name_and_skips_shares() {
        let mut flags = FlagSet::default();
        flags.set("update_shares", "true");
        let mut session = FakeSession::default();
        run(&mut session, |ctx| rename(ctx, "pool/a@old", "new", &flags)).unwrap();
        assert_eq!(
            session.calls,
            vec![Recorded::Call {
                method: "zfs.dataset.rename".to_owned(),
                timeout: 30,
                params: vec![json!("pool/a@old"), json!({"new_name": "pool/a@new"})],
            }]
        );
    }
}
