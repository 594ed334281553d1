//! `snapshot` verbs: clone, create, delete, rollback, list, rename.

use std::fmt;

use serde_json::json;

use crate::bulk::*;
use crate::dataset::unsupported;
use crate::error::{Error, Result};
use crate::flags::FlagSet;
use crate::namespec::*;
use crate::property::*;
use crate::query::*;
use crate::render::*;
use crate::schema::PropertySchema;
use crate::session::{Ctx, Session};
use crate::zfs_types::{SnapshotFullName, ValueOrder};
use crate::log_if_verbose;

const OBJECT_TYPE: &str = "zfs.snapshot";
const WRITE_TIMEOUT: u64 = 10;

pub fn clone(ctx: &mut Ctx<'_>, snapshot: &str, dest: &str) -> Result<()> {
    let snapshot = Namespec::classify(snapshot)?.require(&[Kind::Snapshot], "snapshot clone")?;
    let dest = Namespec::classify(dest)?.require(&[Kind::Dataset], "snapshot clone")?;
    let params = [json!({ "snapshot": snapshot.normalized, "dataset_dst": dest.normalized })];
    let out = ctx.session.call("zfs.snapshot.clone", ctx.timeout, &params)?;
    log_if_verbose!("zfs.snapshot.clone -> {}", String::from_utf8_lossy(&out));
    Ok(())
}

/// `snapshot create` as two phases: an optional best-effort delete of same-named snapshots,
/// then the creation itself. Nothing ties the two together; a create failure leaves the
/// cleanup done.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotCreatePlan {
    pub cleanup: Option<BulkCallRequest>,
    pub create: BulkCallRequest,
}

pub fn plan_create(targets: &[String], flags: &FlagSet, schema: &PropertySchema) -> Result<SnapshotCreatePlan> {
    let specs = classify_all(targets, &[Kind::Snapshot], "snapshot create")?;

    let mut payload = PropertyPayload::new();
    payload.insert("recursive", PropertyValue::Bool(flags.is_true("recursive")));
    for vm_flag in ["suspend_vms", "vmware_sync"] {
        if flags.is_used(vm_flag) {
            payload.insert(vm_flag, PropertyValue::Bool(flags.is_true(vm_flag)));
        }
    }
    let exclude = flags.list("exclude");
    if !exclude.is_empty() {
        payload.insert("exclude", PropertyValue::Strings(exclude));
    }
    let mut properties = PropertyPayload::new();
    if let Some(raw) = flags.get("option") {
        merge_options(&mut properties, raw, schema)?;
    }
    payload.insert("properties", PropertyValue::Map(properties));

    let create_targets = specs
        .iter()
        .filter_map(|spec| {
            let (dataset, name) = (spec.dataset()?, spec.snapshot_name()?);
            Some(BulkTarget::new(spec.original.as_str(), "dataset", dataset).also("name", name))
        })
        .collect();
    let create = BulkCallRequest::new("zfs.snapshot.create", WRITE_TIMEOUT, vec![payload.to_json()], "", &[])
        .with_targets(create_targets);

    let cleanup = flags.is_true("delete").then(|| {
        let names = specs.iter().map(|s| s.normalized.clone()).collect::<Vec<_>>();
        BulkCallRequest::new(
            "zfs.snapshot.delete",
            WRITE_TIMEOUT,
            vec![json!({ "recursive": true })],
            "",
            &names,
        )
        .best_effort()
    });

    Ok(SnapshotCreatePlan { cleanup, create })
}

/// Run a plan. Cleanup failures (usually: there was nothing to delete) are only logged.
pub fn execute_create(session: &mut dyn Session, plan: &SnapshotCreatePlan) -> Result<BulkCallResult> {
    if let Some(cleanup) = &plan.cleanup {
        match bulk_call(session, cleanup) {
            Ok(result) => {
                for (target, error) in result.failures() {
                    log_if_verbose!("not deleting {target} before creating it: {error}");
                }
            }
            Err(e) => log_if_verbose!("skipping cleanup: {e}"),
        }
    }
    bulk_call(session, &plan.create)
}

pub fn create(ctx: &mut Ctx<'_>, targets: &[String], flags: &FlagSet) -> Result<()> {
    let plan = plan_create(targets, flags, &ctx.schemas.snapshot)?;
    execute_create(ctx.session, &plan)?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Delete,
    Rollback,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verb::Delete => "delete",
            Verb::Rollback => "rollback",
        })
    }
}

/// Delete or roll back to each target snapshot, passing the explicitly set flags as options.
pub fn delete_or_rollback(ctx: &mut Ctx<'_>, verb: Verb, targets: &[String], flags: &FlagSet) -> Result<()> {
    let specs = classify_all(targets, &[Kind::Snapshot], &format!("snapshot {verb}"))?;
    let mut flags = flags.clone();
    let no_smart_timeout = flags.remove("no_smart_timeout").is_some_and(|v| v == "true");

    let timeout = if verb == Verb::Delete && !no_smart_timeout && flags.is_true("recursive") {
        let query_targets = specs
            .iter()
            .map(|s| QueryTarget::new(s.original.as_str(), TypeTag::Name, s.normalized.as_str()))
            .collect::<Vec<_>>();
        SmartTimeout::DELETE.measure(ctx.session, OBJECT_TYPE, &query_targets, ctx.timeout)?
    } else {
        WRITE_TIMEOUT
    };

    let names = specs.into_iter().map(|s| s.normalized).collect::<Vec<_>>();
    let options = encode_used_flags(&flags);
    let request = BulkCallRequest::new(
        &format!("{OBJECT_TYPE}.{verb}"),
        timeout,
        vec![options.to_json()],
        "",
        &names,
    );
    bulk_call(ctx.session, &request)?;
    Ok(())
}

/// Query targets for `snapshot list`.
pub fn list_targets(targets: &[String]) -> Result<Vec<QueryTarget>> {
    targets
        .iter()
        .map(|target| {
            let spec = Namespec::classify(target)?;
            let tag = match spec.kind {
                Kind::Snapshot => TypeTag::Name,
                Kind::SnapshotOnly => TypeTag::SnapshotName,
                Kind::Dataset => TypeTag::Dataset,
                Kind::Pool => TypeTag::Pool,
                Kind::Share | Kind::Id => {
                    return Err(unsupported(&spec, "querying snapshots by mount point is not yet supported"));
                }
            };
            Ok(QueryTarget::new(spec.original.as_str(), tag, spec.lookup_value()))
        })
        .collect()
}

pub fn list(ctx: &mut Ctx<'_>, targets: &[String], flags: &FlagSet) -> Result<String> {
    let format = resolve_format(flags, &ctx.schemas.list)?;
    let properties = flags.list("output");
    let query_targets = list_targets(targets)?;

    let params = QueryParams {
        value_order: ValueOrder::new(flags.is_true("parsable")),
        all_props: flags.is_true("all"),
        user_props: flags.is_true("user_properties"),
        recurse: targets.is_empty() || flags.is_true("recursive"),
    };
    let response = query(ctx.session, OBJECT_TYPE, &query_targets, &properties, params, ctx.timeout)?;

    let records = response.records();
    let columns = select_columns(params.all_props, &properties, &["name"], &records);
    render(format, "snapshots", &columns, &records)
}

/// The full new name for renaming `source` to `dest`.
///
/// `dest` may be a bare snapshot name, `@name`, or `dataset@name` on the source's own dataset.
pub fn resolve_snapshot_destination(source: &Namespec, dest: &str) -> Result<SnapshotFullName> {
    let Some(dataset) = source.dataset() else {
        return Err(Error::validation(format!("`{}` is not a snapshot", source.original)));
    };
    if !dest.contains(['@', '/']) {
        if !is_valid_snapshot_name(dest) {
            return Err(Error::Namespec {
                spec: dest.to_owned(),
                kind: None,
                message: format!("unrecognised snapshot name `{dest}`"),
            });
        }
        return Ok(format!("{dataset}@{dest}"));
    }

    let dest = Namespec::classify(dest)?.require(&[Kind::Snapshot, Kind::SnapshotOnly], "snapshot rename")?;
    match (dest.kind, dest.dataset()) {
        (Kind::Snapshot, Some(dest_dataset)) if dest_dataset != dataset => Err(Error::validation(format!(
            "`{}` does not share the same dataset as `{}`; leave the dataset out of the destination",
            dest.original, source.original
        ))),
        (Kind::Snapshot, _) => Ok(dest.normalized),
        _ => Ok(format!("{dataset}@{}", dest.lookup_value())),
    }
}

pub fn rename(ctx: &mut Ctx<'_>, source: &str, dest: &str) -> Result<()> {
    let source = Namespec::classify(source)?.require(&[Kind::Snapshot], "snapshot rename")?;
    let new_name = resolve_snapshot_destination(&source, dest)?;
    let params = [json!(source.normalized), json!(new_name)];
    let out = ctx.session.call("zfs.snapshot.rename", ctx.timeout, &params)?;
    log_if_verbose!("zfs.snapshot.rename -> {}", String::from_utf8_lossy(&out));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schemas;
    use crate::session::BulkOutcome;
    use crate::session::testing::*;
    use serde_json::Value;

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

    #[test]
    fn clone_sends_snapshot_and_destination() {
        let mut session = FakeSession::default();
        run(&mut session, |ctx| clone(ctx, "pool/a@s1", "pool/a-clone")).unwrap();
        assert_eq!(
            session.calls,
            vec![Recorded::Call {
                method: "zfs.snapshot.clone".to_owned(),
                timeout: 30,
                params: vec![json!({"snapshot": "pool/a@s1", "dataset_dst": "pool/a-clone"})],
            }]
        );

        let err = run(&mut session, |ctx| clone(ctx, "pool/a", "pool/b")).unwrap_err();
        assert!(matches!(err, Error::Namespec { kind: Some(Kind::Dataset), .. }));
    }

    #[test]
    fn create_substitutes_dataset_and_name_per_target() {
        let mut flags = FlagSet::default();
        flags
            .set_default("recursive", "false")
            .set_default("delete", "false")
            .set("exclude", "pool/a/tmp,pool/b/tmp")
            .set("option", "org.example:made-by=cron");
        let schemas = Schemas::new();
        let plan = plan_create(&strings(&["pool/a@s1", "pool/b@s1"]), &flags, &schemas.snapshot).unwrap();
        assert_eq!(plan.cleanup, None);

        let mut session = FakeSession::default();
        execute_create(&mut session, &plan).unwrap();
        let shared = json!({
            "recursive": false,
            "exclude": ["pool/a/tmp", "pool/b/tmp"],
            "properties": {"org.example:made-by": "cron"},
        });
        let with = |dataset: &str| {
            let mut v = shared.clone();
            v["dataset"] = json!(dataset);
            v["name"] = json!("s1");
            vec![v]
        };
        assert_eq!(
            session.calls,
            vec![Recorded::Bulk {
                method: "zfs.snapshot.create".to_owned(),
                timeout: 10,
                arg_sets: vec![with("pool/a"), with("pool/b")],
            }]
        );
    }

    #[test]
    fn create_with_delete_cleans_up_first_and_ignores_cleanup_failures() {
        let mut flags = FlagSet::default();
        flags.set("delete", "true").set("recursive", "true").set("suspend_vms", "true");
        let mut session = FakeSession::default();
        session.reply_bulk(
            "zfs.snapshot.delete",
            Ok(BulkOutcome {
                raw_output: Vec::new(),
                items: vec![Err("does not exist".to_owned()), Ok(Value::Null)],
            }),
        );
        run(&mut session, |ctx| create(ctx, &strings(&["pool/a@s1", "pool/b@s1"]), &flags)).unwrap();

        assert_eq!(session.methods(), vec!["zfs.snapshot.delete", "zfs.snapshot.create"]);
        assert_eq!(
            session.calls[0],
            Recorded::Bulk {
                method: "zfs.snapshot.delete".to_owned(),
                timeout: 10,
                arg_sets: vec![
                    vec![json!("pool/a@s1"), json!({"recursive": true})],
                    vec![json!("pool/b@s1"), json!({"recursive": true})],
                ],
            }
        );
        match &session.calls[1] {
            Recorded::Bulk { arg_sets, .. } => {
                assert_eq!(arg_sets[0][0]["recursive"], json!(true));
                assert_eq!(arg_sets[0][0]["suspend_vms"], json!(true));
                assert_eq!(arg_sets[0][0].get("vmware_sync"), None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cleanup_that_fails_outright_does_not_stop_create() {
        let mut flags = FlagSet::default();
        flags.set("delete", "true");
        let mut session = FakeSession::default();
        session.reply("zfs.snapshot.delete", Err(Error::remote("zfs.snapshot.delete", "not found")));
        run(&mut session, |ctx| create(ctx, &strings(&["pool/a@s1"]), &flags)).unwrap();
        assert_eq!(session.methods(), vec!["zfs.snapshot.delete", "zfs.snapshot.create"]);
    }

    #[test]
    fn create_failure_is_reported() {
        let flags = FlagSet::default();
        let mut session = FakeSession::default();
        session.reply("zfs.snapshot.create", Err(Error::remote("zfs.snapshot.create", "dataset busy")));
        let err = run(&mut session, |ctx| create(ctx, &strings(&["pool/a@s1"]), &flags)).unwrap_err();
        assert!(matches!(err, Error::Remote { .. }));
    }

    #[test]
    fn create_rejects_unqualified_snapshots() {
        let flags = FlagSet::default();
        let schemas = Schemas::new();
        for target in ["pool/a", "@s1", "pool"] {
            assert!(
                matches!(
                    plan_create(&strings(&[target]), &flags, &schemas.snapshot),
                    Err(Error::Namespec { .. })
                ),
                "{target}"
            );
        }
    }

    #[test]
    fn recursive_delete_uses_smart_timeout() {
        let mut flags = FlagSet::default();
        flags.set("recursive", "true").set_default("defer", "false");
        let mut session = FakeSession::default();
        session.reply(
            "zfs.snapshot.query",
            Ok(json!([
                {"name": "pool/a@s1"},
                {"name": "pool/a/b@s1"},
                {"name": "pool/a/c@s1"},
                {"name": "pool/a/c/d@s1"},
            ])),
        );
        run(&mut session, |ctx| delete_or_rollback(ctx, Verb::Delete, &strings(&["pool/a@s1"]), &flags)).unwrap();

        assert_eq!(session.methods(), vec!["zfs.snapshot.query", "zfs.snapshot.delete"]);
        assert_eq!(session.calls.iter().map(Recorded::timeout).collect::<Vec<_>>(), vec![30, 50]);
        assert_eq!(
            session.calls[1],
            Recorded::Call {
                method: "zfs.snapshot.delete".to_owned(),
                timeout: 50,
                params: vec![json!("pool/a@s1"), json!({"recursive": true})],
            }
        );
    }

    #[test]
    fn rollback_keeps_fixed_timeout_and_passes_flags() {
        let mut flags = FlagSet::default();
        flags.set("recursive", "true").set("force", "true").set_default("recursive_clones", "false");
        let mut session = FakeSession::default();
        run(&mut session, |ctx| delete_or_rollback(ctx, Verb::Rollback, &strings(&["pool/a@s1"]), &flags)).unwrap();
        assert_eq!(
            session.calls,
            vec![Recorded::Call {
                method: "zfs.snapshot.rollback".to_owned(),
                timeout: 10,
                params: vec![json!("pool/a@s1"), json!({"recursive": true, "force": true})],
            }]
        );
    }

    #[test]
    fn list_targets_route_each_kind() {
        assert_eq!(
            list_targets(&strings(&["pool/a@s1", "@daily", "pool/a", "pool"])).unwrap(),
            vec![
                QueryTarget::new("pool/a@s1", TypeTag::Name, "pool/a@s1"),
                QueryTarget::new("@daily", TypeTag::SnapshotName, "daily"),
                QueryTarget::new("pool/a", TypeTag::Dataset, "pool/a"),
                QueryTarget::new("pool", TypeTag::Pool, "pool"),
            ]
        );
        let err = list_targets(&strings(&["/mnt/pool"])).unwrap_err();
        assert!(err.to_string().contains("not yet supported"), "{err}");
    }

    #[test]
    fn list_renders_json() {
        let mut flags = FlagSet::default();
        flags
            .set_default("format", "table")
            .set_default("no_headers", "false")
            .set("json", "true")
            .set("output", "name,used");
        let mut session = FakeSession::default();
        session.reply(
            "zfs.snapshot.query",
            Ok(json!([{"name": "pool/a@s1", "properties": {"used": {"value": "0B", "rawvalue": "0"}}}])),
        );
        let out = run(&mut session, |ctx| list(ctx, &strings(&["@s1"]), &flags)).unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, json!({"snapshots": [{"name": "pool/a@s1", "used": "0B"}]}));

        match &session.calls[0] {
            Recorded::Call { params, .. } => {
                assert_eq!(params[0], json!([["snapshot_name", "=", "s1"]]));
                assert_eq!(params[1]["extra"]["retrieve_properties"], json!(true));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rename_destinations() {
        let source = Namespec::classify("pool/a@old").unwrap();
        assert_eq!(resolve_snapshot_destination(&source, "new").unwrap(), "pool/a@new");
        assert_eq!(resolve_snapshot_destination(&source, "2025-01-01").unwrap(), "pool/a@2025-01-01");
        assert_eq!(resolve_snapshot_destination(&source, "@new").unwrap(), "pool/a@new");
        assert_eq!(resolve_snapshot_destination(&source, "pool/a@new").unwrap(), "pool/a@new");
        assert!(matches!(
            resolve_snapshot_destination(&source, "pool/b@new"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            resolve_snapshot_destination(&source, "pool/b"),
            Err(Error::Namespec { .. })
        ));
        assert!(matches!(
            resolve_snapshot_destination(&source, "bad$name"),
            Err(Error::Namespec { .. })
        ));
    }

    #[test]
    fn rename_calls_with_full_names() {
        let mut session = FakeSession::default();
        run(&mut session, |ctx| rename(ctx, "pool/a@old", "new")).unwrap();
        assert_eq!(
            session.calls,
            vec![Recorded::Call {
                method: "zfs.snapshot.rename".to_owned(),
                timeout: 30,
                params: vec![json!("pool/a@old"), json!("pool/a@new")],
            }]
        );
    }
}
