use std::fmt;

use crate::error::{Error, Result};

/// What a user-supplied identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Pool,
    Dataset,
    /// `dataset@name`.
    Snapshot,
    /// `@name`: a snapshot name matched across every dataset.
    SnapshotOnly,
    /// A mount point, e.g. `/mnt/tank/share`.
    Share,
    /// A numeric share id.
    Id,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::Pool => "pool",
            Kind::Dataset => "dataset",
            Kind::Snapshot => "snapshot",
            Kind::SnapshotOnly => "snapshot_only",
            Kind::Share => "share",
            Kind::Id => "id",
        })
    }
}

/// A classified identifier.
///
/// `normalized` keeps the sigils that decide the kind (a leading `/` or `@`), so classifying it
/// again always gives the same kind. Use [`Namespec::lookup_value`] for the bare value sent to
/// the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespec {
    pub original: String,
    pub kind: Kind,
    pub normalized: String,
}

impl Namespec {
    pub fn classify(spec: &str) -> Result<Self> {
        let (kind, normalized) = classify(spec)?;
        Ok(Self {
            original: spec.to_owned(),
            kind,
            normalized,
        })
    }

    /// The identifier with its routing prefix removed.
    pub fn lookup_value(&self) -> &str {
        match self.kind {
            Kind::SnapshotOnly => self.normalized.strip_prefix('@').unwrap_or(&self.normalized),
            _ => &self.normalized,
        }
    }

    /// Owning dataset of a qualified snapshot, or the dataset/pool itself.
    pub fn dataset(&self) -> Option<&str> {
        match self.kind {
            Kind::Snapshot => self.normalized.split_once('@').map(|(dataset, _)| dataset),
            Kind::Dataset | Kind::Pool => Some(&self.normalized),
            _ => None,
        }
    }

    pub fn snapshot_name(&self) -> Option<&str> {
        match self.kind {
            Kind::Snapshot | Kind::SnapshotOnly => self.normalized.split_once('@').map(|(_, name)| name),
            _ => None,
        }
    }

    /// Rejects identifiers whose kind `command` can't operate on.
    pub fn require(self, allowed: &[Kind], command: &str) -> Result<Self> {
        if allowed.contains(&self.kind) {
            return Ok(self);
        }
        let expected = allowed.iter().map(Kind::to_string).collect::<Vec<_>>().join(" or ");
        Err(Error::Namespec {
            message: format!(
                "{command} only operates on {expected} identifiers (`{}` is a {})",
                self.original, self.kind
            ),
            spec: self.original,
            kind: Some(self.kind),
        })
    }
}

/// Classify every spec in `specs`, failing on the first one `command` can't take.
pub fn classify_all(specs: &[String], allowed: &[Kind], command: &str) -> Result<Vec<Namespec>> {
    specs
        .iter()
        .map(|spec| Namespec::classify(spec)?.require(allowed, command))
        .collect()
}

/// Pure function of `spec`: the same input always yields the same kind.
pub fn classify(spec: &str) -> Result<(Kind, String)> {
    if spec.is_empty() {
        return Err(unrecognised(spec, "identifier is empty"));
    }
    if spec.chars().any(char::is_control) {
        return Err(unrecognised(spec, "identifier contains control characters"));
    }

    if spec.starts_with('/') {
        let trimmed = spec.trim_end_matches('/');
        let normalized = if trimmed.is_empty() { "/" } else { trimmed };
        return Ok((Kind::Share, normalized.to_owned()));
    }

    if spec.bytes().all(|b| b.is_ascii_digit()) {
        return Ok((Kind::Id, spec.to_owned()));
    }

    if let Some((dataset, name)) = spec.split_once('@') {
        if name.is_empty() {
            return Err(unrecognised(spec, "snapshot name after `@` is empty"));
        }
        if !is_valid_component(name) {
            return Err(unrecognised(spec, "snapshot name contains invalid characters"));
        }
        if dataset.is_empty() {
            return Ok((Kind::SnapshotOnly, spec.to_owned()));
        }
        let dataset = normalize_path(spec, dataset)?;
        return Ok((Kind::Snapshot, format!("{dataset}@{name}")));
    }

    let normalized = normalize_path(spec, spec)?;
    let kind = if normalized.contains('/') {
        Kind::Dataset
    } else {
        Kind::Pool
    };
    Ok((kind, normalized))
}

/// Validates a `pool/child/...` path and drops trailing slashes.
fn normalize_path(spec: &str, path: &str) -> Result<String> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(unrecognised(spec, "dataset path is empty"));
    }
    let mut components = trimmed.split('/');
    let pool = components.next().unwrap_or_default();
    if !pool.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(unrecognised(spec, "pool names must begin with a letter"));
    }
    for component in std::iter::once(pool).chain(components) {
        if component.is_empty() {
            return Err(unrecognised(spec, "dataset path has an empty component"));
        }
        if !is_valid_component(component) {
            return Err(unrecognised(spec, "dataset path contains invalid characters"));
        }
    }
    Ok(trimmed.to_owned())
}

/// A bare snapshot name, as given without its dataset.
pub fn is_valid_snapshot_name(name: &str) -> bool {
    !name.is_empty() && is_valid_component(name)
}

fn is_valid_component(component: &str) -> bool {
    component
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.' | ' '))
}

fn unrecognised(spec: &str, reason: &str) -> Error {
    Error::Namespec {
        spec: spec.to_owned(),
        kind: None,
        message: format!("unrecognised namespec `{spec}`: {reason}"),
    }
}
