//! Key-level diffs of the named indices.

use serde::de::DeserializeOwned;
use serde::Serialize;
use strata_index::{read_key, IndexPointer, Indices};
use strata_store::Database;
use strata_types::RevisionNumber;

use crate::error::{DiffError, DiffResult};
use crate::traverser::diff;

/// Keys of the leaves below `root` written after revision `old`.
pub fn diff_keys<K: DeserializeOwned>(
    db: &Database,
    root: &IndexPointer,
    old: RevisionNumber,
) -> DiffResult<Vec<K>> {
    diff(db, root, old)?
        .into_iter()
        .map(|leaf| read_key(db, leaf).map_err(DiffError::from))
        .collect()
}

/// Keys added to (or reassigned in) each named index between two revisions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IndicesDiff {
    pub new: RevisionNumber,
    pub old: RevisionNumber,
    pub write: Vec<String>,
    /// Digests as 32 hex digits.
    pub digest: Vec<String>,
    pub name: Vec<String>,
}

impl IndicesDiff {
    pub fn is_empty(&self) -> bool {
        self.write.is_empty() && self.digest.is_empty() && self.name.is_empty()
    }
}

/// Diff every named index of revision `new` against revision `old`.
pub fn diff_indices(
    db: &Database,
    new: RevisionNumber,
    old: RevisionNumber,
) -> DiffResult<IndicesDiff> {
    let indices = Indices::open(db, new)?;
    let digests: Vec<u128> = diff_keys(db, indices.digest.root(), old)?;
    Ok(IndicesDiff {
        new,
        old,
        write: diff_keys(db, indices.write.root(), old)?,
        digest: digests.iter().map(|d| format!("{d:032x}")).collect(),
        name: diff_keys(db, indices.name.root(), old)?,
    })
}
