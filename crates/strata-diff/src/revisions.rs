use strata_types::{RevisionNumber, HEAD_REVISION};

use crate::error::{DiffError, DiffResult};

/// Turn optional `new`/`old` revision arguments into a concrete pair with
/// `new >= old`.
///
/// `new` defaults to the current revision and `old` to the one before `new`.
/// [`HEAD_REVISION`] stands for the current revision in either position.
pub fn resolve_revisions(
    new: Option<RevisionNumber>,
    old: Option<RevisionNumber>,
    current: RevisionNumber,
) -> DiffResult<(RevisionNumber, RevisionNumber)> {
    let check = |revision: RevisionNumber| match revision {
        HEAD_REVISION => Ok(current),
        r if r > current => Err(DiffError::UnknownRevision {
            requested: r,
            current,
        }),
        r => Ok(r),
    };

    let new = check(new.unwrap_or(HEAD_REVISION))?;
    let old = match old {
        Some(old) => check(old)?,
        None => new.saturating_sub(1),
    };
    Ok(if old > new { (old, new) } else { (new, old) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert_eq!(resolve_revisions(None, None, 5).unwrap(), (5, 4));
        assert_eq!(resolve_revisions(Some(3), None, 5).unwrap(), (3, 2));
        assert_eq!(resolve_revisions(None, None, 0).unwrap(), (0, 0));
    }

    #[test]
    fn head_means_current() {
        assert_eq!(resolve_revisions(Some(HEAD_REVISION), Some(1), 5).unwrap(), (5, 1));
        assert_eq!(resolve_revisions(Some(2), Some(HEAD_REVISION), 5).unwrap(), (5, 2));
    }

    #[test]
    fn pair_is_ordered() {
        assert_eq!(resolve_revisions(Some(1), Some(4), 5).unwrap(), (4, 1));
    }

    #[test]
    fn future_revision_is_rejected() {
        let err = resolve_revisions(Some(9), None, 5).unwrap_err();
        assert!(matches!(
            err,
            DiffError::UnknownRevision { requested: 9, current: 5 }
        ));
        assert!(resolve_revisions(None, Some(6), 5).is_err());
    }
}
