/// Identifier of one committed state of a store.
///
/// Revision `0` is the empty store created when the file is first
/// initialized; every successful commit adds one.
pub type RevisionNumber = u32;

/// Sentinel meaning "the most recent revision".
pub const HEAD_REVISION: RevisionNumber = RevisionNumber::MAX;
