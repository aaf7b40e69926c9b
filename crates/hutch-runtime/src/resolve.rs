//! Resolution of abbreviated container identifiers.
//!
//! A user may type any literal prefix of an ID. Exactly one match is
//! required; ambiguity is always reported, never settled by picking one.

use hutch_common::error::{HutchError, Result};
use hutch_common::types::ContainerId;

use crate::state::{ContainerRecord, RecordStore};

/// Picks the single ID in `ids` that starts with `prefix`.
///
/// # Errors
///
/// Returns [`HutchError::InvalidArgument`] for an empty prefix,
/// [`HutchError::NotFound`] when nothing matches, and
/// [`HutchError::Ambiguous`] when more than one ID matches.
pub fn match_prefix<'a>(ids: &'a [ContainerId], prefix: &str) -> Result<&'a ContainerId> {
    if prefix.is_empty() {
        return Err(HutchError::InvalidArgument {
            message: "container ID must not be empty".into(),
        });
    }
    let matches: Vec<&ContainerId> = ids
        .iter()
        .filter(|id| id.as_str().starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [] => Err(HutchError::NotFound { id: prefix.into() }),
        [only] => Ok(*only),
        many => Err(HutchError::Ambiguous {
            prefix: prefix.into(),
            candidates: many.iter().map(ToString::to_string).collect(),
        }),
    }
}

/// Resolves `prefix` against the store and reads the matching record.
///
/// # Errors
///
/// Returns the errors of [`match_prefix`], or an error if the store
/// cannot be listed or the record cannot be read.
pub fn resolve(store: &RecordStore, prefix: &str) -> Result<ContainerRecord> {
    let ids = store.ids()?;
    let id = match_prefix(&ids, prefix)?;
    tracing::debug!(prefix, id = %id, "identifier resolved");
    store.read(id)
}
