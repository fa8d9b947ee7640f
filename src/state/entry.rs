//! A single tracked session entry.

use std::time::Instant;

use crate::attrs::AttrList;
use crate::request::DataList;
use crate::state::key::StateKey;

/// Payload parked in an entry between rounds.
#[derive(Debug, Default)]
pub(crate) struct EntryPayload {
    /// Session-state attributes for the conversation.
    pub session: AttrList,
    /// Persistable module data.
    pub data: DataList,
}

/// Server-side record owning the session payload for one in-progress
/// conversation round.
///
/// `payload` is `Some` while the entry sits idle between rounds and `None`
/// exactly while a live request has the data checked out; `thawed_by` records
/// that request's number.  It is an identifier, never a reference — the
/// request it names may be long gone by the time anyone looks.
#[derive(Debug)]
pub(crate) struct StateEntry {
    /// Process-local entry number, monotonic across the store's lifetime.
    pub id: u64,
    pub key: StateKey,
    /// Number of the first request in this conversation.
    pub seq_start: u64,
    /// When this entry should be swept.
    pub cleanup: Instant,
    /// Rounds completed so far in this conversation.
    pub tries: u32,
    pub payload: Option<EntryPayload>,
    pub thawed_by: Option<u64>,
}
