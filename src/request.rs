//! Request-side containers the transfer protocol moves payload between.
//!
//! A [`Request`] lives for one round of a multi-round conversation.  Its
//! `session` attribute list and the persistable part of its module [`data`]
//! are the payload that survives across rounds by being handed to a state
//! entry at the end of the round and back to the next round's request.
//!
//! [`data`]: Request::data

use std::any::Any;
use std::fmt;

use crate::attrs::AttrList;

/// Key under which a module stashes opaque data on a request.
///
/// `owner` names the module or facility that owns the value; `tag` lets one
/// owner keep several values apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataKey {
    pub owner: &'static str,
    pub tag: u32,
}

impl DataKey {
    pub const fn new(owner: &'static str, tag: u32) -> Self {
        Self { owner, tag }
    }
}

/// One opaque module-owned value.
struct Datum {
    key: DataKey,
    /// Whether this value survives the round by moving into a state entry.
    persist: bool,
    value: Box<dyn Any + Send>,
}

impl fmt::Debug for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datum")
            .field("key", &self.key)
            .field("persist", &self.persist)
            .finish_non_exhaustive()
    }
}

/// Opaque module data attached to a request (or parked in a state entry).
///
/// Values are stored type-erased; retrieval removes the value from the list,
/// matching the hand-it-back-once discipline the rest of the store uses.
#[derive(Debug, Default)]
pub struct DataList {
    items: Vec<Datum>,
}

impl DataList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a value under `key`.  An existing value under the same key is
    /// replaced (and dropped).
    pub fn add<T: Any + Send>(&mut self, key: DataKey, persist: bool, value: T) {
        self.items.retain(|d| d.key != key);
        self.items.push(Datum {
            key,
            persist,
            value: Box::new(value),
        });
    }

    /// Take the value stored under `key`, removing it from the list.
    ///
    /// Returns `None` when nothing is stored under `key` or when the stored
    /// value is of a different type.
    pub fn take<T: Any + Send>(&mut self, key: DataKey) -> Option<T> {
        let pos = self.items.iter().position(|d| d.key == key)?;
        let datum = self.items.remove(pos);
        let persist = datum.persist;
        match datum.value.downcast::<T>() {
            Ok(boxed) => Some(*boxed),
            Err(value) => {
                // Wrong type asked for: put it back rather than losing it.
                tracing::warn!(
                    owner = key.owner,
                    tag = key.tag,
                    "module data retrieved with mismatched type"
                );
                self.items.insert(pos, Datum { key, persist, value });
                None
            }
        }
    }

    /// Split off every persistable value, leaving the transient ones behind.
    pub fn take_persistable(&mut self) -> DataList {
        let mut persistable = Vec::new();
        let mut transient = Vec::new();
        for datum in self.items.drain(..) {
            if datum.persist {
                persistable.push(datum);
            } else {
                transient.push(datum);
            }
        }
        self.items = transient;
        DataList { items: persistable }
    }

    /// Move every value from `other` back into this list.
    pub fn restore(&mut self, mut other: DataList) {
        self.items.append(&mut other.items);
    }

    /// Drop every persistable value.
    pub fn clear_persistable(&mut self) {
        self.items.retain(|d| !d.persist);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// One round's request, as seen by the session-state store.
///
/// Only the fields the transfer protocol touches are modeled here; packet
/// decoding, reply encoding and the authentication state machine live with
/// the embedding server.
#[derive(Debug, Default)]
pub struct Request {
    /// Process-local request number, used as the weak back-reference for the
    /// duplicate-restore check.
    pub number: u64,

    /// Number of the first request in this conversation.  Copied from the
    /// entry on restore, stored into the successor entry on save.
    pub seq_start: u64,

    /// Name of the virtual server handling this request.  Tokens are scoped
    /// to the virtual server that minted them.
    pub server: String,

    /// Attributes of the inbound message (carries the echoed token, if any).
    pub packet: AttrList,

    /// Attributes of the outbound message (receives the minted token).
    pub reply: AttrList,

    /// Session-state attributes for this conversation.
    pub session: AttrList,

    /// Module data attached to this request.
    pub data: DataList,
}

impl Request {
    pub fn new(number: u64, server: impl Into<String>) -> Self {
        Self {
            number,
            server: server.into(),
            ..Self::default()
        }
    }
}
