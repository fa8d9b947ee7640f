//! Session-state staging for sub-conversations.
//!
//! A request handler may spawn a child conversation (for example, an inner
//! authentication method tunneled inside an outer one).  The child's session
//! payload can be parked inside the parent's persistable-data facility under
//! a caller-chosen `(owner, tag)` key, so it survives independently of the
//! child request's own lifetime.  Before a child is cut loose, [`detach`]
//! settles what happens to any payload it still holds.

use crate::attrs::AttrList;
use crate::request::{DataKey, DataList, Request};

/// Key under which the child's session list rides inside the staged bundle.
const SESSION_STASH: DataKey = DataKey::new("session_state.subrequest", 0);

/// Stage the child's session payload in its parent.
///
/// The child's session attributes and all of its persistable module data
/// move into `parent` as one bundle under `(owner, tag)`.  A parent may hold
/// several children's bundles at once; `owner` names the module that spawned
/// the child and `tag` tells its children apart.
pub fn store_in_parent(child: &mut Request, parent: &mut Request, owner: &'static str, tag: u32) {
    // Park the session list in the child's own data facility first, so the
    // whole lot travels as a single value.
    let session = std::mem::take(&mut child.session);
    child.data.add(SESSION_STASH, true, session);

    let staged = child.data.take_persistable();
    parent.data.add(DataKey::new(owner, tag), true, staged);

    tracing::trace!(
        child = child.number,
        parent = parent.number,
        owner,
        tag,
        "subrequest state saved to parent"
    );
}

/// Move a staged bundle back out of the parent into the child.
///
/// The inverse of [`store_in_parent`].  Does nothing when no bundle is
/// staged under `(owner, tag)`.
pub fn restore_to_child(child: &mut Request, parent: &mut Request, owner: &'static str, tag: u32) {
    let Some(staged) = parent.data.take::<DataList>(DataKey::new(owner, tag)) else {
        return;
    };

    child.data.restore(staged);
    if let Some(session) = child.data.take::<AttrList>(SESSION_STASH) {
        child.session = session;
    }

    tracing::trace!(
        child = child.number,
        parent = parent.number,
        owner,
        tag,
        "subrequest state restored from parent"
    );
}

/// Settle a child's payload before the child and parent part ways.
///
/// With `will_free` the caller promises to drop the request immediately and
/// not touch its payload again: the session list and persistable data are
/// discarded outright.  Otherwise the child simply keeps its payload — the
/// containers are owned by the child alone, so outliving the parent is safe
/// without copying anything.
pub fn detach(child: &mut Request, will_free: bool) {
    if will_free {
        child.session.clear();
        child.data.clear_persistable();
        tracing::trace!(child = child.number, "subrequest state dropped on detach");
    }
}
