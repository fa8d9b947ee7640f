//! The session-state store.
//!
//! For each round of a multi-round authentication method (challenge/response,
//! one-time-password flows) an entry parks the conversation's payload while
//! the server is between rounds.  [`StateStore::save`] moves the payload from
//! a finished request into an entry and puts the entry's token on the reply;
//! when the client echoes the token, [`StateStore::restore`] moves the payload
//! into the new round's request.  Ownership travels:
//!
//! ```text
//! request -> entry -> request -> entry -> request -> drop
//!        \-> reply            \-> reply          \-> final accept/reject
//! ```
//!
//! Entries that are never finished expire: every creation sweeps the expiry
//! queue from the head, which is ordered by deadline because deadlines are
//! `now + timeout` and insertion is monotonic in time.
//!
//! ## Locking
//!
//! One mutex serializes every mutation of the lookup index and the expiry
//! queue.  Entry allocation, entry freeing (which may run arbitrary `Drop`
//! impls for module data) and key generation all happen outside the critical
//! section; anything the new entry inherits from its predecessor is
//! snapshotted before the lock is released.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};

use crate::attrs::AttrId;
use crate::config::StateConfig;
use crate::error::StateError;
use crate::request::Request;
use crate::state::entry::{EntryPayload, StateEntry};
use crate::state::key::{hash32, StateKey, STATE_KEY_LEN};

/// Keyed store of in-progress conversation state.
///
/// Safe to share across worker threads; every operation is a bounded,
/// synchronous critical section.
pub struct StateStore {
    max_sessions: u32,
    timeout: Duration,
    server_id: u8,
    /// Identity of the attribute the token travels in.
    token_attr: AttrId,
    /// Next entry id; doubles as the created-entries counter.
    next_id: AtomicU64,
    timed_out: AtomicU64,
    inner: Mutex<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    /// Lookup index, keyed by the post-XOR binary key.
    index: HashMap<StateKey, u64>,
    /// Entry storage, keyed by entry id so ids stay stable while entries
    /// move between index and queue bookkeeping.
    entries: HashMap<u64, StateEntry>,
    /// Expiry queue, FIFO by insertion.  Ids whose entries were unlinked
    /// out-of-band linger here until the next sweep skips over them.
    queue: VecDeque<u64>,
}

impl StoreInner {
    /// Remove an entry from the index and entry table.  The queue slot is
    /// left behind for the next sweep to drop.
    fn unlink(&mut self, id: u64) -> Option<StateEntry> {
        let entry = self.entries.remove(&id)?;
        self.index.remove(&entry.key);
        tracing::trace!(id, "state entry unlinked");
        Some(entry)
    }

    /// Walk the queue head, unlinking every entry whose deadline has passed,
    /// except `exclude` (the entry currently being rotated).  Stops at the
    /// first entry whose deadline is still in the future — everything behind
    /// it is younger.  Unlinked entries are pushed onto `to_free` so the
    /// caller can drop them off the lock.  Returns how many timed out.
    fn sweep(&mut self, now: Instant, exclude: Option<u64>, to_free: &mut Vec<StateEntry>) -> u64 {
        let mut timed_out = 0;
        let mut excluded = None;
        while let Some(id) = self.queue.pop_front() {
            if Some(id) == exclude {
                excluded = Some(id);
                continue;
            }
            if !self.entries.contains_key(&id) {
                // Unlinked earlier by discard or rotation; drop the slot.
                continue;
            }
            let expired = self
                .entries
                .get(&id)
                .is_some_and(|entry| entry.cleanup < now);
            if expired {
                if let Some(entry) = self.unlink(id) {
                    to_free.push(entry);
                    timed_out += 1;
                }
                continue;
            }
            self.queue.push_front(id);
            break;
        }
        // Put the excluded entry back where the head used to be; it was in
        // front of everything still queued.
        if let Some(id) = excluded {
            self.queue.push_front(id);
        }
        timed_out
    }
}

impl StateStore {
    /// Create a store tracking state carried in the `token_attr` attribute.
    pub fn new(config: &StateConfig, token_attr: AttrId) -> Self {
        Self {
            max_sessions: config.max_sessions,
            timeout: config.timeout(),
            server_id: config.server_id,
            token_attr,
            next_id: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// The attribute identity tokens are read from and written to.
    pub fn token_attr(&self) -> AttrId {
        self.token_attr
    }

    /// Whether a live entry exists for `token` under virtual server
    /// `server`.  Absence is not an error: it means "no prior state"
    /// (first round, expired, or unknown token).
    pub fn has_entry(&self, token: &[u8], server: &str) -> bool {
        let key = Self::lookup_key(token, server);
        self.inner.lock().index.contains_key(&key)
    }

    /// Derive the index key for a caller-supplied token as seen from
    /// `server`.  Reverses the XOR applied when the entry was inserted.
    fn lookup_key(token: &[u8], server: &str) -> StateKey {
        let mut key = StateKey::derive(token);
        key.xor_server_hash(hash32(server));
        key
    }

    /// Move the payload of the entry matching the request's inbound token
    /// into the request.
    ///
    /// Returns `Ok(true)` when payload was checked out, `Ok(false)` when the
    /// request carries no token or no entry matches.  A token whose entry is
    /// already checked out is refused with
    /// [`StateError::DuplicateRestore`] — a replayed token or a race, logged
    /// and never fatal; the caller proceeds as if there were no prior state.
    pub fn restore(&self, request: &mut Request) -> Result<bool, StateError> {
        let key = match request.packet.find(self.token_attr) {
            Some(attr) => Self::lookup_key(&attr.value, &request.server),
            None => {
                tracing::trace!(number = request.number, "no state token, nothing to restore");
                if request.seq_start == 0 {
                    request.seq_start = request.number;
                }
                return Ok(false);
            }
        };

        let previous_session;
        {
            let mut inner = self.inner.lock();
            let Some(id) = inner.index.get(&key).copied() else {
                return Ok(false);
            };
            let Some(entry) = inner.entries.get_mut(&id) else {
                return Ok(false);
            };
            if let Some(by) = entry.thawed_by {
                tracing::warn!(
                    number = request.number,
                    thawed_by = by,
                    "state entry already thawed by an in-flight request"
                );
                return Err(StateError::DuplicateRestore { by });
            }
            let Some(payload) = entry.payload.take() else {
                // thawed_by unset with payload gone would be an invariant
                // breach; treat it as no prior state.
                tracing::warn!(id, "state entry has no payload to check out");
                return Ok(false);
            };

            request.seq_start = entry.seq_start;
            previous_session = std::mem::replace(&mut request.session, payload.session);
            request.data.restore(payload.data);
            entry.thawed_by = Some(request.number);
        }

        // Whatever session attributes the request already held are dropped
        // here, off the lock.
        drop(previous_session);

        tracing::debug!(
            number = request.number,
            attrs = request.session.len(),
            "session state restored"
        );
        Ok(true)
    }

    /// Move the request's session payload into a new (or rotated) entry and
    /// put the entry's token on the reply.
    ///
    /// A request with no session attributes and no persistable module data
    /// is a stateless exchange: nothing happens and no entry is created.
    /// On failure the persistable data is handed back to the request
    /// unchanged, so nothing is silently lost.
    pub fn save(&self, request: &mut Request) -> Result<(), StateError> {
        let data = request.data.take_persistable();
        if request.session.is_empty() && data.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            number = request.number,
            attrs = request.session.len(),
            "saving session state"
        );

        let old_key = request
            .packet
            .find(self.token_attr)
            .map(|attr| Self::lookup_key(&attr.value, &request.server));

        let inner = self.inner.lock();
        let old = old_key.and_then(|key| inner.index.get(&key).copied());

        match self.entry_create(inner, request, old) {
            Ok((mut inner, id)) => {
                if let Some(entry) = inner.entries.get_mut(&id) {
                    entry.seq_start = request.seq_start;
                    entry.payload = Some(EntryPayload {
                        session: std::mem::take(&mut request.session),
                        data,
                    });
                } else {
                    // Cannot happen: entry_create inserted it under this
                    // same lock acquisition.
                    tracing::error!(id, "freshly created state entry missing");
                    request.data.restore(data);
                }
                Ok(())
            }
            Err(err) => {
                tracing::error!(number = request.number, error = %err, "creating state entry failed");
                request.data.restore(data);
                Err(err)
            }
        }
    }

    /// Discard the entry matching the request's inbound token, called when a
    /// conversation terminates (final accept/reject).
    ///
    /// The request's own session containers are reset as well: a handler may
    /// have parked more session data after the final decision was made.
    pub fn discard(&self, request: &mut Request) {
        let key = match request.packet.find(self.token_attr) {
            Some(attr) => Self::lookup_key(&attr.value, &request.server),
            None => return,
        };

        let entry = {
            let mut inner = self.inner.lock();
            let Some(id) = inner.index.get(&key).copied() else {
                return;
            };
            inner.unlink(id)
        };

        // Freeing the entry's payload may run module `Drop` impls; keep it
        // off the lock.
        drop(entry);

        request.session.clear();
        request.data.clear_persistable();

        tracing::debug!(number = request.number, "state discarded");
    }

    /// Allocate, key and link a new entry, rotating `old` if given.
    ///
    /// Takes the store lock by value and hands it back still held on
    /// success, so the caller can attach payload without a window in which
    /// another thread could observe the entry half-built.  The lock is
    /// dropped in the middle for the bulk free of swept entries and for key
    /// generation.
    fn entry_create<'a>(
        &'a self,
        mut inner: MutexGuard<'a, StoreInner>,
        request: &mut Request,
        old: Option<u64>,
    ) -> Result<(MutexGuard<'a, StoreInner>, u64), StateError> {
        let now = Instant::now();
        let mut to_free = Vec::new();

        let swept = inner.sweep(now, old, &mut to_free);
        if swept > 0 {
            self.timed_out.fetch_add(swept, Ordering::Relaxed);
        }

        // Checked here, enforced after the frees below: returning early with
        // unlinked-but-unfreed entries queued up would leak them.
        let too_many = old.is_none() && inner.index.len() as u32 >= self.max_sessions;

        // Snapshot what the successor inherits; once the lock is released
        // the predecessor may be anything.
        let mut previous = None;
        if let Some(old_id) = old {
            if let Some(old_entry) = inner.entries.get(&old_id) {
                previous = Some((old_entry.key, old_entry.tries));
                let consumed = old_entry
                    .payload
                    .as_ref()
                    .is_none_or(|payload| payload.data.is_empty());
                if consumed {
                    if let Some(old_entry) = inner.unlink(old_id) {
                        to_free.push(old_entry);
                    }
                }
            }
        }

        drop(inner);

        if swept > 0 {
            tracing::debug!(count = swept, "cleaned up timed out state entries");
        }

        // Freeing may run arbitrary module destructors; do the whole batch
        // without the lock.
        drop(to_free);

        if too_many {
            tracing::error!(
                max_sessions = self.max_sessions,
                "failed inserting state entry: at maximum ongoing session limit"
            );
            return Err(StateError::CapacityExceeded {
                max_sessions: self.max_sessions,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // Some modules pre-set their own token on the reply; honor it in
        // preference to minting.  Otherwise mint, carrying the predecessor's
        // random identity forward, and attach the token to the reply.
        // Either way the reply now holds the pre-XOR value the client sees.
        let (key, tries) = match request.reply.find(self.token_attr) {
            Some(attr) => {
                if attr.value.len() > STATE_KEY_LEN {
                    tracing::warn!(
                        len = attr.value.len(),
                        max = STATE_KEY_LEN,
                        "state token too long, storing its content hash"
                    );
                }
                (StateKey::derive(&attr.value), 0)
            }
            None => {
                let (key, tries) = StateKey::mint(previous, self.server_id);
                request.reply.add(self.token_attr, key.as_bytes().to_vec());
                (key, tries)
            }
        };

        tracing::debug!(
            id,
            value = %key,
            expires_in_secs = self.timeout.as_secs(),
            "state entry created"
        );

        let mut entry = StateEntry {
            id,
            key,
            seq_start: 0,
            cleanup: now + self.timeout,
            tries,
            payload: None,
            thawed_by: None,
        };

        let mut inner = self.inner.lock();

        // Scope the key to the minting virtual server.  This must happen
        // after the reply value is fixed and immediately before insertion;
        // lookups XOR the hash back in.
        entry.key.xor_server_hash(hash32(&request.server));

        if inner.index.contains_key(&entry.key) {
            drop(inner);
            tracing::error!(id, "failed inserting state entry: key collision");
            request.reply.remove(self.token_attr);
            return Err(StateError::InsertConflict);
        }
        inner.index.insert(entry.key, id);
        inner.entries.insert(id, entry);
        inner.queue.push_back(id);

        Ok((inner, id))
    }

    // ── Observability ───────────────────────────────────────────────

    /// Number of entries created over the store's lifetime.
    pub fn entries_created(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }

    /// Number of entries swept because they timed out.
    pub fn entries_timed_out(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }

    /// Number of entries currently tracked.
    pub fn entries_tracked(&self) -> u32 {
        self.inner.lock().index.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::DataKey;
    use std::sync::Arc;

    const TOKEN: AttrId = AttrId(24);
    const SESSION_ATTR: AttrId = AttrId(1);
    const MODULE_KEY: DataKey = DataKey::new("otp", 0);

    fn store(max_sessions: u32, timeout_secs: u64) -> StateStore {
        let config = StateConfig {
            max_sessions,
            timeout_secs,
            server_id: 42,
            thread_safe: true,
        };
        StateStore::new(&config, TOKEN)
    }

    fn request(number: u64) -> Request {
        Request::new(number, "default")
    }

    /// A request for the next round: the previous reply's token echoed back
    /// on the inbound packet.
    fn next_round(previous: &Request, number: u64) -> Request {
        let mut request = Request::new(number, previous.server.clone());
        if let Some(attr) = previous.reply.find(TOKEN) {
            request.packet.add(TOKEN, attr.value.clone());
        }
        request
    }

    fn reply_token(request: &Request) -> Vec<u8> {
        request
            .reply
            .find(TOKEN)
            .map(|attr| attr.value.clone())
            .expect("reply carries a state token")
    }

    #[test]
    fn round_trip_restores_payload() {
        let store = store(16, 60);

        let mut first = request(7);
        first.seq_start = 7;
        first.session.add(SESSION_ATTR, b"challenge".to_vec());
        first.data.add(MODULE_KEY, true, 31u32);
        store.save(&mut first).unwrap();

        // Payload moved out of the request and into the entry.
        assert!(first.session.is_empty());
        assert_eq!(store.entries_tracked(), 1);

        let mut second = next_round(&first, 9);
        assert_eq!(store.restore(&mut second), Ok(true));
        assert_eq!(second.seq_start, 7);
        assert_eq!(
            second.session.find(SESSION_ATTR).map(|a| a.value.clone()),
            Some(b"challenge".to_vec())
        );
        assert_eq!(second.data.take::<u32>(MODULE_KEY), Some(31));
    }

    #[test]
    fn stateless_save_is_a_noop() {
        let store = store(16, 60);
        let mut req = request(1);
        store.save(&mut req).unwrap();

        assert!(req.reply.find(TOKEN).is_none());
        assert_eq!(store.entries_tracked(), 0);
        assert_eq!(store.entries_created(), 0);
    }

    #[test]
    fn save_mints_key_width_token() {
        let store = store(16, 60);
        let mut req = request(1);
        req.session.add(SESSION_ATTR, vec![1]);
        store.save(&mut req).unwrap();

        let token = reply_token(&req);
        assert_eq!(token.len(), STATE_KEY_LEN);
        assert!(store.has_entry(&token, "default"));
    }

    #[test]
    fn preset_tokens_resolve_at_any_length() {
        // Write path and read path must derive the same key whether the
        // token is undersized, exact, or hashed down from oversize.
        for len in [0usize, STATE_KEY_LEN - 1, STATE_KEY_LEN, STATE_KEY_LEN + 1] {
            let store = store(16, 60);
            let token: Vec<u8> = (0..len as u8).map(|b| b.wrapping_add(3)).collect();

            let mut first = request(1);
            first.session.add(SESSION_ATTR, vec![9]);
            first.reply.add(TOKEN, token.clone());
            store.save(&mut first).unwrap();

            // The preset value went out unchanged.
            assert_eq!(reply_token(&first), token);

            let mut second = next_round(&first, 2);
            assert_eq!(store.restore(&mut second), Ok(true), "len {len}");
        }
    }

    #[test]
    fn virtual_server_isolation() {
        let store = store(16, 60);

        let mut first = Request::new(1, "site-a");
        first.session.add(SESSION_ATTR, vec![1]);
        store.save(&mut first).unwrap();
        let token = reply_token(&first);

        assert!(!store.has_entry(&token, "site-b"));
        let mut wrong_site = Request::new(2, "site-b");
        wrong_site.packet.add(TOKEN, token.clone());
        assert_eq!(store.restore(&mut wrong_site), Ok(false));
        assert!(wrong_site.session.is_empty());

        assert!(store.has_entry(&token, "site-a"));
        let mut right_site = Request::new(3, "site-a");
        right_site.packet.add(TOKEN, token);
        assert_eq!(store.restore(&mut right_site), Ok(true));
    }

    #[test]
    fn capacity_ceiling_rejects_without_losing_payload() {
        let store = store(3, 60);

        for number in 0..3 {
            let mut req = request(number);
            req.session.add(SESSION_ATTR, vec![number as u8]);
            store.save(&mut req).unwrap();
        }
        assert_eq!(store.entries_tracked(), 3);

        let mut overflow = request(99);
        overflow.session.add(SESSION_ATTR, vec![9]);
        overflow.data.add(MODULE_KEY, true, 5u32);
        assert_eq!(
            store.save(&mut overflow),
            Err(StateError::CapacityExceeded { max_sessions: 3 })
        );

        // Never above the ceiling, and the request kept its payload.
        assert_eq!(store.entries_tracked(), 3);
        assert!(!overflow.session.is_empty());
        assert_eq!(overflow.data.take::<u32>(MODULE_KEY), Some(5));
        assert!(overflow.reply.find(TOKEN).is_none());
    }

    #[test]
    fn rotation_is_exempt_from_the_ceiling() {
        let store = store(1, 60);

        let mut first = request(1);
        first.session.add(SESSION_ATTR, vec![1]);
        store.save(&mut first).unwrap();

        let mut second = next_round(&first, 2);
        store.restore(&mut second).unwrap();
        second.session.add(SESSION_ATTR, vec![2]);
        store.save(&mut second).unwrap();

        assert_eq!(store.entries_tracked(), 1);
    }

    #[test]
    fn expiry_sweeps_timed_out_entries() {
        let store = store(16, 0);

        let mut first = request(1);
        first.session.add(SESSION_ATTR, vec![1]);
        store.save(&mut first).unwrap();
        let stale_token = reply_token(&first);

        // Let the zero-second deadline pass, then trigger a sweep with an
        // unrelated create.
        std::thread::sleep(Duration::from_millis(5));
        let mut second = request(2);
        second.session.add(SESSION_ATTR, vec![2]);
        store.save(&mut second).unwrap();

        assert_eq!(store.entries_timed_out(), 1);
        assert_eq!(store.entries_tracked(), 1);
        assert!(!store.has_entry(&stale_token, "default"));
    }

    #[test]
    fn sweep_spares_entries_with_future_deadlines() {
        let store = store(16, 60);

        let mut first = request(1);
        first.session.add(SESSION_ATTR, vec![1]);
        store.save(&mut first).unwrap();

        let mut second = request(2);
        second.session.add(SESSION_ATTR, vec![2]);
        store.save(&mut second).unwrap();

        assert_eq!(store.entries_timed_out(), 0);
        assert_eq!(store.entries_tracked(), 2);
    }

    #[test]
    fn double_restore_is_rejected() {
        let store = store(16, 60);

        let mut first = request(1);
        first.session.add(SESSION_ATTR, b"secret".to_vec());
        store.save(&mut first).unwrap();

        let mut second = next_round(&first, 2);
        assert_eq!(store.restore(&mut second), Ok(true));

        // Same token again without an intervening save: replay or race.
        let mut replay = next_round(&first, 3);
        assert_eq!(
            store.restore(&mut replay),
            Err(StateError::DuplicateRestore { by: 2 })
        );

        // The first restorer's payload is untouched.
        assert_eq!(
            second.session.find(SESSION_ATTR).map(|a| a.value.clone()),
            Some(b"secret".to_vec())
        );
        assert!(replay.session.is_empty());
    }

    #[test]
    fn rotation_chains_tries_and_keeps_identity() {
        let store = store(16, 60);

        let mut first = request(1);
        first.session.add(SESSION_ATTR, vec![1]);
        store.save(&mut first).unwrap();
        let token_1 = reply_token(&first);

        let mut second = next_round(&first, 2);
        store.restore(&mut second).unwrap();
        second.session.add(SESSION_ATTR, vec![2]);
        store.save(&mut second).unwrap();
        let token_2 = reply_token(&second);

        // Round counter advanced, random identity carried forward.
        assert_eq!(token_1[0], 1);
        assert_eq!(token_2[0], 2);
        for i in [2usize, 9, 11, 13, 14, 15] {
            assert_eq!(token_1[i], token_2[i], "byte {i}");
        }

        // The consumed predecessor was unlinked by the rotation.
        assert!(!store.has_entry(&token_1, "default"));
        assert!(store.has_entry(&token_2, "default"));
        assert_eq!(store.entries_tracked(), 1);

        let key = StateStore::lookup_key(&token_2, "default");
        let inner = store.inner.lock();
        let id = inner.index[&key];
        assert_eq!(inner.entries[&id].tries, 1);
    }

    #[test]
    fn rotation_keeps_predecessor_with_unconsumed_data() {
        let store = store(16, 60);

        let mut first = request(1);
        first.session.add(SESSION_ATTR, vec![1]);
        first.data.add(MODULE_KEY, true, 7u32);
        store.save(&mut first).unwrap();
        let token_1 = reply_token(&first);

        // Save against the same token without restoring first: the
        // predecessor still carries persistable data, so it must survive.
        let mut second = next_round(&first, 2);
        second.session.add(SESSION_ATTR, vec![2]);
        store.save(&mut second).unwrap();

        assert!(store.has_entry(&token_1, "default"));
        assert_eq!(store.entries_tracked(), 2);
    }

    #[test]
    fn discard_is_final() {
        let store = store(16, 60);

        let mut first = request(1);
        first.session.add(SESSION_ATTR, vec![1]);
        store.save(&mut first).unwrap();
        let token = reply_token(&first);

        let mut last = next_round(&first, 2);
        store.restore(&mut last).unwrap();
        // A handler parks more data after the final decision; discard must
        // clear it.
        last.session.add(SESSION_ATTR, vec![9]);
        last.data.add(MODULE_KEY, true, 1u32);
        store.discard(&mut last);

        assert!(last.session.is_empty());
        assert!(last.data.is_empty());
        assert!(!store.has_entry(&token, "default"));
        assert_eq!(store.entries_tracked(), 0);

        let mut late = request(3);
        late.packet.add(TOKEN, token);
        assert_eq!(store.restore(&mut late), Ok(false));
    }

    #[test]
    fn duplicate_preset_token_is_an_insert_conflict() {
        let store = store(16, 60);
        let token = vec![0xAA; STATE_KEY_LEN];

        let mut first = request(1);
        first.session.add(SESSION_ATTR, vec![1]);
        first.reply.add(TOKEN, token.clone());
        store.save(&mut first).unwrap();

        let mut second = request(2);
        second.session.add(SESSION_ATTR, vec![2]);
        second.data.add(MODULE_KEY, true, 3u32);
        second.reply.add(TOKEN, token);
        assert_eq!(store.save(&mut second), Err(StateError::InsertConflict));

        // The conflicting token was stripped from the reply and the payload
        // handed back.
        assert!(second.reply.find(TOKEN).is_none());
        assert!(!second.session.is_empty());
        assert_eq!(second.data.take::<u32>(MODULE_KEY), Some(3));
        assert_eq!(store.entries_tracked(), 1);
    }

    #[test]
    fn restore_without_token_defaults_seq_start() {
        let store = store(16, 60);
        let mut req = request(5);
        assert_eq!(store.restore(&mut req), Ok(false));
        assert_eq!(req.seq_start, 5);
    }

    #[test]
    fn counters_track_creates() {
        let store = store(16, 60);
        for number in 0..3 {
            let mut req = request(number);
            req.session.add(SESSION_ATTR, vec![1]);
            store.save(&mut req).unwrap();
        }
        assert_eq!(store.entries_created(), 3);
        assert_eq!(store.entries_timed_out(), 0);
        assert_eq!(store.entries_tracked(), 3);
    }

    #[test]
    fn concurrent_conversations_round_trip() {
        let store = Arc::new(store(256, 60));
        let mut handles = Vec::new();

        for thread in 0..4u64 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for conversation in 0..10u64 {
                    let number = thread * 100 + conversation;

                    let mut first = request(number);
                    first.seq_start = number;
                    first.session.add(SESSION_ATTR, number.to_le_bytes().to_vec());
                    store.save(&mut first).unwrap();

                    let mut second = next_round(&first, number + 1000);
                    assert_eq!(store.restore(&mut second), Ok(true));
                    assert_eq!(second.seq_start, number);
                    assert_eq!(
                        second.session.find(SESSION_ATTR).map(|a| a.value.clone()),
                        Some(number.to_le_bytes().to_vec())
                    );
                    store.discard(&mut second);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.entries_tracked(), 0);
        assert_eq!(store.entries_created(), 40);
    }
}
