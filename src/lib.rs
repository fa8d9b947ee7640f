//! Session-state store for multi-round network authentication servers.
//!
//! Challenge/response protocols are stateless on the wire: each round the
//! client proves itself, and the server must recall what happened in the
//! previous round without keeping that round's request alive.  This crate
//! implements the store that makes that work.  When a round finishes,
//! [`StateStore::save`] parks the request's session payload in a keyed entry
//! and puts a compact opaque token on the reply; when the client echoes the
//! token on the next round, [`StateStore::restore`] hands the payload to the
//! new request.  A final accept/reject ends the conversation through
//! [`StateStore::discard`], and entries nobody returns to are swept once
//! their timeout passes.
//!
//! The store holds no network code and persists nothing: it is an in-process
//! component consumed by the surrounding authentication state machine.
//! Tokens are opaque but not confidential, and are scoped to the virtual
//! server that minted them.
//!
//! ```
//! use statekeeper::{AttrId, Request, StateConfig, StateStore};
//!
//! const STATE: AttrId = AttrId(24);
//! const REPLY_MESSAGE: AttrId = AttrId(18);
//!
//! let store = StateStore::new(&StateConfig::default(), STATE);
//!
//! // Round one: issue a challenge, park the session state.
//! let mut first = Request::new(1, "default");
//! first.seq_start = 1;
//! first.session.add(REPLY_MESSAGE, b"challenge sent".to_vec());
//! store.save(&mut first).unwrap();
//! let token = first.reply.find(STATE).unwrap().value.clone();
//!
//! // Round two: the client echoes the token, the state comes back.
//! let mut second = Request::new(2, "default");
//! second.packet.add(STATE, token);
//! assert!(store.restore(&mut second).unwrap());
//! assert!(second.session.find(REPLY_MESSAGE).is_some());
//! ```

pub mod attrs;
pub mod config;
pub mod error;
pub mod request;
pub mod state;

pub use attrs::{AttrId, AttrList, Attribute};
pub use config::StateConfig;
pub use error::{Result, StateError};
pub use request::{DataKey, DataList, Request};
pub use state::key::{StateKey, STATE_KEY_LEN};
pub use state::StateStore;
