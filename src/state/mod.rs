//! Multi-round session state tracking.
//!
//! The pieces, leaves first: the [`key`] codec derives or mints the
//! fixed-width binary key behind the opaque token; an entry owns one
//! conversation's parked payload; the [`StateStore`] keys entries for
//! lookup, sweeps the ones that expired, and runs the transfer protocol
//! (save / restore / discard) that moves payload ownership between requests
//! and entries.  [`subrequest`] stages a child conversation's payload inside
//! its parent.

pub mod key;
pub mod subrequest;

mod entry;
mod store;

pub use store::StateStore;
