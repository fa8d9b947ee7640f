//! State key codec.
//!
//! A state key is the fixed-width internal form of the token echoed between
//! client and server.  It is composite, not plain randomness:
//!
//! | byte  | contents                                                   |
//! |-------|------------------------------------------------------------|
//! | 0     | `tries` — rounds so far, stored as `tries + 1` (truncated) |
//! | 1     | `tx` — bits that changed in the tries byte this round      |
//! | 2     | random                                                     |
//! | 3     | configured server id                                       |
//! | 4–7   | virtual-server hash, XORed in after the token is fixed     |
//! | 8,10,12 | byte 2 XORed with one byte each of the build fingerprint |
//! | 9,11,13–15 | random                                                |
//!
//! The random bytes are generated once per conversation and carried forward
//! verbatim across rotations, so a conversation keeps one identity while its
//! round counter ticks.

use std::fmt;

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Width of a state key (and of a well-formed token) in bytes.
pub const STATE_KEY_LEN: usize = 16;

const TRIES: usize = 0;
const TX: usize = 1;
const R_0: usize = 2;
const SERVER_ID: usize = 3;
const SERVER_HASH: std::ops::Range<usize> = 4..8;
const VX_0: usize = 8;
const VX_1: usize = 10;
const VX_2: usize = 12;

/// Build fingerprint folded into the key's vx bytes.  Purely diagnostic:
/// lets an operator spot tokens minted by a different build.
const fn version_word() -> u32 {
    let v = env!("CARGO_PKG_VERSION").as_bytes();
    let mut acc: u32 = 0;
    let mut i = 0;
    while i < v.len() {
        acc = acc.wrapping_mul(31).wrapping_add(v[i] as u32);
        i += 1;
    }
    acc
}

/// Fixed-width binary key derived from a state token.
///
/// Equality is byte-exact; this is what the lookup index is keyed by.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateKey([u8; STATE_KEY_LEN]);

impl StateKey {
    /// Derive a key from an externally supplied token.
    ///
    /// Exact-width tokens are copied verbatim.  Oversized tokens fall back
    /// to a content hash so the key depends on the entire token.  Undersized
    /// tokens are zero-padded.  The same rule runs on both the write path
    /// and the read path — round-trip correctness depends on that symmetry.
    pub fn derive(token: &[u8]) -> Self {
        let mut bytes = [0u8; STATE_KEY_LEN];
        if token.len() == STATE_KEY_LEN {
            bytes.copy_from_slice(token);
        } else if token.len() > STATE_KEY_LEN {
            bytes = hash128(token);
        } else {
            bytes[..token.len()].copy_from_slice(token);
        }
        Self(bytes)
    }

    /// Mint the key for a new or rotated entry.
    ///
    /// With no predecessor, every byte starts from CSPRNG output.  With a
    /// predecessor, its bytes are carried forward verbatim — the
    /// conversation keeps the same random identity — and the round counter
    /// advances.  Either way the tries/tx/vx/server-id bytes are restamped
    /// from current state.  Returns the key and the new tries count.
    pub fn mint(previous: Option<(StateKey, u32)>, server_id: u8) -> (Self, u32) {
        let (mut bytes, tries) = match previous {
            Some((prev, prev_tries)) => (prev.0, prev_tries + 1),
            None => {
                let mut fresh = [0u8; STATE_KEY_LEN];
                rand::rngs::OsRng.fill_bytes(&mut fresh);
                (fresh, 0)
            }
        };

        bytes[TRIES] = (tries as u8).wrapping_add(1);
        bytes[TX] = bytes[TRIES] ^ tries as u8;

        let vw = version_word();
        bytes[VX_0] = bytes[R_0] ^ ((vw >> 16) & 0xff) as u8;
        bytes[VX_1] = bytes[R_0] ^ ((vw >> 8) & 0xff) as u8;
        bytes[VX_2] = bytes[R_0] ^ (vw & 0xff) as u8;

        bytes[SERVER_ID] = server_id;

        (Self(bytes), tries)
    }

    /// XOR the virtual-server hash into the key.
    ///
    /// Applied once after the outbound token value is fixed and immediately
    /// before index insertion; applied again to the derived key on every
    /// lookup.  A token minted under one virtual server therefore never
    /// resolves under another, even though the index is process-global.
    pub fn xor_server_hash(&mut self, hash: u32) {
        for (byte, h) in self.0[SERVER_HASH].iter_mut().zip(hash.to_le_bytes()) {
            *byte ^= h;
        }
    }

    pub fn as_bytes(&self) -> &[u8; STATE_KEY_LEN] {
        &self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateKey({})", self)
    }
}

/// 128-bit content hash used when a token is wider than the key.
fn hash128(bytes: &[u8]) -> [u8; STATE_KEY_LEN] {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; STATE_KEY_LEN];
    out.copy_from_slice(&digest[..STATE_KEY_LEN]);
    out
}

/// 32-bit hash of a virtual-server name.
pub fn hash32(name: &str) -> u32 {
    let digest = Sha256::digest(name.as_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_exact_width_copies_verbatim() {
        let token = [7u8; STATE_KEY_LEN];
        assert_eq!(StateKey::derive(&token).as_bytes(), &token);
    }

    #[test]
    fn derive_undersized_zero_pads() {
        let token = [9u8; STATE_KEY_LEN - 1];
        let key = StateKey::derive(&token);
        assert_eq!(&key.as_bytes()[..token.len()], &token[..]);
        assert_eq!(key.as_bytes()[STATE_KEY_LEN - 1], 0);
    }

    #[test]
    fn derive_oversized_hashes_whole_token() {
        let mut token = vec![1u8; STATE_KEY_LEN + 1];
        let key_a = StateKey::derive(&token);
        // Flip the last byte: the key must change even though the first 16
        // bytes of the token are identical.
        token[STATE_KEY_LEN] ^= 0xff;
        let key_b = StateKey::derive(&token);
        assert_ne!(key_a, key_b);
    }

    #[test]
    fn derive_empty_token_is_all_zero() {
        assert_eq!(StateKey::derive(&[]).as_bytes(), &[0u8; STATE_KEY_LEN]);
    }

    #[test]
    fn derive_is_symmetric() {
        for len in [0, STATE_KEY_LEN - 1, STATE_KEY_LEN, STATE_KEY_LEN + 1] {
            let token: Vec<u8> = (0..len as u8).collect();
            assert_eq!(StateKey::derive(&token), StateKey::derive(&token));
        }
    }

    #[test]
    fn mint_fresh_stamps_round_counter() {
        let (key, tries) = StateKey::mint(None, 5);
        assert_eq!(tries, 0);
        assert_eq!(key.as_bytes()[TRIES], 1);
        assert_eq!(key.as_bytes()[TX], 1);
        assert_eq!(key.as_bytes()[SERVER_ID], 5);
    }

    #[test]
    fn mint_rotation_preserves_random_identity() {
        let (first, tries) = StateKey::mint(None, 0);
        let (second, tries) = StateKey::mint(Some((first, tries)), 0);
        assert_eq!(tries, 1);
        assert_eq!(second.as_bytes()[TRIES], 2);
        assert_eq!(second.as_bytes()[TX], 2 ^ 1);

        // The random bytes carry forward verbatim.
        for i in [R_0, 9, 11, 13, 14, 15] {
            assert_eq!(first.as_bytes()[i], second.as_bytes()[i]);
        }
    }

    #[test]
    fn mint_fresh_keys_differ() {
        let (a, _) = StateKey::mint(None, 0);
        let (b, _) = StateKey::mint(None, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn xor_server_hash_round_trips() {
        let (minted, _) = StateKey::mint(None, 0);
        let mut key = minted;
        key.xor_server_hash(hash32("site-a"));
        assert_ne!(key, minted);
        key.xor_server_hash(hash32("site-a"));
        assert_eq!(key, minted);
    }

    #[test]
    fn hash32_separates_server_names() {
        assert_ne!(hash32("site-a"), hash32("site-b"));
    }
}
