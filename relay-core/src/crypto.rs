//! Cryptographic primitives (key derivation, address computation, block
//! header hashing) this crate treats as pure functions supplied by an
//! external identity/crypto component. Kept here as thin, fully
//! deterministic stand-ins so `Lifecycle::init` and the test suite have
//! something concrete to call; a production deployment links a real
//! identity/crypto crate in their place.

use sha2::{Digest, Sha256};

use crate::address::Address;

/// Derive a 20-byte address from a raw public key by hashing and truncating.
///
/// A real deployment derives this the way the target chain does (e.g. the
/// low 20 bytes of a Keccak-256 digest); this truncated-SHA-256 stand-in
/// preserves determinism and uniqueness for the purposes of this crate.
pub fn pubkey_to_address(pubkey: &[u8]) -> Address {
    let digest = Sha256::digest(pubkey);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[12..32]);
    Address::from_bytes(bytes)
}
