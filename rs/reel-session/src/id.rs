//! Session id minting — spec §9 Open Question (c).
//!
//! An incrementing sequence plus a random salt, hashed through SHA-256 and
//! hex-encoded, gives an opaque token that's both collision-resistant and
//! printable without further escaping for use in a URL path segment.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::RngCore;
use sha2::{Digest, Sha256};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A fresh opaque session id, 32 hex characters (128 bits) long.
pub fn mint() -> String {
	let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
	let salt = rand::thread_rng().next_u64();

	let mut hasher = Sha256::new();
	hasher.update(sequence.to_be_bytes());
	hasher.update(salt.to_be_bytes());
	let digest = hasher.finalize();

	hex::encode(&digest[..16])
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn mints_distinct_ids() {
		let a = mint();
		let b = mint();
		assert_ne!(a, b);
		assert_eq!(a.len(), 32);
		assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
	}
}
