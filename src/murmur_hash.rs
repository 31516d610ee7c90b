//! Incremental 32-bit MurmurHash used for composite keys (prediction context
//! hashes, semantic-context payload hashes).
//!
//! Based on `examples/original_source/antlr4cpp/antlr/v4/runtime/misc/murmur_hash.hpp`.

const C1: u32 = 0xCC9E_2D51;
const C2: u32 = 0x1B87_3593;
const R1: u32 = 15;
const R2: u32 = 13;
const M: u32 = 5;
const N: u32 = 0xE654_6B64;

/// Start a new incremental hash with the given seed.
pub fn initialize(seed: u32) -> u32 {
	seed
}

/// Mix one 32-bit value into the running hash.
pub fn update(hash: u32, value: u32) -> u32 {
	let mut k: u32 = value;
	k = k.wrapping_mul(C1);
	k = k.rotate_left(R1);
	k = k.wrapping_mul(C2);

	let mut h: u32 = hash ^ k;
	h = h.rotate_left(R2);
	h.wrapping_mul(M).wrapping_add(N)
}

/// Finalize the hash given the number of values folded in.
pub fn finish(hash: u32, number_of_words: u32) -> u32 {
	let mut h: u32 = hash ^ (number_of_words.wrapping_mul(4));
	h ^= h >> 16;
	h = h.wrapping_mul(0x85EB_CA6B);
	h ^= h >> 13;
	h = h.wrapping_mul(0xC2B2_AE35);
	h ^= h >> 16;
	h
}

/// Hash a single `i32`, as a convenience for the many call sites that just
/// want `murmur_hash::hash_i32(x)` rather than the full initialize/update/finish dance.
pub fn hash_i32(value: i32) -> u32 {
	let h: u32 = initialize(0);
	let h: u32 = update(h, value as u32);
	finish(h, 1)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn deterministic() {
		assert_eq!(hash_i32(42), hash_i32(42));
		assert_ne!(hash_i32(42), hash_i32(43));
	}

	#[test]
	fn incremental_matches_itself() {
		let mut h: u32 = initialize(0);
		h = update(h, 1);
		h = update(h, 2);
		h = finish(h, 2);

		let mut h2: u32 = initialize(0);
		h2 = update(h2, 1);
		h2 = update(h2, 2);
		h2 = finish(h2, 2);

		assert_eq!(h, h2);
	}
}
