//! Which alternatives are in conflict at a decision, and whether that
//! conflict was established exactly or only heuristically.
//!
//! Based on
//! `examples/original_source/antlr4cpp/antlr/v4/runtime/atn/atnconfigset.*`
//! (the `conflicting_alts` bitset usage) and `.../support/bitset.*`.
//! Equality and hashing are structural over the bitset plus the `exact`
//! flag, needed so `DfaState` and configuration-set consumers can dedupe
//! conflict reports.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Default)]
pub struct ConflictInfo {
	alternatives: BTreeSet<usize>,
	pub exact: bool,
}

impl ConflictInfo {
	pub fn new(alternatives: impl IntoIterator<Item = usize>, exact: bool) -> Self {
		Self { alternatives: alternatives.into_iter().collect(), exact }
	}

	pub fn contains(&self, alt: usize) -> bool {
		self.alternatives.contains(&alt)
	}

	pub fn alternatives(&self) -> impl Iterator<Item = usize> + '_ {
		self.alternatives.iter().copied()
	}

	pub fn count(&self) -> usize {
		self.alternatives.len()
	}
}

impl PartialEq for ConflictInfo {
	fn eq(&self, other: &Self) -> bool {
		self.exact == other.exact && self.alternatives == other.alternatives
	}
}

impl Eq for ConflictInfo {}

impl Hash for ConflictInfo {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.exact.hash(state);
		for alt in &self.alternatives {
			alt.hash(state);
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn equality_ignores_construction_order() {
		let a: ConflictInfo = ConflictInfo::new([3, 1, 2], true);
		let b: ConflictInfo = ConflictInfo::new([1, 2, 3], true);
		assert_eq!(a, b);
	}

	#[test]
	fn exact_flag_distinguishes_otherwise_equal_sets() {
		let a: ConflictInfo = ConflictInfo::new([1, 2], true);
		let b: ConflictInfo = ConflictInfo::new([1, 2], false);
		assert_ne!(a, b);
	}

	#[test]
	fn contains_and_count() {
		let a: ConflictInfo = ConflictInfo::new([1, 4], false);
		assert!(a.contains(1));
		assert!(!a.contains(2));
		assert_eq!(a.count(), 2);
	}
}
