//! Shared, canonicalized DAG of parser call-stack suffixes.
//!
//! Based on
//! `examples/original_source/antlr4cpp/antlr/v4/runtime/atn/prediction_context.hpp`/`.cpp`,
//! `array_prediction_context.*` and `singleton_prediction_context.*`, collapsed
//! into one `Node` shape (a singleton is just an array of length one), which
//! is how `merge` already treats them internally. Construction and
//! hash-consing live in [`crate::prediction_context_cache`].

use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::murmur_hash;

/// Reserved return-state key: "the stack may also be empty here, in a
/// context where the outermost frame is `$` (top-of-stack, full context)".
pub const EMPTY_FULL_STATE_KEY: i32 = i32::MAX;
/// As above but for `*` (unknown caller, local context).
pub const EMPTY_LOCAL_STATE_KEY: i32 = i32::MAX - 1;

#[derive(Debug)]
pub enum PredictionContext {
	/// `full_context == true` is `$` (top of stack); `false` is `*` (unknown
	/// caller). Both are zero-size; there is exactly one `Rc` instance of
	/// each per thread (see [`empty_full`]/[`empty_local`]).
	Empty { full_context: bool },
	Node { parents: Vec<Rc<PredictionContext>>, return_states: Vec<i32>, hash: u32 },
}

thread_local! {
	static EMPTY_FULL: Rc<PredictionContext> = Rc::new(PredictionContext::Empty { full_context: true });
	static EMPTY_LOCAL: Rc<PredictionContext> = Rc::new(PredictionContext::Empty { full_context: false });
}

pub fn empty_full() -> Rc<PredictionContext> {
	EMPTY_FULL.with(Rc::clone)
}

pub fn empty_local() -> Rc<PredictionContext> {
	EMPTY_LOCAL.with(Rc::clone)
}

impl PredictionContext {
	pub fn is_empty(&self) -> bool {
		matches!(self, Self::Empty { .. })
	}

	pub fn size(&self) -> usize {
		match self {
			Self::Empty { .. } => 0,
			Self::Node { return_states, .. } => return_states.len(),
		}
	}

	pub fn parent(&self, i: usize) -> &Rc<PredictionContext> {
		match self {
			Self::Empty { .. } => panic!("empty prediction context has no parents"),
			Self::Node { parents, .. } => &parents[i],
		}
	}

	pub fn return_state(&self, i: usize) -> i32 {
		match self {
			Self::Empty { .. } => panic!("empty prediction context has no return states"),
			Self::Node { return_states, .. } => return_states[i],
		}
	}

	/// O(1): the reserved marker keys sort last, so "this stack may also be
	/// empty here" is exactly "the last return state is a marker key".
	pub fn has_empty(&self) -> bool {
		match self {
			Self::Empty { .. } => false,
			Self::Node { return_states, .. } => {
				matches!(return_states.last(), Some(&EMPTY_FULL_STATE_KEY) | Some(&EMPTY_LOCAL_STATE_KEY))
			},
		}
	}

	pub(crate) fn node_hash(&self) -> u32 {
		match self {
			Self::Empty { full_context: true } => murmur_hash::finish(murmur_hash::initialize(0x4558_5046), 0),
			Self::Empty { full_context: false } => murmur_hash::finish(murmur_hash::initialize(0x4558_504C), 0),
			Self::Node { hash, .. } => *hash,
		}
	}

	pub(crate) fn compute_node_hash(parents: &[Rc<PredictionContext>], return_states: &[i32]) -> u32 {
		let h: u32 = murmur_hash::initialize(1);
		let h: u32 = parents.iter().fold(h, |h, p| murmur_hash::update(h, p.node_hash()));
		let h: u32 = return_states.iter().fold(h, |h, &r| murmur_hash::update(h, r as u32));
		murmur_hash::finish(h, (parents.len() + return_states.len()) as u32)
	}
}

impl PartialEq for PredictionContext {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Empty { full_context: a }, Self::Empty { full_context: b }) => a == b,
			(Self::Node { parents: pa, return_states: ra, .. }, Self::Node { parents: pb, return_states: rb, .. }) => {
				ra == rb && pa == pb
			},
			_ => false,
		}
	}
}

impl Eq for PredictionContext {}

impl Hash for PredictionContext {
	fn hash<H: Hasher>(&self, state: &mut H) {
		state.write_u32(self.node_hash());
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn empty_singletons_are_referentially_stable() {
		assert!(Rc::ptr_eq(&empty_full(), &empty_full()));
		assert!(Rc::ptr_eq(&empty_local(), &empty_local()));
		assert!(!Rc::ptr_eq(&empty_full(), &empty_local()));
	}

	#[test]
	fn empty_nodes_have_zero_size_and_no_empty_tail() {
		assert_eq!(empty_full().size(), 0);
		assert!(!empty_full().has_empty());
		assert!(empty_full().is_empty());
	}

	#[test]
	fn distinct_empty_kinds_are_unequal() {
		assert_ne!(*empty_full(), *empty_local());
	}
}
