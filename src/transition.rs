//! Tagged directed edges between ATN states.
//!
//! Based on
//! `examples/original_source/antlr4cpp/antlr/v4/runtime/atn/transition.hpp`/`.cpp`,
//! with two corrections:
//! - `Wildcard` is tagged as its own non-epsilon variant. The epsilon set is
//!   exactly epsilon, rule, predicate, action, precedence; wildcard matches
//!   one input symbol and must not be treated as a closure edge.
//! - `Set`/`NotSet` carry a genuine [`IntervalSet`] payload, matching "sets
//!   use arg1 as set index" in the wire format.
//!
//! States are addressed by `state_number` (a plain index into
//! [`crate::atn::Atn::states`]) rather than by shared pointer, following the
//! newtype-index style used elsewhere in this crate, and reflecting that the
//! whole ATN is immutable and owned by one container after deserialization.

use std::cell::Cell;

use crate::interval_set::IntervalSet;

/// Sentinel meaning "this epsilon transition does not return across an
/// outermost precedence boundary".
pub const NO_OUTERMOST_PRECEDENCE_RETURN: i32 = -1;

#[derive(Debug, Clone)]
pub enum Transition {
	Epsilon { target: usize, outermost_precedence_return: i32 },
	/// Half-open `[lo, hi)`.
	Range { target: usize, lo: i32, hi: i32 },
	Rule {
		target: usize,
		rule_index: usize,
		precedence: i32,
		follow_state: usize,
		tail_call: Cell<bool>,
		optimized_tail_call: Cell<bool>,
	},
	Predicate { target: usize, rule_index: usize, predicate_index: usize, context_dependent: bool },
	Atom { target: usize, label: i32 },
	Action { target: usize, rule_index: usize, action_index: usize, context_dependent: bool },
	Set { target: usize, set: IntervalSet },
	NotSet { target: usize, set: IntervalSet },
	Wildcard { target: usize },
	Precedence { target: usize, precedence: i32 },
}

impl Transition {
	pub fn target(&self) -> usize {
		match self {
			Self::Epsilon { target, .. }
			| Self::Range { target, .. }
			| Self::Rule { target, .. }
			| Self::Predicate { target, .. }
			| Self::Atom { target, .. }
			| Self::Action { target, .. }
			| Self::Set { target, .. }
			| Self::NotSet { target, .. }
			| Self::Wildcard { target }
			| Self::Precedence { target, .. } => *target,
		}
	}

	/// True iff this transition matches no input, i.e. it is a closure
	/// (epsilon-reachability) edge, not a "move" edge.
	pub fn is_epsilon(&self) -> bool {
		matches!(
			self,
			Self::Epsilon { .. } | Self::Rule { .. } | Self::Predicate { .. } | Self::Action { .. } | Self::Precedence { .. }
		)
	}

	pub fn matches(&self, symbol: i32, min_vocab: i32, max_vocab: i32) -> bool {
		match self {
			Self::Epsilon { .. } | Self::Rule { .. } | Self::Predicate { .. } | Self::Action { .. } | Self::Precedence { .. } => {
				false
			},
			Self::Range { lo, hi, .. } => symbol >= *lo && symbol < *hi,
			Self::Atom { label, .. } => symbol == *label,
			Self::Set { set, .. } => set.contains(symbol),
			Self::NotSet { set, .. } => symbol >= min_vocab && symbol <= max_vocab && !set.contains(symbol),
			Self::Wildcard { .. } => symbol >= min_vocab && symbol <= max_vocab,
		}
	}

	pub fn with_target(&self, new_target: usize) -> Self {
		let mut clone: Self = self.clone();
		match &mut clone {
			Self::Epsilon { target, .. }
			| Self::Range { target, .. }
			| Self::Rule { target, .. }
			| Self::Predicate { target, .. }
			| Self::Atom { target, .. }
			| Self::Action { target, .. }
			| Self::Set { target, .. }
			| Self::NotSet { target, .. }
			| Self::Wildcard { target }
			| Self::Precedence { target, .. } => *target = new_target,
		}
		clone
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn wildcard_is_not_epsilon() {
		let t: Transition = Transition::Wildcard { target: 0 };
		assert!(!t.is_epsilon());
	}

	#[test]
	fn epsilon_family_is_epsilon() {
		assert!(Transition::Epsilon { target: 0, outermost_precedence_return: NO_OUTERMOST_PRECEDENCE_RETURN }.is_epsilon());
		assert!(Transition::Rule { target: 0, rule_index: 0, precedence: 0, follow_state: 1, tail_call: Cell::new(false), optimized_tail_call: Cell::new(false) }.is_epsilon());
		assert!(Transition::Predicate { target: 0, rule_index: 0, predicate_index: 0, context_dependent: false }.is_epsilon());
		assert!(Transition::Action { target: 0, rule_index: 0, action_index: 0, context_dependent: false }.is_epsilon());
		assert!(Transition::Precedence { target: 0, precedence: 0 }.is_epsilon());
	}

	#[test]
	fn range_matches_half_open() {
		let t: Transition = Transition::Range { target: 0, lo: 10, hi: 20 };
		assert!(t.matches(10, 0, 0));
		assert!(t.matches(19, 0, 0));
		assert!(!t.matches(20, 0, 0));
	}

	#[test]
	fn set_and_not_set_use_interval_set_payload() {
		let set: IntervalSet = IntervalSet::of_range(5, 10);
		let t: Transition = Transition::Set { target: 0, set: set.clone() };
		assert!(t.matches(7, 0, 100));
		assert!(!t.matches(11, 0, 100));

		let not: Transition = Transition::NotSet { target: 0, set };
		assert!(!not.matches(7, 0, 100));
		assert!(not.matches(11, 0, 100));
	}
}
