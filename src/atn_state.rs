//! Tagged ATN state nodes.
//!
//! Based on `examples/original_source/antlr4cpp/antlr/v4/runtime/atn/atn_state.hpp`,
//! which models this as an abstract base class with one derived class per
//! state kind. Here it is flattened into a single struct with a tagged
//! `AtnStateKind` payload, following the newtype-index style used elsewhere
//! in this crate for cross-referencing other nodes: a link to another state
//! is just its `state_number`, a `usize` index into [`crate::atn::Atn::states`].

use crate::transition::Transition;

/// Sentinel rule index meaning "not owned by any rule" (used only by the
/// invalid/placeholder state produced during some deserialization error
/// paths; ordinary states always belong to a rule).
pub const NO_RULE: usize = usize::MAX;

#[derive(Debug, Clone)]
pub enum BlockStartKind {
	Basic { end_state: Option<usize> },
	Plus { end_state: Option<usize>, loop_back: Option<usize> },
	Star { end_state: Option<usize> },
}

#[derive(Debug, Clone)]
pub enum AtnStateKind {
	Basic,
	RuleStart { stop_state: usize, precedence_rule: bool, left_factored: bool },
	RuleStop,
	BlockStart(BlockStartKind),
	BlockEnd { start_state: Option<usize> },
	PlusLoopBack,
	StarLoopBack,
	StarLoopEntry { loop_back: Option<usize>, precedence_rule_decision: bool },
	LoopEnd { loop_back: Option<usize> },
	TokenStart,
}

/// One node of the augmented transition network.
///
/// `decision`/`greedy`/`sll` are populated only for decision-bearing kinds
/// (block-starts, `plus_loop_back`, `star_loop_entry`, `token_start`); other
/// kinds leave them at their defaults and ignore them.
#[derive(Debug, Clone)]
pub struct AtnState {
	pub state_number: usize,
	pub rule_index: usize,
	pub kind: AtnStateKind,
	pub decision: Option<usize>,
	pub greedy: bool,
	pub sll: bool,
	transitions: Vec<Transition>,
	optimized_transitions: Vec<Transition>,
	epsilon_only_transitions: bool,
}

impl AtnState {
	pub fn new(state_number: usize, rule_index: usize, kind: AtnStateKind) -> Self {
		Self {
			state_number,
			rule_index,
			kind,
			decision: None,
			greedy: true,
			sll: false,
			transitions: Vec::new(),
			optimized_transitions: Vec::new(),
			epsilon_only_transitions: false,
		}
	}

	pub fn transitions(&self) -> &[Transition] {
		&self.transitions
	}

	pub fn optimized_transitions(&self) -> &[Transition] {
		if self.optimized_transitions.is_empty() {
			&self.transitions
		} else {
			&self.optimized_transitions
		}
	}

	/// True iff at least one transition has been added and every transition
	/// added so far is epsilon-shaped (the flag the source calls
	/// `only_has_epsilon_transitions`).
	pub fn has_only_epsilon_transitions(&self) -> bool {
		self.epsilon_only_transitions
	}

	pub fn is_decision_state(&self) -> bool {
		matches!(
			self.kind,
			AtnStateKind::BlockStart(_) | AtnStateKind::PlusLoopBack | AtnStateKind::StarLoopEntry { .. } | AtnStateKind::TokenStart
		)
	}

	/// Append a transition. A state's transitions must be either all
	/// epsilon or all non-epsilon; mixing the two indicates a malformed
	/// ATN (a compiler bug upstream of this runtime), so this panics rather
	/// than returning a `Result`, matching the source's `assert`-based
	/// invariant (`atn_state.cpp`'s `add_transition`).
	pub fn add_transition(&mut self, transition: Transition) {
		self.insert_transition(self.transitions.len(), transition);
	}

	pub fn insert_transition(&mut self, index: usize, transition: Transition) {
		if self.transitions.is_empty() {
			self.epsilon_only_transitions = transition.is_epsilon();
		} else {
			assert_eq!(
				self.epsilon_only_transitions,
				transition.is_epsilon(),
				"state {} mixes epsilon and non-epsilon transitions",
				self.state_number
			);
		}
		self.transitions.insert(index, transition);
	}

	pub fn set_transition(&mut self, index: usize, transition: Transition) {
		self.transitions[index] = transition;
	}

	pub fn remove_transition(&mut self, index: usize) -> Transition {
		self.transitions.remove(index)
	}

	pub fn set_optimized_transitions(&mut self, transitions: Vec<Transition>) {
		self.optimized_transitions = transitions;
	}

	pub fn add_optimized_transition(&mut self, transition: Transition) {
		self.optimized_transitions.push(transition);
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn basic(n: usize) -> AtnState {
		AtnState::new(n, 0, AtnStateKind::Basic)
	}

	#[test]
	fn optimized_transitions_fall_back_to_transitions() {
		let mut s: AtnState = basic(0);
		s.add_transition(Transition::Epsilon { target: 1, outermost_precedence_return: -1 });
		assert_eq!(s.optimized_transitions().len(), 1);
	}

	#[test]
	fn optimized_transitions_override_when_present() {
		let mut s: AtnState = basic(0);
		s.add_transition(Transition::Epsilon { target: 1, outermost_precedence_return: -1 });
		s.set_optimized_transitions(vec![
			Transition::Epsilon { target: 1, outermost_precedence_return: -1 },
			Transition::Epsilon { target: 2, outermost_precedence_return: -1 },
		]);
		assert_eq!(s.optimized_transitions().len(), 2);
	}

	#[test]
	#[should_panic(expected = "mixes epsilon and non-epsilon")]
	fn mixed_epsilon_and_non_epsilon_transitions_panics() {
		let mut s: AtnState = basic(0);
		s.add_transition(Transition::Epsilon { target: 1, outermost_precedence_return: -1 });
		s.add_transition(Transition::Atom { target: 2, label: 65 });
	}

	#[test]
	fn decision_bearing_kinds_are_flagged() {
		let block_start: AtnState = AtnState::new(0, 0, AtnStateKind::BlockStart(BlockStartKind::Basic { end_state: None }));
		assert!(block_start.is_decision_state());
		let rule_stop: AtnState = AtnState::new(0, 0, AtnStateKind::RuleStop);
		assert!(!rule_stop.is_decision_state());
	}
}
