//! The grammar automaton container: every state, the rule/mode/decision
//! index tables into it, and the per-decision/per-mode DFA cache.
//!
//! Based on
//! `examples/original_source/antlr4cpp/antlr/v4/runtime/atn/atn.hpp`/`.cpp`.

use crate::atn_state::AtnState;
use crate::dfa::Dfa;
use crate::lexer_action::LexerAction;
use crate::rule_context::StateTransitions;
use crate::transition::Transition;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum GrammarType {
	Lexer,
	Parser,
}

/// A compiled grammar automaton. Immutable after deserialization completes,
/// except for the lazily-populated per-decision/per-mode DFAs and the
/// tail-call flags on `Rule` transitions, both finalized once before first
/// use by [`crate::atn_deserializer`].
pub struct Atn {
	pub grammar_type: GrammarType,
	pub max_token_type: i32,
	pub states: Vec<AtnState>,
	/// Decision index -> state number, in decision-index order.
	pub decision_to_state: Vec<usize>,
	pub rule_to_start_state: Vec<usize>,
	pub rule_to_stop_state: Vec<usize>,
	/// Lexer mode index -> its `token_start` state number.
	pub mode_to_start_state: Vec<usize>,
	/// Rule index -> token type (lexers, and bypass-augmented parsers).
	pub rule_to_token_type: Vec<i32>,
	pub lexer_actions: Vec<LexerAction>,
	pub decision_dfa: Vec<Dfa>,
	pub mode_dfa: Vec<Dfa>,
}

impl Atn {
	pub fn new(grammar_type: GrammarType, max_token_type: i32) -> Self {
		Self {
			grammar_type,
			max_token_type,
			states: Vec::new(),
			decision_to_state: Vec::new(),
			rule_to_start_state: Vec::new(),
			rule_to_stop_state: Vec::new(),
			mode_to_start_state: Vec::new(),
			rule_to_token_type: Vec::new(),
			lexer_actions: Vec::new(),
			decision_dfa: Vec::new(),
			mode_dfa: Vec::new(),
		}
	}

	pub fn num_rules(&self) -> usize {
		self.rule_to_start_state.len()
	}

	pub fn state(&self, n: usize) -> &AtnState {
		&self.states[n]
	}

	pub fn state_mut(&mut self, n: usize) -> &mut AtnState {
		&mut self.states[n]
	}

	/// Append a new state, assigning it the next state number.
	pub fn add_state(&mut self, mut state: AtnState) -> usize {
		let number: usize = self.states.len();
		state.state_number = number;
		self.states.push(state);
		number
	}
}

impl StateTransitions for Atn {
	fn transitions_of(&self, state: usize) -> &[Transition] {
		self.states[state].transitions()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::atn_state::AtnStateKind;

	#[test]
	fn new_atn_is_empty() {
		let atn: Atn = Atn::new(GrammarType::Parser, 10);
		assert_eq!(atn.num_rules(), 0);
		assert!(atn.states.is_empty());
	}

	#[test]
	fn state_transitions_delegates_to_states() {
		let mut atn: Atn = Atn::new(GrammarType::Parser, 10);
		let mut s: AtnState = AtnState::new(0, 0, AtnStateKind::Basic);
		s.add_transition(Transition::Atom { target: 1, label: 65 });
		atn.states.push(s);
		assert_eq!(atn.transitions_of(0).len(), 1);
	}
}
