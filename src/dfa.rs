//! Per-decision / per-mode DFA: a lazily-populated cache of [`DfaState`]s
//! keyed by their `AtnConfigSet`, with a start-state slot (plain or
//! precedence-keyed).
//!
//! Based on
//! `examples/original_source/antlr4cpp/antlr/v4/runtime/dfa/dfa.hpp`/`.cpp`.
//! This DFA grows on demand as the ATN simulator (out of scope here)
//! promotes configuration sets to states during prediction, rather than
//! being built ahead of time from a single regex.

use std::collections::BTreeMap;

use crate::atn_state::AtnStateKind;
use crate::dfa_state::{AtnConfigSet, DfaState};

/// Reserved alphabet bound for lexer DFAs: `[0, 127]`.
pub const LEXER_MIN_DFA_EDGE: i32 = 0;
pub const LEXER_MAX_DFA_EDGE: i32 = 127;

pub struct Dfa {
	pub decision: usize,
	pub precedence_dfa: bool,
	min_dfa_edge: i32,
	max_dfa_edge: i32,
	states: Vec<DfaState>,
	s0: Option<usize>,
	/// Precedence DFAs index their start states by `(precedence, full_context)`.
	precedence_s0: BTreeMap<(i32, bool), usize>,
}

impl Dfa {
	pub fn new(decision: usize, min_dfa_edge: i32, max_dfa_edge: i32, precedence_dfa: bool) -> Self {
		Self { decision, precedence_dfa, min_dfa_edge, max_dfa_edge, states: Vec::new(), s0: None, precedence_s0: BTreeMap::new() }
	}

	/// The lexer window is fixed; the parser window spans `[EOF, max_token_type]`.
	pub fn for_lexer_mode(decision: usize) -> Self {
		Self::new(decision, LEXER_MIN_DFA_EDGE, LEXER_MAX_DFA_EDGE, false)
	}

	pub fn for_parser_decision(decision: usize, max_token_type: i32, precedence_dfa: bool) -> Self {
		Self::new(decision, crate::interval_set::EOF, max_token_type, precedence_dfa)
	}

	pub fn state(&self, n: usize) -> &DfaState {
		&self.states[n]
	}

	pub fn state_mut(&mut self, n: usize) -> &mut DfaState {
		&mut self.states[n]
	}

	pub fn len(&self) -> usize {
		self.states.len()
	}

	pub fn is_empty(&self) -> bool {
		self.states.is_empty()
	}

	/// Add a new state for `configs`, or return the existing one if an
	/// equal configuration set has already been promoted to a state.
	pub fn add_state(&mut self, configs: AtnConfigSet) -> usize {
		if let Some(existing) = self.states.iter().position(|s| s.configs == configs) {
			return existing;
		}
		let number: usize = self.states.len();
		self.states.push(DfaState::new(number, configs, self.min_dfa_edge, self.max_dfa_edge));
		number
	}

	pub fn s0(&self) -> Option<usize> {
		self.s0
	}

	pub fn set_s0(&mut self, state: usize) {
		self.s0 = Some(state);
	}

	pub fn precedence_start(&self, precedence: i32, full_context: bool) -> Option<usize> {
		self.precedence_s0.get(&(precedence, full_context)).copied()
	}

	pub fn set_precedence_start(&mut self, precedence: i32, full_context: bool, state: usize) {
		self.precedence_s0.insert((precedence, full_context), state);
	}
}

/// Build the per-decision DFA shell for each decision state, and per-mode
/// DFAs for each lexer mode start state. Start states themselves are left
/// unpopulated (`s0 = None`); the simulator lazily fills them on first use.
pub fn build_decision_and_mode_dfas(atn: &crate::atn::Atn) -> (Vec<Dfa>, Vec<Dfa>) {
	let decision_dfa: Vec<Dfa> = atn
		.decision_to_state
		.iter()
		.enumerate()
		.map(|(decision, &state_number)| {
			let precedence_dfa: bool =
				matches!(atn.state(state_number).kind, AtnStateKind::StarLoopEntry { precedence_rule_decision: true, .. });
			Dfa::for_parser_decision(decision, atn.max_token_type, precedence_dfa)
		})
		.collect();

	let mode_dfa: Vec<Dfa> = (0..atn.mode_to_start_state.len()).map(Dfa::for_lexer_mode).collect();

	(decision_dfa, mode_dfa)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn add_state_dedupes_by_configs() {
		let mut dfa: Dfa = Dfa::for_lexer_mode(0);
		let a: usize = dfa.add_state(AtnConfigSet::new());
		let b: usize = dfa.add_state(AtnConfigSet::new());
		assert_eq!(a, b);
		assert_eq!(dfa.len(), 1);
	}

	#[test]
	fn precedence_start_keyed_by_precedence_and_context() {
		let mut dfa: Dfa = Dfa::for_parser_decision(0, 10, true);
		let s: usize = dfa.add_state(AtnConfigSet::new());
		dfa.set_precedence_start(2, true, s);
		assert_eq!(dfa.precedence_start(2, true), Some(s));
		assert_eq!(dfa.precedence_start(2, false), None);
		assert_eq!(dfa.precedence_start(3, true), None);
	}

	#[test]
	fn ordinary_dfa_uses_plain_s0() {
		let mut dfa: Dfa = Dfa::for_lexer_mode(0);
		assert_eq!(dfa.s0(), None);
		let s: usize = dfa.add_state(AtnConfigSet::new());
		dfa.set_s0(s);
		assert_eq!(dfa.s0(), Some(s));
	}
}
