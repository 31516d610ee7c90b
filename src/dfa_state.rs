//! DFA state skeleton, and the minimal ATN-configuration-set shape it
//! carries for identity.
//!
//! Based on
//! `examples/original_source/antlr4cpp/antlr/v4/runtime/dfa/dfa_state.hpp`/`.cpp`
//! and `.../atn/atnconfigset.hpp`/`.cpp`. The full configuration-set
//! algorithm (closure construction during prediction) belongs to the ATN
//! simulator, out of scope here; what's modeled is only the structural
//! shape `DfaState` needs for equality and hashing.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::lexer_action_executor::LexerActionExecutor;
use crate::prediction_context::PredictionContext;
use crate::semantic_context::SemanticContext;

#[derive(Debug, Clone)]
pub struct AtnConfig {
	pub state: usize,
	pub alt: usize,
	pub context: Rc<PredictionContext>,
	pub semantic_context: SemanticContext,
}

impl PartialEq for AtnConfig {
	fn eq(&self, other: &Self) -> bool {
		self.state == other.state && self.alt == other.alt && self.context == other.context && self.semantic_context == other.semantic_context
	}
}
impl Eq for AtnConfig {}

/// An unordered set of configurations, compared structurally regardless of
/// insertion order (configurations are deduplicated and closed over by the
/// simulator; this set only needs to support equality/hash for DFA-state
/// identity).
#[derive(Debug, Clone, Default)]
pub struct AtnConfigSet {
	configs: Vec<AtnConfig>,
}

impl AtnConfigSet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(&mut self, config: AtnConfig) {
		if !self.configs.contains(&config) {
			self.configs.push(config);
		}
	}

	pub fn len(&self) -> usize {
		self.configs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.configs.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &AtnConfig> {
		self.configs.iter()
	}
}

impl PartialEq for AtnConfigSet {
	fn eq(&self, other: &Self) -> bool {
		self.configs.len() == other.configs.len() && self.configs.iter().all(|c| other.configs.contains(c))
	}
}
impl Eq for AtnConfigSet {}

impl Hash for AtnConfigSet {
	fn hash<H: Hasher>(&self, state: &mut H) {
		// Order-independent: fold each config's identity fields with XOR.
		let mut acc: u64 = 0;
		for c in &self.configs {
			let mut h = std::collections::hash_map::DefaultHasher::new();
			c.state.hash(&mut h);
			c.alt.hash(&mut h);
			c.context.hash(&mut h);
			c.semantic_context.hash(&mut h);
			acc ^= h.finish();
		}
		state.write_u64(acc);
	}
}

#[derive(Debug, Clone)]
pub struct AcceptStateInfo {
	pub prediction: i32,
	pub lexer_action_executor: Option<LexerActionExecutor>,
}

/// One state of a decision or mode DFA.
///
/// Equality and hashing delegate entirely to `configs`, matching the
/// source: two DFA states are the same state iff they represent the same
/// ATN configuration set.
#[derive(Debug, Clone)]
pub struct DfaState {
	pub state_number: usize,
	pub configs: AtnConfigSet,
	pub accept: Option<AcceptStateInfo>,
	min_dfa_edge: i32,
	edges: Vec<Option<usize>>,
	context_edges: BTreeMap<i32, usize>,
	context_symbols: std::collections::BTreeSet<i32>,
	pub predicates: Vec<(SemanticContext, usize)>,
}

impl DfaState {
	pub fn new(state_number: usize, configs: AtnConfigSet, min_dfa_edge: i32, max_dfa_edge: i32) -> Self {
		let width: usize = (max_dfa_edge - min_dfa_edge + 1).max(0) as usize;
		Self {
			state_number,
			configs,
			accept: None,
			min_dfa_edge,
			edges: vec![None; width],
			context_edges: BTreeMap::new(),
			context_symbols: std::collections::BTreeSet::new(),
			predicates: Vec::new(),
		}
	}

	pub fn is_accept_state(&self) -> bool {
		self.accept.is_some()
	}

	pub fn edge(&self, symbol: i32) -> Option<usize> {
		let idx: usize = (symbol - self.min_dfa_edge).try_into().ok()?;
		self.edges.get(idx).copied().flatten()
	}

	pub fn set_edge(&mut self, symbol: i32, target: usize) {
		let idx: usize = (symbol - self.min_dfa_edge).try_into().expect("symbol out of DFA edge range");
		self.edges[idx] = Some(target);
	}

	pub fn context_edge(&self, return_state: i32) -> Option<usize> {
		self.context_edges.get(&return_state).copied()
	}

	pub fn set_context_edge(&mut self, return_state: i32, target: usize) {
		self.context_edges.insert(return_state, target);
	}

	pub fn mark_context_sensitive(&mut self, symbol: i32) {
		self.context_symbols.insert(symbol);
	}

	pub fn is_context_sensitive(&self, symbol: i32) -> bool {
		self.context_symbols.contains(&symbol)
	}
}

impl PartialEq for DfaState {
	fn eq(&self, other: &Self) -> bool {
		self.configs == other.configs
	}
}
impl Eq for DfaState {}

impl Hash for DfaState {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.configs.hash(state);
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::prediction_context::empty_full;

	fn config(state: usize, alt: usize) -> AtnConfig {
		AtnConfig { state, alt, context: empty_full(), semantic_context: SemanticContext::none() }
	}

	#[test]
	fn config_set_equality_is_order_independent() {
		let mut a: AtnConfigSet = AtnConfigSet::new();
		a.add(config(1, 0));
		a.add(config(2, 0));
		let mut b: AtnConfigSet = AtnConfigSet::new();
		b.add(config(2, 0));
		b.add(config(1, 0));
		assert_eq!(a, b);
	}

	#[test]
	fn dfa_state_equality_delegates_to_configs() {
		let mut a: AtnConfigSet = AtnConfigSet::new();
		a.add(config(1, 0));
		let mut b: AtnConfigSet = AtnConfigSet::new();
		b.add(config(1, 0));
		let sa: DfaState = DfaState::new(0, a, -1, 10);
		let sb: DfaState = DfaState::new(1, b, -1, 10);
		assert_eq!(sa, sb);
	}

	#[test]
	fn edge_table_round_trips() {
		let mut s: DfaState = DfaState::new(0, AtnConfigSet::new(), -1, 10);
		s.set_edge(-1, 5);
		s.set_edge(7, 9);
		assert_eq!(s.edge(-1), Some(5));
		assert_eq!(s.edge(7), Some(9));
		assert_eq!(s.edge(3), None);
	}

	#[test]
	fn accept_state_info() {
		let mut s: DfaState = DfaState::new(0, AtnConfigSet::new(), 0, 127);
		assert!(!s.is_accept_state());
		s.accept = Some(AcceptStateInfo { prediction: 3, lexer_action_executor: None });
		assert!(s.is_accept_state());
	}
}
