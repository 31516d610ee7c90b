//! An immutable ordered list of [`LexerAction`]s with lazy offset-fixing
//! before a match commits.
//!
//! Based on
//! `examples/original_source/antlr4cpp/antlr/v4/runtime/atn/lexer_action_executor.hpp`/`.cpp`.

use std::hash::{Hash, Hasher};

use crate::lexer_action::LexerAction;
use crate::murmur_hash;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LexerActionExecutor {
	actions: Vec<LexerAction>,
	hash: u32,
}

impl LexerActionExecutor {
	pub fn new(actions: Vec<LexerAction>) -> Self {
		let hash: u32 = Self::compute_hash(&actions);
		Self { actions, hash }
	}

	pub fn actions(&self) -> &[LexerAction] {
		&self.actions
	}

	fn compute_hash(actions: &[LexerAction]) -> u32 {
		let h: u32 = murmur_hash::initialize(0xA5A5_A5A5);
		let h: u32 = actions.iter().fold(h, |h, action| {
			let mut hasher = std::collections::hash_map::DefaultHasher::new();
			action.hash(&mut hasher);
			murmur_hash::update(h, hasher.finish() as u32)
		});
		murmur_hash::finish(h, actions.len() as u32)
	}

	/// Append `action` to `exec`, returning a new executor. `exec` may be
	/// `None` (the lazily-allocated "no actions yet" state).
	pub fn append(exec: Option<&Self>, action: LexerAction) -> Self {
		match exec {
			None => Self::new(vec![action]),
			Some(exec) => {
				let mut actions: Vec<LexerAction> = exec.actions.clone();
				actions.push(action);
				Self::new(actions)
			},
		}
	}

	/// Rewrite every position-dependent, non-`IndexedCustom` action into
	/// `IndexedCustom(offset, original)`. Returns `self` unchanged
	/// (referential identity preserved as a fast path for callers that
	/// compare by pointer) if no action needed rewriting.
	pub fn fix_offset_before_match(&self, offset: usize) -> std::borrow::Cow<'_, Self> {
		let needs_fixup: bool = self
			.actions
			.iter()
			.any(|a| a.is_position_dependent() && !matches!(a, LexerAction::IndexedCustom { .. }));

		if !needs_fixup {
			return std::borrow::Cow::Borrowed(self);
		}

		let actions: Vec<LexerAction> = self
			.actions
			.iter()
			.map(|a| {
				if a.is_position_dependent() && !matches!(a, LexerAction::IndexedCustom { .. }) {
					LexerAction::IndexedCustom { offset, inner: Box::new(a.clone()) }
				} else {
					a.clone()
				}
			})
			.collect();

		std::borrow::Cow::Owned(Self::new(actions))
	}
}

impl Hash for LexerActionExecutor {
	fn hash<H: Hasher>(&self, state: &mut H) {
		state.write_u32(self.hash);
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn append_to_none_creates_singleton() {
		let exec: LexerActionExecutor = LexerActionExecutor::append(None, LexerAction::Skip);
		assert_eq!(exec.actions(), &[LexerAction::Skip]);
	}

	#[test]
	fn append_preserves_order() {
		let first: LexerActionExecutor = LexerActionExecutor::append(None, LexerAction::Skip);
		let second: LexerActionExecutor = LexerActionExecutor::append(Some(&first), LexerAction::Mode(2));
		assert_eq!(second.actions(), &[LexerAction::Skip, LexerAction::Mode(2)]);
		// original untouched
		assert_eq!(first.actions(), &[LexerAction::Skip]);
	}

	#[test]
	fn fix_offset_noop_when_nothing_position_dependent() {
		let exec: LexerActionExecutor = LexerActionExecutor::new(vec![LexerAction::Skip, LexerAction::Mode(1)]);
		let fixed = exec.fix_offset_before_match(5);
		assert!(matches!(fixed, std::borrow::Cow::Borrowed(_)));
	}

	#[test]
	fn fix_offset_wraps_position_dependent_actions() {
		let exec: LexerActionExecutor =
			LexerActionExecutor::new(vec![LexerAction::Skip, LexerAction::Custom { rule_index: 1, action_index: 2 }]);
		let fixed = exec.fix_offset_before_match(7);
		assert!(matches!(fixed, std::borrow::Cow::Owned(_)));
		assert_eq!(
			fixed.actions()[1],
			LexerAction::IndexedCustom { offset: 7, inner: Box::new(LexerAction::Custom { rule_index: 1, action_index: 2 }) }
		);
	}

	#[test]
	fn fix_offset_does_not_rewrap_already_indexed() {
		let exec: LexerActionExecutor = LexerActionExecutor::new(vec![LexerAction::IndexedCustom {
			offset: 3,
			inner: Box::new(LexerAction::Custom { rule_index: 0, action_index: 0 }),
		}]);
		let fixed = exec.fix_offset_before_match(99);
		assert!(matches!(fixed, std::borrow::Cow::Borrowed(_)));
	}
}
