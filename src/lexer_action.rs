//! Deferred lexer side-effects, executed once a match commits.
//!
//! Based on
//! `examples/original_source/antlr4cpp/antlr/v4/runtime/atn/lexer_action.hpp`/`.cpp`.
//! Equality and hashing are derived directly, since the executor's
//! append/hash-consing path needs working equality.

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum LexerAction {
	Channel(i32),
	Mode(i32),
	More,
	PopMode,
	PushMode(i32),
	Skip,
	Type(i32),
	Custom { rule_index: usize, action_index: usize },
	/// `offset` is the number of input symbols consumed since the action was
	/// queued; `inner` is the position-dependent action being replayed.
	IndexedCustom { offset: usize, inner: Box<LexerAction> },
}

impl LexerAction {
	/// Position-dependent actions must have their offset fixed before a
	/// match commits (see [`crate::lexer_action_executor`]).
	pub fn is_position_dependent(&self) -> bool {
		matches!(self, Self::Custom { .. } | Self::IndexedCustom { .. })
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn equality_is_structural() {
		assert_eq!(LexerAction::Channel(1), LexerAction::Channel(1));
		assert_ne!(LexerAction::Channel(1), LexerAction::Channel(2));
		assert_ne!(LexerAction::Channel(1), LexerAction::Mode(1));
	}

	#[test]
	fn position_dependence() {
		assert!(!LexerAction::Skip.is_position_dependent());
		assert!(LexerAction::Custom { rule_index: 0, action_index: 0 }.is_position_dependent());
		assert!(
			LexerAction::IndexedCustom {
				offset: 3,
				inner: Box::new(LexerAction::Custom { rule_index: 0, action_index: 0 }),
			}
			.is_position_dependent()
		);
	}
}
