//! Collaborator interface: lifting a runtime parser call stack into a
//! [`PredictionContext`].
//!
//! The concrete rule-context type (the generated parser's recursive-descent
//! call frame) is out of scope; this module defines the trait the core
//! needs of it and the call-stack lifting algorithm, implemented directly
//! from the documented semantics (see DESIGN.md, Open Question 2).

use std::rc::Rc;

use crate::prediction_context::PredictionContext;
use crate::prediction_context_cache::PredictionContextCache;
use crate::transition::Transition;

/// One frame of a runtime parser call stack: a linked list via `parent()`.
pub trait RuleContext {
	/// The ATN state at which this frame called into its rule, or `None` at
	/// the root (outermost) frame.
	fn invoking_state(&self) -> Option<usize>;
	fn parent(&self) -> Option<&dyn RuleContext>;
}

/// The subset of [`crate::atn::Atn`] that lifting needs: lookup of a
/// state's outgoing transitions by state number. Kept as a trait so this
/// module does not have to depend on the container's concrete layout.
pub trait StateTransitions {
	fn transitions_of(&self, state: usize) -> &[Transition];
}

fn follow_state(atn: &impl StateTransitions, invoking_state: usize) -> usize {
	atn.transitions_of(invoking_state)
		.iter()
		.find_map(|t| match t {
			Transition::Rule { follow_state, .. } => Some(*follow_state),
			_ => None,
		})
		.expect("invoking state has no outgoing rule transition")
}

/// Lift `rc`'s call stack into a prediction context: walk `parent()` from
/// `rc` to the root, resolving each frame's `follow_state` and folding
/// through `get_child`, outermost frame first.
pub fn from_rule_context(
	atn: &impl StateTransitions,
	cache: &mut PredictionContextCache,
	rc: &dyn RuleContext,
	full_context: bool,
) -> Rc<PredictionContext> {
	let mut chain: Vec<usize> = Vec::new();
	let mut cur: Option<&dyn RuleContext> = Some(rc);
	while let Some(node) = cur {
		match node.invoking_state() {
			Some(state) => {
				chain.push(follow_state(atn, state));
				cur = node.parent();
			},
			None => cur = None,
		}
	}
	chain.reverse();
	cache.from_return_state_chain(full_context, chain.into_iter())
}

#[cfg(test)]
mod test {
	use super::*;

	struct FakeAtn {
		// transitions_of(state) -> the single Rule transition originating there, if any
		rule_transitions: Vec<Option<Transition>>,
	}

	impl StateTransitions for FakeAtn {
		fn transitions_of(&self, state: usize) -> &[Transition] {
			match &self.rule_transitions[state] {
				Some(_) => std::slice::from_ref(self.rule_transitions[state].as_ref().unwrap()),
				None => &[],
			}
		}
	}

	struct Frame {
		invoking_state: Option<usize>,
		parent: Option<Box<Frame>>,
	}

	impl RuleContext for Frame {
		fn invoking_state(&self) -> Option<usize> {
			self.invoking_state
		}
		fn parent(&self) -> Option<&dyn RuleContext> {
			self.parent.as_deref().map(|p| p as &dyn RuleContext)
		}
	}

	#[test]
	fn lifts_single_frame_stack() {
		// state 0 has a rule transition with follow_state 7.
		let atn = FakeAtn {
			rule_transitions: vec![Some(Transition::Rule {
				target: 1,
				rule_index: 0,
				precedence: 0,
				follow_state: 7,
				tail_call: std::cell::Cell::new(false),
				optimized_tail_call: std::cell::Cell::new(false),
			})],
		};
		let root: Frame = Frame { invoking_state: Some(0), parent: None };
		let mut cache: PredictionContextCache = PredictionContextCache::new();
		let ctx: Rc<PredictionContext> = from_rule_context(&atn, &mut cache, &root, true);
		assert_eq!(ctx.size(), 1);
		assert_eq!(ctx.return_state(0), 7);
	}

	#[test]
	fn lifts_nested_frames_outermost_first() {
		let atn = FakeAtn {
			rule_transitions: vec![
				Some(Transition::Rule {
					target: 1,
					rule_index: 0,
					precedence: 0,
					follow_state: 10,
					tail_call: std::cell::Cell::new(false),
					optimized_tail_call: std::cell::Cell::new(false),
				}),
				Some(Transition::Rule {
					target: 2,
					rule_index: 1,
					precedence: 0,
					follow_state: 20,
					tail_call: std::cell::Cell::new(false),
					optimized_tail_call: std::cell::Cell::new(false),
				}),
			],
		};
		let root: Frame = Frame { invoking_state: Some(0), parent: None };
		let inner: Frame = Frame { invoking_state: Some(1), parent: Some(Box::new(root)) };
		let mut cache: PredictionContextCache = PredictionContextCache::new();
		let ctx: Rc<PredictionContext> = from_rule_context(&atn, &mut cache, &inner, true);
		// outermost (state 0 -> follow_state 10) is the root parent; the
		// innermost (state 1 -> follow_state 20) is the top-of-stack entry.
		assert_eq!(ctx.return_state(0), 20);
		assert_eq!(ctx.parent(0).return_state(0), 10);
	}
}
