//! Lattice of semantic predicate expressions guarding ATN transitions.
//!
//! Based on
//! `examples/original_source/antlr4cpp/antlr/v4/runtime/atn/semantic_context.hpp`/`.cpp`.
//! AND/OR equality and hashing are an order-independent comparison over the
//! (already flattened and deduplicated) operand set, since `combine_and`/
//! `combine_or` depend on being able to deduplicate by structural equality.

use std::hash::{Hash, Hasher};

use crate::murmur_hash;

#[derive(Debug, Clone)]
pub enum SemanticContext {
	Predicate { rule_index: usize, pred_index: usize, context_dependent: bool },
	PrecedencePredicate { precedence: i32 },
	And(Vec<SemanticContext>),
	Or(Vec<SemanticContext>),
}

impl SemanticContext {
	/// The always-true predicate used as the default/empty guard.
	pub fn none() -> Self {
		Self::Predicate { rule_index: usize::MAX, pred_index: usize::MAX, context_dependent: false }
	}

	pub fn is_none(&self) -> bool {
		matches!(self, Self::Predicate { rule_index, pred_index, .. } if *rule_index == usize::MAX && *pred_index == usize::MAX)
	}

	fn precedence(&self) -> Option<i32> {
		match self {
			Self::PrecedencePredicate { precedence } => Some(*precedence),
			_ => None,
		}
	}

	fn payload_hash(&self) -> u32 {
		match self {
			Self::Predicate { rule_index, pred_index, context_dependent } => {
				let h: u32 = murmur_hash::initialize(1);
				let h: u32 = murmur_hash::update(h, *rule_index as u32);
				let h: u32 = murmur_hash::update(h, *pred_index as u32);
				let h: u32 = murmur_hash::update(h, *context_dependent as u32);
				murmur_hash::finish(h, 3)
			},
			Self::PrecedencePredicate { precedence } => {
				let h: u32 = murmur_hash::initialize(2);
				let h: u32 = murmur_hash::update(h, *precedence as u32);
				murmur_hash::finish(h, 1)
			},
			// Order-independent: XOR the members' hashes together so permutations collide.
			Self::And(operands) => operands.iter().fold(3u32, |acc, op| acc ^ op.payload_hash()),
			Self::Or(operands) => operands.iter().fold(4u32, |acc, op| acc ^ op.payload_hash()),
		}
	}

	/// Build an `AND` of `a` and `b`, flattening, deduplicating, and
	/// reducing sibling precedence predicates to their minimum.
	pub fn combine_and(a: Self, b: Self) -> Self {
		if a.is_none() {
			return b;
		}
		if b.is_none() {
			return a;
		}

		let mut operands: Vec<Self> = Vec::new();
		flatten_into(&mut operands, a, |ctx| matches!(ctx, Self::And(_)));
		flatten_into(&mut operands, b, |ctx| matches!(ctx, Self::And(_)));

		reduce_precedence(&mut operands, |p, q| p.min(q));
		dedup(&mut operands);

		match operands.len() {
			0 => Self::none(),
			1 => operands.into_iter().next().unwrap(),
			_ => Self::And(operands),
		}
	}

	/// Build an `OR` of `a` and `b`. `NONE` absorbs (since it is always true).
	pub fn combine_or(a: Self, b: Self) -> Self {
		if a.is_none() || b.is_none() {
			return Self::none();
		}

		let mut operands: Vec<Self> = Vec::new();
		flatten_into(&mut operands, a, |ctx| matches!(ctx, Self::Or(_)));
		flatten_into(&mut operands, b, |ctx| matches!(ctx, Self::Or(_)));

		reduce_precedence(&mut operands, |p, q| p.max(q));
		dedup(&mut operands);

		match operands.len() {
			0 => Self::none(),
			1 => operands.into_iter().next().unwrap(),
			_ => Self::Or(operands),
		}
	}
}

fn flatten_into(into: &mut Vec<SemanticContext>, ctx: SemanticContext, is_same_kind: impl Fn(&SemanticContext) -> bool) {
	if is_same_kind(&ctx) {
		let nested: Vec<SemanticContext> = match ctx {
			SemanticContext::And(operands) | SemanticContext::Or(operands) => operands,
			other => vec![other],
		};
		into.extend(nested);
	} else {
		into.push(ctx);
	}
}

fn reduce_precedence(operands: &mut Vec<SemanticContext>, pick: impl Fn(i32, i32) -> i32) {
	let mut best: Option<i32> = None;
	operands.retain(|op| {
		if let Some(p) = op.precedence() {
			best = Some(match best {
				Some(b) => pick(b, p),
				None => p,
			});
			false
		} else {
			true
		}
	});
	if let Some(p) = best {
		operands.push(SemanticContext::PrecedencePredicate { precedence: p });
	}
}

fn dedup(operands: &mut Vec<SemanticContext>) {
	let mut deduped: Vec<SemanticContext> = Vec::with_capacity(operands.len());
	for op in operands.drain(..) {
		if !deduped.contains(&op) {
			deduped.push(op);
		}
	}
	*operands = deduped;
}

impl PartialEq for SemanticContext {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(
				Self::Predicate { rule_index: r1, pred_index: p1, context_dependent: c1 },
				Self::Predicate { rule_index: r2, pred_index: p2, context_dependent: c2 },
			) => r1 == r2 && p1 == p2 && c1 == c2,
			(Self::PrecedencePredicate { precedence: p1 }, Self::PrecedencePredicate { precedence: p2 }) => p1 == p2,
			(Self::And(a), Self::And(b)) | (Self::Or(a), Self::Or(b)) => multiset_eq(a, b),
			_ => false,
		}
	}
}

impl Eq for SemanticContext {}

impl Hash for SemanticContext {
	fn hash<H: Hasher>(&self, state: &mut H) {
		state.write_u32(self.payload_hash());
	}
}

/// Order-independent equality: same length, and every element of `a` has a
/// matching (not yet consumed) element in `b`.
fn multiset_eq(a: &[SemanticContext], b: &[SemanticContext]) -> bool {
	if a.len() != b.len() {
		return false;
	}
	let mut used: Vec<bool> = vec![false; b.len()];
	'outer: for x in a.iter() {
		for (i, y) in b.iter().enumerate() {
			if !used[i] && x == y {
				used[i] = true;
				continue 'outer;
			}
		}
		return false;
	}
	true
}

#[cfg(test)]
mod test {
	use super::*;

	fn pred(rule: usize, idx: usize) -> SemanticContext {
		SemanticContext::Predicate { rule_index: rule, pred_index: idx, context_dependent: false }
	}

	#[test]
	fn and_with_none_is_identity() {
		let p: SemanticContext = pred(0, 1);
		assert_eq!(SemanticContext::combine_and(p.clone(), SemanticContext::none()), p);
	}

	#[test]
	fn or_with_none_is_absorbing() {
		let p: SemanticContext = pred(0, 1);
		assert!(SemanticContext::combine_or(p, SemanticContext::none()).is_none());
	}

	#[test]
	fn and_reduces_precedence_predicates_to_min() {
		let p: SemanticContext = SemanticContext::PrecedencePredicate { precedence: 4 };
		let q: SemanticContext = SemanticContext::PrecedencePredicate { precedence: 1 };
		assert_eq!(SemanticContext::combine_and(p, q), SemanticContext::PrecedencePredicate { precedence: 1 });
	}

	#[test]
	fn or_reduces_precedence_predicates_to_max() {
		let p: SemanticContext = SemanticContext::PrecedencePredicate { precedence: 4 };
		let q: SemanticContext = SemanticContext::PrecedencePredicate { precedence: 1 };
		assert_eq!(SemanticContext::combine_or(p, q), SemanticContext::PrecedencePredicate { precedence: 4 });
	}

	#[test]
	fn and_is_order_independent() {
		let a: SemanticContext = SemanticContext::combine_and(pred(0, 1), pred(0, 2));
		let b: SemanticContext = SemanticContext::combine_and(pred(0, 2), pred(0, 1));
		assert_eq!(a, b);
	}

	#[test]
	fn and_flattens_nested_ands() {
		let inner: SemanticContext = SemanticContext::combine_and(pred(0, 1), pred(0, 2));
		let flat: SemanticContext = SemanticContext::combine_and(inner, pred(0, 3));
		match flat {
			SemanticContext::And(operands) => assert_eq!(operands.len(), 3),
			other => panic!("expected flattened And, got {other:?}"),
		}
	}

	#[test]
	fn dedup_collapses_duplicate_operand_to_single() {
		let combined: SemanticContext = SemanticContext::combine_and(pred(0, 1), pred(0, 1));
		assert_eq!(combined, pred(0, 1));
	}
}
