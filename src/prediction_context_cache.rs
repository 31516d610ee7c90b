//! Hash-consing cache and graph algorithms (`join`, `append_context`) over
//! [`PredictionContext`] nodes.
//!
//! Based on
//! `examples/original_source/antlr4cpp/antlr/v4/runtime/atn/prediction_context.cpp`
//! (`merge`, `merge_root`, `merge_arrays`, `merge_singletons`,
//! `get_cached_context`) and
//! `examples/original_source/antlr4cpp/antlr/v4/runtime/atn/prediction_context_cache.*`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::errors::PredictionContextError;
use crate::prediction_context::{empty_full, PredictionContext, EMPTY_FULL_STATE_KEY};

/// Wraps an `Rc` so `HashMap` keys compare/hash by pointer identity rather
/// than by (potentially expensive, recursive) structural equality.
#[derive(Clone)]
struct PtrKey(Rc<PredictionContext>);

impl PartialEq for PtrKey {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl Eq for PtrKey {}
impl Hash for PtrKey {
	fn hash<H: Hasher>(&self, state: &mut H) {
		(Rc::as_ptr(&self.0) as usize).hash(state);
	}
}

fn unordered_pair_key(a: &Rc<PredictionContext>, b: &Rc<PredictionContext>) -> (PtrKey, PtrKey) {
	let (pa, pb) = (Rc::as_ptr(a) as usize, Rc::as_ptr(b) as usize);
	if pa <= pb {
		(PtrKey(a.clone()), PtrKey(b.clone()))
	} else {
		(PtrKey(b.clone()), PtrKey(a.clone()))
	}
}

/// Hash-consing cache for prediction-context nodes.
///
/// In `uncached()` mode all three tables are bypassed: every call builds a
/// fresh node with no memoization. Used for scratch construction, e.g.
/// inside `append_context`, that must not pollute a cache shared by live
/// configurations.
pub struct PredictionContextCache {
	cached: bool,
	canonical_nodes: RefCell<HashMap<Rc<PredictionContext>, Rc<PredictionContext>>>,
	child_cache: HashMap<(PtrKey, i32), Rc<PredictionContext>>,
	join_cache: HashMap<(PtrKey, PtrKey), Rc<PredictionContext>>,
}

impl Default for PredictionContextCache {
	fn default() -> Self {
		Self::new()
	}
}

impl PredictionContextCache {
	pub fn new() -> Self {
		Self { cached: true, canonical_nodes: RefCell::new(HashMap::new()), child_cache: HashMap::new(), join_cache: HashMap::new() }
	}

	pub fn uncached() -> Self {
		Self { cached: false, canonical_nodes: RefCell::new(HashMap::new()), child_cache: HashMap::new(), join_cache: HashMap::new() }
	}

	fn canonicalize(&self, node: Rc<PredictionContext>) -> Rc<PredictionContext> {
		if !self.cached {
			return node;
		}
		let mut table = self.canonical_nodes.borrow_mut();
		if let Some(existing) = table.get(&node) {
			return existing.clone();
		}
		table.insert(node.clone(), node.clone());
		node
	}

	fn make_node(&self, parents: Vec<Rc<PredictionContext>>, return_states: Vec<i32>) -> Rc<PredictionContext> {
		let hash: u32 = PredictionContext::compute_node_hash(&parents, &return_states);
		self.canonicalize(Rc::new(PredictionContext::Node { parents, return_states, hash }))
	}

	/// Create (or retrieve) the singleton node `(parent) -> return_state`.
	pub fn get_child(&mut self, parent: &Rc<PredictionContext>, return_state: i32) -> Rc<PredictionContext> {
		if self.cached {
			let key = (PtrKey(parent.clone()), return_state);
			if let Some(existing) = self.child_cache.get(&key) {
				return existing.clone();
			}
			let child: Rc<PredictionContext> = self.make_node(vec![parent.clone()], vec![return_state]);
			self.child_cache.insert(key, child.clone());
			child
		} else {
			self.make_node(vec![parent.clone()], vec![return_state])
		}
	}

	/// Set-union merge of two prediction-context nodes.
	#[tracing::instrument(level = "trace", skip(self))]
	pub fn join(&mut self, a: &Rc<PredictionContext>, b: &Rc<PredictionContext>) -> Rc<PredictionContext> {
		if Rc::ptr_eq(a, b) || a == b {
			return a.clone();
		}
		match (&**a, &**b) {
			(PredictionContext::Empty { full_context: false }, _) => return a.clone(),
			(_, PredictionContext::Empty { full_context: false }) => return b.clone(),
			(PredictionContext::Empty { full_context: true }, _) => return self.add_empty_context(b),
			(_, PredictionContext::Empty { full_context: true }) => return self.add_empty_context(a),
			_ => {},
		}

		if self.cached {
			let key = unordered_pair_key(a, b);
			if let Some(existing) = self.join_cache.get(&key) {
				return existing.clone();
			}
		}

		let result: Rc<PredictionContext> = match (&**a, &**b) {
			(
				PredictionContext::Node { parents: pa, return_states: ra, .. },
				PredictionContext::Node { parents: pb, return_states: rb, .. },
			) if ra.len() == 1 && rb.len() == 1 && ra[0] == rb[0] => {
				let joined_parent: Rc<PredictionContext> = self.join(&pa[0], &pb[0]);
				if Rc::ptr_eq(&joined_parent, &pa[0]) {
					a.clone()
				} else if Rc::ptr_eq(&joined_parent, &pb[0]) {
					b.clone()
				} else {
					self.get_child(&joined_parent, ra[0])
				}
			},
			(
				PredictionContext::Node { parents: pa, return_states: ra, .. },
				PredictionContext::Node { parents: pb, return_states: rb, .. },
			) => self.merge_arrays(pa.clone(), ra.clone(), pb.clone(), rb.clone(), a, b),
			_ => unreachable!("empty/empty and empty/node cases handled above"),
		};

		if self.cached {
			let key = unordered_pair_key(a, b);
			self.join_cache.insert(key, result.clone());
		}
		result
	}

	fn merge_arrays(
		&mut self,
		pa: Vec<Rc<PredictionContext>>,
		ra: Vec<i32>,
		pb: Vec<Rc<PredictionContext>>,
		rb: Vec<i32>,
		a: &Rc<PredictionContext>,
		b: &Rc<PredictionContext>,
	) -> Rc<PredictionContext> {
		let (mut i, mut j): (usize, usize) = (0, 0);
		let mut merged_parents: Vec<Rc<PredictionContext>> = Vec::with_capacity(ra.len().max(rb.len()));
		let mut merged_states: Vec<i32> = Vec::with_capacity(ra.len().max(rb.len()));
		// Tracks whether every merged entry reproduces the originating
		// side's own entry exactly; if so the merge can return that side's
		// node instead of allocating a new one.
		let mut can_return_left: bool = true;
		let mut can_return_right: bool = true;

		while i < ra.len() && j < rb.len() {
			match ra[i].cmp(&rb[j]) {
				std::cmp::Ordering::Equal => {
					let joined: Rc<PredictionContext> = self.join(&pa[i], &pb[j]);
					can_return_left &= Rc::ptr_eq(&joined, &pa[i]);
					can_return_right &= Rc::ptr_eq(&joined, &pb[j]);
					merged_parents.push(joined);
					merged_states.push(ra[i]);
					i += 1;
					j += 1;
				},
				std::cmp::Ordering::Less => {
					merged_parents.push(pa[i].clone());
					merged_states.push(ra[i]);
					can_return_right = false;
					i += 1;
				},
				std::cmp::Ordering::Greater => {
					merged_parents.push(pb[j].clone());
					merged_states.push(rb[j]);
					can_return_left = false;
					j += 1;
				},
			}
		}
		while i < ra.len() {
			merged_parents.push(pa[i].clone());
			merged_states.push(ra[i]);
			can_return_right = false;
			i += 1;
		}
		while j < rb.len() {
			merged_parents.push(pb[j].clone());
			merged_states.push(rb[j]);
			can_return_left = false;
			j += 1;
		}

		if can_return_left {
			a.clone()
		} else if can_return_right {
			b.clone()
		} else if merged_states.is_empty() {
			empty_full()
		} else {
			self.make_node(merged_parents, merged_states)
		}
	}

	fn add_empty_context(&mut self, other: &Rc<PredictionContext>) -> Rc<PredictionContext> {
		match &**other {
			PredictionContext::Node { parents, return_states, .. } => {
				if matches!(return_states.last(), Some(&EMPTY_FULL_STATE_KEY)) {
					return other.clone();
				}
				let mut new_parents: Vec<Rc<PredictionContext>> = parents.clone();
				new_parents.push(empty_full());
				let mut new_states: Vec<i32> = return_states.clone();
				new_states.push(EMPTY_FULL_STATE_KEY);
				self.make_node(new_parents, new_states)
			},
			PredictionContext::Empty { .. } => other.clone(),
		}
	}

	/// Graft `suffix` onto every leaf of `ctx`. A `suffix` of size > 1 (a
	/// tree suffix) is rejected.
	pub fn append_context(
		&mut self,
		ctx: &Rc<PredictionContext>,
		suffix: &Rc<PredictionContext>,
	) -> Result<Rc<PredictionContext>, PredictionContextError> {
		if suffix.size() > 1 {
			return Err(PredictionContextError::SuffixTooLong(suffix.size()));
		}
		if ctx.is_empty() {
			return Ok(suffix.clone());
		}

		let PredictionContext::Node { parents, return_states, .. } = &**ctx else { unreachable!() };

		if parents.len() == 1 {
			let grafted_parent: Rc<PredictionContext> = self.append_context(&parents[0], suffix)?;
			return Ok(self.get_child(&grafted_parent, return_states[0]));
		}

		let has_empty_tail: bool = ctx.has_empty();
		let graft_count: usize = if has_empty_tail { parents.len() - 1 } else { parents.len() };

		let mut new_parents: Vec<Rc<PredictionContext>> = Vec::with_capacity(graft_count);
		for p in &parents[..graft_count] {
			new_parents.push(self.append_context(p, suffix)?);
		}
		let new_states: Vec<i32> = return_states[..graft_count].to_vec();

		let candidate: Rc<PredictionContext> = if new_parents.len() == 1 {
			self.get_child(&new_parents[0], new_states[0])
		} else {
			self.make_node(new_parents, new_states)
		};

		Ok(if has_empty_tail { self.join(&candidate, suffix) } else { candidate })
	}

	/// Build a prediction context from a runtime call-stack, represented as
	/// return states ordered from outermost (root) to innermost (current
	/// call). Resolving each frame's `follow_state` from an actual
	/// `RuleContext`/`Atn` pair is `crate::rule_context`'s job; this is the
	/// cache-level primitive it builds on.
	pub fn from_return_state_chain(
		&mut self,
		full_context: bool,
		return_states: impl Iterator<Item = usize>,
	) -> Rc<PredictionContext> {
		let mut ctx: Rc<PredictionContext> = if full_context { empty_full() } else { crate::prediction_context::empty_local() };
		for return_state in return_states {
			ctx = self.get_child(&ctx, return_state as i32);
		}
		ctx
	}

	/// Render `root`'s reachable DAG as DOT, numbering nodes in DFS-first-
	/// visit order. Used as a stable, testable textual contract.
	pub fn to_dot(root: &Rc<PredictionContext>) -> String {
		let mut ids: HashMap<PtrKey, usize> = HashMap::new();
		let mut order: Vec<Rc<PredictionContext>> = Vec::new();
		let mut stack: Vec<Rc<PredictionContext>> = vec![root.clone()];
		while let Some(node) = stack.pop() {
			let key: PtrKey = PtrKey(node.clone());
			if ids.contains_key(&key) {
				continue;
			}
			let id: usize = ids.len();
			ids.insert(key, id);
			order.push(node.clone());
			if let PredictionContext::Node { parents, .. } = &*node {
				for p in parents.iter().rev() {
					stack.push(p.clone());
				}
			}
		}

		let mut out: String = String::from("digraph G {\n");
		for node in &order {
			let id: usize = ids[&PtrKey(node.clone())];
			match &**node {
				PredictionContext::Empty { full_context: true } => {
					out.push_str(&format!("  n{id} [label=\"$\"];\n"));
				},
				PredictionContext::Empty { full_context: false } => {
					out.push_str(&format!("  n{id} [label=\"*\"];\n"));
				},
				PredictionContext::Node { parents, return_states, .. } => {
					let slots: Vec<String> = (0..parents.len()).map(|i| format!("<p{i}>{}", return_states[i])).collect();
					out.push_str(&format!("  n{id} [shape=record, label=\"{}\"];\n", slots.join("|")));
					for (i, p) in parents.iter().enumerate() {
						let pid: usize = ids[&PtrKey(p.clone())];
						out.push_str(&format!("  n{id}:p{i} -> n{pid} [label=\"{}\"];\n", return_states[i]));
					}
				},
			}
		}
		out.push_str("}\n");
		out
	}
}
