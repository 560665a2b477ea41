//! Dependency graph: mirrored adjacency maps ordering teardown and rejecting
//! illegal declared cycles.
//!
//! # Invariants
//!
//! - Every edge inserted into the dependents map has its mirror in the
//!   dependencies map (both inserted by [`DependencyGraph::declare`]).
//! - Reachability checks terminate on cyclic graphs (visited set).

use indexmap::IndexSet;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

/// Bidirectional dependency bookkeeping between instance names.
///
/// The two maps have independent locks: dependency bookkeeping is logically
/// separate from instance caching and contention differs.
#[derive(Default)]
pub struct DependencyGraph {
	/// name → names that depend on it.
	dependents: Mutex<HashMap<String, IndexSet<String>>>,
	/// name → names it depends on.
	dependencies: Mutex<HashMap<String, IndexSet<String>>>,
}

impl DependencyGraph {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records that `name` depends on `depends_on`. Idempotent.
	pub fn declare(&self, name: &str, depends_on: &str) {
		{
			let mut dependents = self.dependents.lock();
			let entry = dependents.entry(depends_on.to_owned()).or_default();
			if !entry.insert(name.to_owned()) {
				return;
			}
		}
		self.dependencies
			.lock()
			.entry(name.to_owned())
			.or_default()
			.insert(depends_on.to_owned());
	}

	/// True iff `candidate` is reachable from `name` over the dependents
	/// direction, i.e. `candidate` (transitively) depends on `name`.
	pub fn is_transitively_dependent(&self, name: &str, candidate: &str) -> bool {
		let dependents = self.dependents.lock();
		let mut seen = HashSet::default();
		Self::reachable(&dependents, name, candidate, &mut seen)
	}

	fn reachable(
		dependents: &HashMap<String, IndexSet<String>>,
		name: &str,
		candidate: &str,
		seen: &mut HashSet<String>,
	) -> bool {
		if !seen.insert(name.to_owned()) {
			return false;
		}
		let Some(direct) = dependents.get(name) else {
			return false;
		};
		if direct.contains(candidate) {
			return true;
		}
		direct
			.iter()
			.any(|transitive| Self::reachable(dependents, transitive, candidate, seen))
	}

	pub fn has_dependents(&self, name: &str) -> bool {
		self.dependents.lock().contains_key(name)
	}

	/// Names that directly depend on `name`, in declaration order.
	pub fn dependents_of(&self, name: &str) -> Vec<String> {
		self.dependents
			.lock()
			.get(name)
			.map(|set| set.iter().cloned().collect())
			.unwrap_or_default()
	}

	/// Names that `name` directly depends on, in declaration order.
	pub fn dependencies_of(&self, name: &str) -> Vec<String> {
		self.dependencies
			.lock()
			.get(name)
			.map(|set| set.iter().cloned().collect())
			.unwrap_or_default()
	}

	/// Removes and returns the direct dependents of `name`. Taken under the
	/// full lock so the caller iterates a disconnected set.
	pub fn take_dependents(&self, name: &str) -> Option<IndexSet<String>> {
		self.dependents.lock().remove(name)
	}

	/// Removes a destroyed name everywhere: as a key and as a member of every
	/// other name's edge set.
	pub fn prune(&self, name: &str) {
		{
			let mut dependents = self.dependents.lock();
			dependents.remove(name);
			dependents.retain(|_, set| {
				set.shift_remove(name);
				!set.is_empty()
			});
		}
		self.dependencies.lock().remove(name);
	}

	pub fn clear(&self) {
		self.dependents.lock().clear();
		self.dependencies.lock().clear();
	}
}
