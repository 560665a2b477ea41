//! Thread-local creation tracking for independent-scope instances.
//!
//! Singleton in-creation tracking is process-wide and lives in the registry;
//! independent-scope tracking is per thread, so a cycle only exists when the
//! same name re-enters creation on the same call stack.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

static NEXT_TRACKER_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
	/// Per-tracker-instance sets of names in creation on this thread.
	static IN_CREATION: RefCell<HashMap<u64, HashSet<String>>> =
		RefCell::new(HashMap::default());
}

/// Tracks independent-scope names currently being constructed on the calling
/// thread. Keyed per tracker instance so two factories sharing a thread do
/// not observe each other's brackets.
pub(crate) struct PrototypeTracker {
	id: u64,
}

impl PrototypeTracker {
	pub(crate) fn new() -> Self {
		Self {
			id: NEXT_TRACKER_ID.fetch_add(1, Ordering::Relaxed),
		}
	}

	pub(crate) fn contains(&self, name: &str) -> bool {
		IN_CREATION.with(|map| {
			map.borrow()
				.get(&self.id)
				.is_some_and(|names| names.contains(name))
		})
	}

	/// Marks `name` as in creation on this thread.
	pub(crate) fn enter(&self, name: &str) {
		IN_CREATION.with(|map| {
			map.borrow_mut()
				.entry(self.id)
				.or_default()
				.insert(name.to_owned());
		});
	}

	/// Clears the in-creation marker. Must run whether creation succeeded or
	/// failed.
	pub(crate) fn exit(&self, name: &str) {
		IN_CREATION.with(|map| {
			let mut map = map.borrow_mut();
			if let Some(names) = map.get_mut(&self.id) {
				names.remove(name);
				if names.is_empty() {
					map.remove(&self.id);
				}
			}
		});
	}
}

impl Drop for PrototypeTracker {
	fn drop(&mut self) {
		// Only the current thread's slot can be reclaimed here; other
		// threads' slots empty out via exit().
		let _ = IN_CREATION.try_with(|map| {
			map.borrow_mut().remove(&self.id);
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Markers are scoped to the tracker instance and the bracket is
	/// symmetric.
	#[test]
	fn brackets_are_per_instance() {
		let a = PrototypeTracker::new();
		let b = PrototypeTracker::new();

		a.enter("x");
		assert!(a.contains("x"));
		assert!(!b.contains("x"));

		a.exit("x");
		assert!(!a.contains("x"));
	}

	/// Markers are invisible from other threads.
	#[test]
	fn markers_are_thread_local() {
		let tracker = std::sync::Arc::new(PrototypeTracker::new());
		tracker.enter("x");

		let remote = tracker.clone();
		let seen = std::thread::spawn(move || remote.contains("x"))
			.join()
			.unwrap();
		assert!(!seen);
		tracker.exit("x");
	}
}
