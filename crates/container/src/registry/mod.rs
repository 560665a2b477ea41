//! Tiered singleton instance cache with circular-reference resolution and
//! dependency-ordered teardown.
//!
//! # Role
//!
//! Owns the three cache tiers (shared instances, early references, early-
//! reference producers), the creation-state bookkeeping for singleton scope,
//! disposal registrations, and the teardown pass.
//!
//! # Invariants
//!
//! - For any name, at most one of {early tier, producer tier} holds an entry.
//! - Tier transitions happen only inside the singleton mutex.
//! - The shared tier never exposes a partially-constructed instance; early
//!   references are handed out only while the name is in creation and only
//!   when the caller allows them.
//! - The in-creation marker is set immediately before a construction attempt
//!   and cleared unconditionally after it, success or failure.

use std::cell::RefCell;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use tracing::{debug, trace, warn};

use crate::error::{ContainerError, Result};
use crate::graph::DependencyGraph;
use crate::object::{DisposalHandle, Instance};


/// Maximum number of suppressed secondary failures preserved per
/// construction attempt.
pub(crate) const SUPPRESSED_LIMIT: usize = 100;

/// Deferred construction of an early reference, registered before the owning
/// construction attempt completes. Invoked at most once.
pub type EarlyProducer = Box<dyn FnOnce() -> Instance + Send>;

/// State guarded by the singleton mutex.
#[derive(Default)]
struct Tiers {
	/// Tertiary tier: early-reference producers.
	producers: HashMap<String, EarlyProducer>,
	/// Every name ever placed into any tier, in registration order.
	registered: IndexSet<String>,
	/// Secondary failures for the in-flight creation attempt, capped at
	/// [`SUPPRESSED_LIMIT`].
	suppressed: Option<Vec<ContainerError>>,
	/// Set for the duration of a full teardown pass.
	in_teardown: bool,
}

/// Registry of shared instances.
///
/// The singleton mutex is reentrant: a constructor running inside
/// [`SingletonRegistry::resolve_or_create`] re-enters the registry on the
/// same thread to resolve its prerequisites. Cross-thread, the mutex is held
/// across the whole construction, which is what guarantees at-most-one
/// construction per name.
pub struct SingletonRegistry {
	/// Primary tier: fully-initialized instances. Reads take no singleton
	/// mutex; writes happen only inside it.
	shared: RwLock<HashMap<String, Instance>>,
	/// Secondary tier: early references exposed to break cycles.
	early: RwLock<HashMap<String, Instance>>,
	/// The singleton mutex, guarding tier transitions and the bookkeeping in
	/// [`Tiers`].
	mutex: ReentrantMutex<RefCell<Tiers>>,
	/// Singleton names currently being constructed, process-wide.
	in_creation: RwLock<HashSet<String>>,
	/// Names permanently exempted from in-creation checks.
	creation_exclusions: RwLock<HashSet<String>>,
	/// Disposal handles in registration order.
	disposables: Mutex<IndexMap<String, DisposalHandle>>,
	/// name → names contained within it (inner instances destroyed after it).
	contained: Mutex<HashMap<String, IndexSet<String>>>,
	graph: DependencyGraph,
}

impl Default for SingletonRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl SingletonRegistry {
	pub fn new() -> Self {
		Self {
			shared: RwLock::new(HashMap::default()),
			early: RwLock::new(HashMap::default()),
			mutex: ReentrantMutex::new(RefCell::new(Tiers::default())),
			in_creation: RwLock::new(HashSet::default()),
			creation_exclusions: RwLock::new(HashSet::default()),
			disposables: Mutex::new(IndexMap::new()),
			contained: Mutex::new(HashMap::default()),
			graph: DependencyGraph::new(),
		}
	}

	/// Runs `f` inside the singleton mutex, so collaborators can extend a
	/// creation transaction without introducing a second lock.
	pub fn with_singleton_lock<R>(&self, f: impl FnOnce() -> R) -> R {
		let _guard = self.mutex.lock();
		f()
	}

	/// Registers a fully-initialized instance under `name`.
	///
	/// Registering the identical instance again is a no-op; a different
	/// instance under an occupied name is [`ContainerError::AlreadyRegistered`].
	pub fn register(&self, name: &str, instance: Instance) -> Result<()> {
		let _guard = self.mutex.lock();
		if let Some(existing) = self.shared.read().get(name) {
			if Arc::ptr_eq(existing, &instance) {
				return Ok(());
			}
			return Err(ContainerError::AlreadyRegistered {
				name: name.to_owned(),
			});
		}
		self.install(name, instance);
		Ok(())
	}

	/// Moves an instance into the primary tier, purging the early and
	/// producer tiers for the name.
	fn install(&self, name: &str, instance: Instance) {
		let guard = self.mutex.lock();
		self.shared.write().insert(name.to_owned(), instance);
		self.early.write().remove(name);
		let mut tiers = guard.borrow_mut();
		tiers.producers.remove(name);
		tiers.registered.insert(name.to_owned());
	}

	/// Registers a producer able to hand out an early reference for `name`
	/// while its construction is still running. No effect once the primary
	/// tier holds the name.
	pub fn register_early_producer(&self, name: &str, producer: EarlyProducer) {
		let guard = self.mutex.lock();
		if self.shared.read().contains_key(name) {
			return;
		}
		{
			let mut tiers = guard.borrow_mut();
			tiers.producers.insert(name.to_owned(), producer);
			tiers.registered.insert(name.to_owned());
		}
		self.early.write().remove(name);
	}

	/// The central tiered read.
	///
	/// The primary tier answers without the singleton mutex; the early and
	/// producer tiers only matter while a construction for `name` is in
	/// flight, so the critical section activates only while a cycle is
	/// actually being resolved.
	pub fn lookup(&self, name: &str, allow_early: bool) -> Option<Instance> {
		if let Some(found) = self.shared.read().get(name) {
			return Some(found.clone());
		}
		if !self.is_singleton_in_creation(name) {
			return None;
		}
		if let Some(found) = self.early.read().get(name) {
			return Some(found.clone());
		}
		if !allow_early {
			return None;
		}
		let guard = self.mutex.lock();
		// Re-check both instance tiers: another thread may have finished in
		// the meantime.
		if let Some(found) = self.shared.read().get(name) {
			return Some(found.clone());
		}
		if let Some(found) = self.early.read().get(name) {
			return Some(found.clone());
		}
		let producer = guard.borrow_mut().producers.remove(name)?;
		let early = producer();
		trace!(name, "exposed early reference for in-creation singleton");
		self.early.write().insert(name.to_owned(), early.clone());
		Some(early)
	}

	/// Primary-tier probe. Never consults the early or producer tiers.
	pub fn peek(&self, name: &str) -> Option<Instance> {
		self.shared.read().get(name).cloned()
	}

	/// Returns the shared instance for `name`, constructing it if absent.
	///
	/// Holds the singleton mutex across `constructor`, so concurrent
	/// requests for the same name observe exactly one construction. A
	/// reentrant attempt for the same name with no early reference exposed
	/// fails with [`ContainerError::CurrentlyInCreation`].
	pub fn resolve_or_create(
		&self,
		name: &str,
		constructor: impl FnOnce() -> Result<Instance>,
	) -> Result<Instance> {
		let guard = self.mutex.lock();
		if let Some(existing) = self.shared.read().get(name) {
			return Ok(existing.clone());
		}
		if guard.borrow().in_teardown {
			return Err(ContainerError::CreationDuringTeardown {
				name: name.to_owned(),
			});
		}
		debug!(name, "creating shared instance");
		self.before_singleton_creation(name)?;
		let record_suppressed = {
			let mut tiers = guard.borrow_mut();
			if tiers.suppressed.is_none() {
				tiers.suppressed = Some(Vec::new());
				true
			} else {
				false
			}
		};

		let outcome = constructor();

		// Unconditional cleanup: the marker and the suppressed buffer are
		// cleared whether construction succeeded or failed.
		let suppressed = if record_suppressed {
			guard.borrow_mut().suppressed.take().unwrap_or_default()
		} else {
			Vec::new()
		};
		self.after_singleton_creation(name);

		match outcome {
			Ok(created) => {
				self.install(name, created.clone());
				Ok(created)
			}
			Err(err) => {
				// The instance may have appeared through another path during
				// construction; any instance present now is authoritative.
				if let Some(existing) = self.shared.read().get(name) {
					return Ok(existing.clone());
				}
				Err(err.with_related(name, suppressed))
			}
		}
	}

	/// Records a secondary failure observed (and swallowed) while resolving
	/// a name's dependencies; attached as a related cause to the eventual
	/// top-level creation failure. Bounded to [`SUPPRESSED_LIMIT`] entries.
	pub fn on_suppressed(&self, err: ContainerError) {
		let guard = self.mutex.lock();
		let mut tiers = guard.borrow_mut();
		if let Some(buffer) = tiers.suppressed.as_mut() {
			if buffer.len() < SUPPRESSED_LIMIT {
				buffer.push(err);
			}
		}
	}

	/// Atomically clears `name` from all three tiers and the registered set.
	/// Used for failure rollback.
	pub fn remove(&self, name: &str) {
		let guard = self.mutex.lock();
		self.shared.write().remove(name);
		self.early.write().remove(name);
		let mut tiers = guard.borrow_mut();
		tiers.producers.remove(name);
		tiers.registered.shift_remove(name);
	}

	pub fn contains(&self, name: &str) -> bool {
		self.shared.read().contains_key(name)
	}

	/// Every name ever placed into any tier, in registration order.
	pub fn names(&self) -> Vec<String> {
		let guard = self.mutex.lock();
		let tiers = guard.borrow();
		tiers.registered.iter().cloned().collect()
	}

	pub fn count(&self) -> usize {
		let guard = self.mutex.lock();
		let count = guard.borrow().registered.len();
		count
	}

	// -- creation-state tracking ------------------------------------------

	/// Permanently exempts `name` from in-creation checks when `in_creation`
	/// is `false`; re-enables checks when `true`.
	pub fn set_currently_in_creation(&self, name: &str, in_creation: bool) {
		if in_creation {
			self.creation_exclusions.write().remove(name);
		} else {
			self.creation_exclusions.write().insert(name.to_owned());
		}
	}

	pub(crate) fn is_creation_exempt(&self, name: &str) -> bool {
		self.creation_exclusions.read().contains(name)
	}

	/// Exclusion-aware in-creation query.
	pub fn is_currently_in_creation(&self, name: &str) -> bool {
		!self.is_creation_exempt(name) && self.is_singleton_in_creation(name)
	}

	/// Raw in-creation query, ignoring exclusions. This is what the lookup
	/// fast path consults.
	pub fn is_singleton_in_creation(&self, name: &str) -> bool {
		self.in_creation.read().contains(name)
	}

	fn before_singleton_creation(&self, name: &str) -> Result<()> {
		if self.is_creation_exempt(name) {
			return Ok(());
		}
		if !self.in_creation.write().insert(name.to_owned()) {
			return Err(ContainerError::CurrentlyInCreation {
				name: name.to_owned(),
			});
		}
		Ok(())
	}

	fn after_singleton_creation(&self, name: &str) {
		if self.is_creation_exempt(name) {
			return;
		}
		if !self.in_creation.write().remove(name) {
			warn!(name, "singleton was not marked as in creation");
		}
	}

	// -- dependency and disposal bookkeeping ------------------------------

	pub fn graph(&self) -> &DependencyGraph {
		&self.graph
	}

	/// Registers a handle invoked for `name` at teardown. Insertion order
	/// determines (reverse) destruction order among unrelated names.
	pub fn register_disposal(&self, name: &str, handle: DisposalHandle) {
		self.disposables.lock().insert(name.to_owned(), handle);
	}

	/// Records that `contained` lives inside `containing`; the containing
	/// instance is destroyed before what it contains.
	pub fn register_contained(&self, contained: &str, containing: &str) {
		{
			let mut map = self.contained.lock();
			let inner = map.entry(containing.to_owned()).or_default();
			if !inner.insert(contained.to_owned()) {
				return;
			}
		}
		self.graph.declare(containing, contained);
	}

	// -- teardown ----------------------------------------------------------

	/// Destroys every disposal registration in reverse registration order,
	/// dependents before dependencies, then clears all tiers.
	///
	/// While the pass runs, any new singleton construction fails with
	/// [`ContainerError::CreationDuringTeardown`].
	pub fn destroy_singletons(&self) {
		trace!("destroying singletons");
		{
			let guard = self.mutex.lock();
			guard.borrow_mut().in_teardown = true;
		}

		let names: Vec<String> = self.disposables.lock().keys().cloned().collect();
		for name in names.iter().rev() {
			self.destroy_singleton(name);
		}

		self.contained.lock().clear();
		self.graph.clear();
		self.clear_tiers();
	}

	/// Destroys a single name: removes it from all tiers, then invokes its
	/// disposal handle after destroying its dependents.
	pub fn destroy_singleton(&self, name: &str) {
		self.remove(name);
		let handle = self.disposables.lock().shift_remove(name);
		self.destroy_instance(name, handle);
	}

	fn destroy_instance(&self, name: &str, handle: Option<DisposalHandle>) {
		// Dependents first, depth-first.
		if let Some(dependents) = self.graph.take_dependents(name) {
			trace!(name, count = dependents.len(), "destroying dependents first");
			for dependent in &dependents {
				self.destroy_singleton(dependent);
			}
		}

		if let Some(handle) = handle {
			if let Err(err) = handle() {
				warn!(name, error = %err, "disposal handle failed");
			}
		}

		// Then anything contained within the destroyed instance.
		let contained = self.contained.lock().remove(name);
		if let Some(contained) = contained {
			for inner in &contained {
				self.destroy_singleton(inner);
			}
		}

		self.graph.prune(name);
	}

	fn clear_tiers(&self) {
		let guard = self.mutex.lock();
		self.shared.write().clear();
		self.early.write().clear();
		let mut tiers = guard.borrow_mut();
		tiers.producers.clear();
		tiers.registered.clear();
		tiers.in_teardown = false;
	}
}
