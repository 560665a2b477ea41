//! Retrieval orchestrator: the per-request algorithm deciding whether a name
//! resolves from cache, gets created, delegates to a parent factory, or
//! dispatches to a custom scope.

use std::any::{Any, TypeId, type_name};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use tracing::trace;

use crate::alias::AliasRegistry;
use crate::convert::{NoConversion, TypeConverter};
use crate::definition::{DefinitionStore, ObjectDefinition, ObjectScope};
use crate::error::{ContainerError, Result};
use crate::object::{DisposalHandle, Instance, Producer};
use crate::registry::SingletonRegistry;
use crate::scope::Scope;
use crate::strategy::ConstructionStrategy;
use crate::tracker::PrototypeTracker;

#[cfg(test)]
mod tests;

/// Reserved scope name for shared instances.
pub const SCOPE_SINGLETON: &str = "singleton";
/// Reserved scope name for per-request instances.
pub const SCOPE_INDEPENDENT: &str = "independent";

/// Request prefix addressing an indirect producer itself rather than what it
/// produces.
pub const PRODUCER_PREFIX: &str = "&";

/// The container factory: composes the singleton registry, the dependency
/// graph, and the external construction strategy to answer "give me the
/// instance for name N".
///
/// Thread-safe; share across threads via `Arc<ContainerFactory>`.
pub struct ContainerFactory {
	registry: Arc<SingletonRegistry>,
	aliases: AliasRegistry,
	definitions: Arc<dyn DefinitionStore>,
	strategy: Arc<dyn ConstructionStrategy>,
	converter: Arc<dyn TypeConverter>,
	parent: Option<Arc<ContainerFactory>>,
	scopes: RwLock<HashMap<String, Arc<dyn Scope>>>,
	prototypes: PrototypeTracker,
	/// Names that have begun creation at least once.
	already_created: RwLock<HashSet<String>>,
}

impl ContainerFactory {
	pub fn new(
		definitions: Arc<dyn DefinitionStore>,
		strategy: Arc<dyn ConstructionStrategy>,
	) -> Self {
		Self {
			registry: Arc::new(SingletonRegistry::new()),
			aliases: AliasRegistry::new(),
			definitions,
			strategy,
			converter: Arc::new(NoConversion),
			parent: None,
			scopes: RwLock::new(HashMap::default()),
			prototypes: PrototypeTracker::new(),
			already_created: RwLock::new(HashSet::default()),
		}
	}

	/// Delegates requests with no local definition to `parent`.
	pub fn with_parent(mut self, parent: Arc<ContainerFactory>) -> Self {
		self.parent = Some(parent);
		self
	}

	pub fn with_converter(mut self, converter: Arc<dyn TypeConverter>) -> Self {
		self.converter = converter;
		self
	}

	pub fn registry(&self) -> &SingletonRegistry {
		&self.registry
	}

	pub fn parent(&self) -> Option<&Arc<ContainerFactory>> {
		self.parent.as_ref()
	}

	// -- retrieval ----------------------------------------------------------

	/// Resolves the instance for `name`.
	pub fn get(&self, name: &str) -> Result<Instance> {
		self.resolve(name, None)
	}

	/// Resolves `name`, passing explicit construction arguments through to
	/// the construction strategy. Explicit arguments bypass the singleton
	/// fast path: they only make sense for a fresh construction.
	pub fn get_with_args(&self, name: &str, args: &[Instance]) -> Result<Instance> {
		self.resolve(name, Some(args))
	}

	/// Resolves `name` and downcasts to `T`, consulting the registered
	/// converter before failing with [`ContainerError::TypeMismatch`].
	pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
		let found = self.get(name)?;
		if let Ok(typed) = found.clone().downcast::<T>() {
			return Ok(typed);
		}
		if let Some(converted) = self.converter.convert(name, &found, TypeId::of::<T>()) {
			if let Ok(typed) = converted.downcast::<T>() {
				return Ok(typed);
			}
			trace!(name, required = type_name::<T>(), "conversion yielded wrong type");
		}
		Err(ContainerError::TypeMismatch {
			name: name.to_owned(),
			required: type_name::<T>(),
		})
	}

	fn resolve(&self, name: &str, args: Option<&[Instance]>) -> Result<Instance> {
		let canonical = self.transformed_name(name);

		// Fast path: already-cached instance (or an early reference, when a
		// construction for the name is in flight somewhere).
		if args.is_none() {
			if let Some(shared) = self.registry.lookup(&canonical, true) {
				if self.registry.is_singleton_in_creation(&canonical) {
					trace!(
						name = %canonical,
						"returning eagerly cached instance that is not fully initialized yet"
					);
				} else {
					trace!(name = %canonical, "returning cached instance");
				}
				return self.object_for_instance(shared, name, &canonical);
			}
		}

		// Independent-scope cycles have no implicit resolution.
		if self.is_prototype_in_creation(&canonical) {
			return Err(ContainerError::ReentrantCreation { name: canonical });
		}

		// No local definition: the parent registry answers the whole request.
		if !self.definitions.contains(&canonical) {
			if let Some(parent) = &self.parent {
				let name_to_lookup = self.original_name(name);
				return parent.resolve(&name_to_lookup, args);
			}
		}

		self.already_created.write().insert(canonical.clone());

		let resolved = self.resolve_locally(name, &canonical, args);
		if resolved.is_err() {
			self.cleanup_after_failure(&canonical);
		}
		resolved
	}

	fn resolve_locally(
		&self,
		name: &str,
		canonical: &str,
		args: Option<&[Instance]>,
	) -> Result<Instance> {
		let definition = self.definitions.get(canonical)?;

		// Prerequisites are resolved to completion before construction; a
		// declared cycle cannot be satisfied by ordering and fails here.
		for dep in &definition.depends_on {
			let dep = self.aliases.canonical_name(dep);
			if self.registry.graph().is_transitively_dependent(canonical, &dep) {
				return Err(ContainerError::IllegalDependencyCycle {
					name: canonical.to_owned(),
					dependency: dep,
				});
			}
			self.registry.graph().declare(canonical, &dep);
			if let Err(err) = self.get(&dep) {
				return Err(ContainerError::creation_with(
					canonical,
					format!("'{canonical}' depends on missing or failed prerequisite '{dep}'"),
					err,
				));
			}
		}

		let resolved = match &definition.scope {
			ObjectScope::Singleton => self.registry.resolve_or_create(canonical, || {
				self.construct_singleton(canonical, &definition, args)
			})?,
			ObjectScope::Independent => {
				self.before_prototype_creation(canonical);
				let created = self.construct(canonical, &definition, args);
				self.after_prototype_creation(canonical);
				created?
			}
			ObjectScope::Custom(scope_name) => {
				let scope = self.scopes.read().get(scope_name).cloned().ok_or_else(|| {
					ContainerError::UnknownScope {
						name: canonical.to_owned(),
						scope: scope_name.clone(),
					}
				})?;
				let mut create = || {
					self.before_prototype_creation(canonical);
					let created = self.construct(canonical, &definition, args);
					self.after_prototype_creation(canonical);
					created
				};
				scope.get(canonical, &mut create)?
			}
		};

		self.object_for_instance(resolved, name, canonical)
	}

	/// The constructor run inside the registry's critical section for
	/// singleton scope. Exposes the raw instance as an early-reference
	/// producer between the two construction phases, and rolls the name back
	/// on failure unless an instance appeared through another path.
	fn construct_singleton(
		&self,
		canonical: &str,
		definition: &ObjectDefinition,
		args: Option<&[Instance]>,
	) -> Result<Instance> {
		let attempt = (|| {
			let raw = self
				.strategy
				.instantiate(self, canonical, definition, args)?;
			let early = raw.clone();
			self.registry
				.register_early_producer(canonical, Box::new(move || early));
			self.strategy.initialize(self, canonical, definition, raw)
		})();

		match attempt {
			Ok(created) => {
				if let Some(outer) = &definition.contained_in {
					let outer = self.aliases.canonical_name(outer);
					self.registry.register_contained(canonical, &outer);
				}
				Ok(created)
			}
			Err(err) => {
				// An instance that appeared concurrently is authoritative;
				// otherwise roll back eager tier entries so a retry starts
				// clean.
				if let Some(existing) = self.registry.peek(canonical) {
					return Ok(existing);
				}
				self.registry.destroy_singleton(canonical);
				Err(err)
			}
		}
	}

	/// Plain two-phase construction with no early-reference exposure, used
	/// for independent and custom scopes.
	fn construct(
		&self,
		canonical: &str,
		definition: &ObjectDefinition,
		args: Option<&[Instance]>,
	) -> Result<Instance> {
		let raw = self
			.strategy
			.instantiate(self, canonical, definition, args)?;
		self.strategy.initialize(self, canonical, definition, raw)
	}

	/// Adapts a resolved instance to the requested form: dereferences an
	/// indirect producer unless the request addressed the producer itself.
	fn object_for_instance(
		&self,
		found: Instance,
		requested: &str,
		canonical: &str,
	) -> Result<Instance> {
		let producer_request = is_producer_request(requested);
		if let Some(producer) = found.downcast_ref::<Producer>() {
			if producer_request {
				return Ok(found);
			}
			trace!(name = %canonical, "dereferencing indirect producer");
			return producer.produce();
		}
		if producer_request {
			return Err(ContainerError::NotAProducer {
				name: canonical.to_owned(),
			});
		}
		Ok(found)
	}

	// -- registration surfaces ---------------------------------------------

	/// Registers an existing, fully-initialized instance under `name`.
	pub fn register_instance(&self, name: &str, instance: Instance) -> Result<()> {
		let canonical = self.transformed_name(name);
		self.registry.register(&canonical, instance)
	}

	/// Registers `alias` for `name`.
	pub fn register_alias(&self, name: &str, alias: &str) -> Result<()> {
		self.aliases.register_alias(name, alias)
	}

	/// Declares that `name` depends on `depends_on`, for teardown ordering.
	pub fn register_dependency(&self, name: &str, depends_on: &str) {
		let name = self.transformed_name(name);
		let depends_on = self.transformed_name(depends_on);
		self.registry.graph().declare(&name, &depends_on);
	}

	/// Registers a containment relationship: `contained` lives inside
	/// `containing`.
	pub fn register_contained(&self, contained: &str, containing: &str) {
		let contained = self.transformed_name(contained);
		let containing = self.transformed_name(containing);
		self.registry.register_contained(&contained, &containing);
	}

	/// Registers a disposal handle invoked for `name` at teardown.
	pub fn register_disposal(&self, name: &str, handle: DisposalHandle) {
		let canonical = self.transformed_name(name);
		self.registry.register_disposal(&canonical, handle);
	}

	/// Registers a custom scope. The built-in scope names are reserved.
	pub fn register_scope(&self, scope_name: &str, scope: Arc<dyn Scope>) -> Result<()> {
		if scope_name == SCOPE_SINGLETON || scope_name == SCOPE_INDEPENDENT {
			return Err(ContainerError::ReservedScope {
				scope: scope_name.to_owned(),
			});
		}
		self.scopes.write().insert(scope_name.to_owned(), scope);
		Ok(())
	}

	pub fn registered_scope(&self, scope_name: &str) -> Option<Arc<dyn Scope>> {
		self.scopes.read().get(scope_name).cloned()
	}

	pub fn registered_scope_names(&self) -> Vec<String> {
		self.scopes.read().keys().cloned().collect()
	}

	/// Records a secondary failure swallowed while resolving dependencies of
	/// the construction currently in flight.
	pub fn suppress(&self, err: ContainerError) {
		self.registry.on_suppressed(err);
	}

	// -- introspection ------------------------------------------------------

	/// Whether `name` resolves here: a cached singleton, a local definition,
	/// or anything the parent can answer for.
	pub fn contains(&self, name: &str) -> bool {
		let canonical = self.transformed_name(name);
		if self.registry.contains(&canonical) || self.definitions.contains(&canonical) {
			return true;
		}
		self.parent
			.as_ref()
			.is_some_and(|parent| parent.contains(&self.original_name(name)))
	}

	/// Whether creation of `name` has begun at least once.
	pub fn was_created(&self, name: &str) -> bool {
		let canonical = self.transformed_name(name);
		self.already_created.read().contains(&canonical)
	}

	// -- teardown -----------------------------------------------------------

	/// Tears down every registered disposal handle and clears all caches.
	pub fn destroy_singletons(&self) {
		self.registry.destroy_singletons();
	}

	/// Destroys a single name, dependents first.
	pub fn destroy_singleton(&self, name: &str) {
		let canonical = self.transformed_name(name);
		self.registry.destroy_singleton(&canonical);
	}

	// -- name handling ------------------------------------------------------

	/// Strips any producer-dereference prefix and canonicalizes aliases.
	fn transformed_name(&self, name: &str) -> String {
		self.aliases.canonical_name(strip_producer_prefix(name))
	}

	/// Canonical name with the producer-dereference prefix restored, for
	/// delegating the original request shape to a parent.
	fn original_name(&self, name: &str) -> String {
		let canonical = self.transformed_name(name);
		if is_producer_request(name) {
			format!("{PRODUCER_PREFIX}{canonical}")
		} else {
			canonical
		}
	}

	// -- creation-state brackets ---------------------------------------------

	fn is_prototype_in_creation(&self, name: &str) -> bool {
		!self.registry.is_creation_exempt(name) && self.prototypes.contains(name)
	}

	fn before_prototype_creation(&self, name: &str) {
		if self.registry.is_creation_exempt(name) {
			return;
		}
		self.prototypes.enter(name);
	}

	fn after_prototype_creation(&self, name: &str) {
		if self.registry.is_creation_exempt(name) {
			return;
		}
		self.prototypes.exit(name);
	}

	fn cleanup_after_failure(&self, canonical: &str) {
		self.already_created.write().remove(canonical);
	}
}

fn is_producer_request(name: &str) -> bool {
	name.starts_with(PRODUCER_PREFIX)
}

fn strip_producer_prefix(name: &str) -> &str {
	name.trim_start_matches(PRODUCER_PREFIX)
}
