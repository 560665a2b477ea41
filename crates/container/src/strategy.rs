//! Construction strategy boundary.
//!
//! Construction is two-phase: `instantiate` yields a raw (allocated but not
//! yet wired) instance, `initialize` completes it. The orchestrator exposes
//! the raw instance as an early-reference producer between the phases, which
//! is what lets two singletons that reference each other both finish.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap as HashMap;

use crate::definition::ObjectDefinition;
use crate::error::{ContainerError, Result};
use crate::factory::ContainerFactory;
use crate::object::Instance;

/// Creates concrete instances from definitions. Implementations may call
/// back into the factory for the prerequisites they need; that re-entrancy
/// is exactly what the creation-state tracking guards.
pub trait ConstructionStrategy: Send + Sync {
	/// Produces the raw instance for `name`.
	fn instantiate(
		&self,
		factory: &ContainerFactory,
		name: &str,
		definition: &ObjectDefinition,
		args: Option<&[Instance]>,
	) -> Result<Instance>;

	/// Completes a raw instance (wiring, callbacks). The default returns it
	/// unchanged.
	fn initialize(
		&self,
		factory: &ContainerFactory,
		name: &str,
		definition: &ObjectDefinition,
		raw: Instance,
	) -> Result<Instance> {
		let _ = (factory, name, definition);
		Ok(raw)
	}
}

type ProviderFn = Box<dyn Fn(&ContainerFactory) -> Result<Instance> + Send + Sync>;
type InitializerFn = Box<dyn Fn(&ContainerFactory, Instance) -> Result<Instance> + Send + Sync>;

struct ProviderEntry {
	construct: ProviderFn,
	initialize: Option<InitializerFn>,
}

/// Closure-backed construction strategy: one provider (and optionally one
/// initializer) per name.
#[derive(Default)]
pub struct ProviderStrategy {
	entries: RwLock<HashMap<String, Arc<ProviderEntry>>>,
}

impl ProviderStrategy {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a single-phase provider for `name`.
	pub fn provide(
		&self,
		name: impl Into<String>,
		construct: impl Fn(&ContainerFactory) -> Result<Instance> + Send + Sync + 'static,
	) {
		self.entries.write().insert(
			name.into(),
			Arc::new(ProviderEntry {
				construct: Box::new(construct),
				initialize: None,
			}),
		);
	}

	/// Registers a two-phase provider: `construct` yields the raw instance,
	/// `initialize` wires it. Needed by any name participating in a
	/// singleton reference cycle.
	pub fn provide_two_phase(
		&self,
		name: impl Into<String>,
		construct: impl Fn(&ContainerFactory) -> Result<Instance> + Send + Sync + 'static,
		initialize: impl Fn(&ContainerFactory, Instance) -> Result<Instance> + Send + Sync + 'static,
	) {
		self.entries.write().insert(
			name.into(),
			Arc::new(ProviderEntry {
				construct: Box::new(construct),
				initialize: Some(Box::new(initialize)),
			}),
		);
	}

	fn entry(&self, name: &str) -> Option<Arc<ProviderEntry>> {
		self.entries.read().get(name).cloned()
	}
}

impl ConstructionStrategy for ProviderStrategy {
	fn instantiate(
		&self,
		factory: &ContainerFactory,
		name: &str,
		_definition: &ObjectDefinition,
		_args: Option<&[Instance]>,
	) -> Result<Instance> {
		let entry = self
			.entry(name)
			.ok_or_else(|| ContainerError::creation(name, "no provider registered"))?;
		(entry.construct)(factory)
	}

	fn initialize(
		&self,
		factory: &ContainerFactory,
		name: &str,
		_definition: &ObjectDefinition,
		raw: Instance,
	) -> Result<Instance> {
		if let Some(entry) = self.entry(name) {
			if let Some(initialize) = entry.initialize.as_ref() {
				return initialize(factory, raw);
			}
		}
		Ok(raw)
	}
}
