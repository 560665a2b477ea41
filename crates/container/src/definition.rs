//! Definition store boundary: what the orchestrator needs to know about a
//! name before it can create an instance for it.
//!
//! Parsing and structural validation of definitions happen outside this
//! crate; the store is consumed as a capability.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap as HashMap;

use crate::error::{ContainerError, Result};

/// Lifecycle scope of a definition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ObjectScope {
	/// At most one shared instance per name for the registry's lifetime.
	#[default]
	Singleton,
	/// A fresh instance per request, never cached.
	Independent,
	/// Storage and lifecycle delegated to the named scope collaborator.
	Custom(String),
}

/// Static facts about a named object: its scope, the names it declares as
/// prerequisites, and an optional containing (outer) name.
#[derive(Clone, Debug, Default)]
pub struct ObjectDefinition {
	pub scope: ObjectScope,
	/// Prerequisites resolved to completion before this name is constructed.
	pub depends_on: Vec<String>,
	/// Outer name this definition is contained within; the outer instance is
	/// destroyed before this one at teardown.
	pub contained_in: Option<String>,
}

impl ObjectDefinition {
	pub fn singleton() -> Self {
		Self::default()
	}

	pub fn independent() -> Self {
		Self {
			scope: ObjectScope::Independent,
			..Self::default()
		}
	}

	pub fn custom(scope_name: impl Into<String>) -> Self {
		Self {
			scope: ObjectScope::Custom(scope_name.into()),
			..Self::default()
		}
	}

	pub fn depends_on(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.depends_on = names.into_iter().map(Into::into).collect();
		self
	}

	pub fn contained_in(mut self, outer: impl Into<String>) -> Self {
		self.contained_in = Some(outer.into());
		self
	}

	pub fn is_singleton(&self) -> bool {
		self.scope == ObjectScope::Singleton
	}

	pub fn is_independent(&self) -> bool {
		self.scope == ObjectScope::Independent
	}
}

/// Supplies definitions by canonical name.
pub trait DefinitionStore: Send + Sync {
	fn contains(&self, name: &str) -> bool;

	/// Fails with [`ContainerError::MissingDefinition`] for unknown names.
	fn get(&self, name: &str) -> Result<Arc<ObjectDefinition>>;
}

/// In-memory definition store.
#[derive(Default)]
pub struct DefinitionMap {
	definitions: RwLock<HashMap<String, Arc<ObjectDefinition>>>,
}

impl DefinitionMap {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, name: impl Into<String>, definition: ObjectDefinition) {
		self.definitions
			.write()
			.insert(name.into(), Arc::new(definition));
	}

	pub fn names(&self) -> Vec<String> {
		self.definitions.read().keys().cloned().collect()
	}
}

impl DefinitionStore for DefinitionMap {
	fn contains(&self, name: &str) -> bool {
		self.definitions.read().contains_key(name)
	}

	fn get(&self, name: &str) -> Result<Arc<ObjectDefinition>> {
		self.definitions
			.read()
			.get(name)
			.cloned()
			.ok_or_else(|| ContainerError::MissingDefinition {
				name: name.to_owned(),
			})
	}
}
