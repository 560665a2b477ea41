//! Error taxonomy for container resolution and teardown.

/// Crate-wide result alias.
pub type Result<T, E = ContainerError> = std::result::Result<T, E>;

/// Failure kinds surfaced by the registry and the retrieval orchestrator.
///
/// Every variant names the instance it concerns; callers either receive a
/// usable instance or one of these.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
	/// A different instance is already bound under this name.
	#[error("cannot register '{name}': a different instance is already bound")]
	AlreadyRegistered { name: String },

	/// A singleton's construction was reentered with no early reference
	/// available: an unresolvable circular dependency.
	#[error("singleton '{name}' is currently in creation: unresolvable circular reference")]
	CurrentlyInCreation { name: String },

	/// An independent-scope construction recursed into itself on one thread.
	/// Independent-scope cycles are never resolved via early references.
	#[error("independent-scope '{name}' is already in creation on this thread")]
	ReentrantCreation { name: String },

	/// The declared depends-on graph contains a cycle that no ordering can
	/// satisfy.
	#[error("circular depends-on relationship between '{name}' and '{dependency}'")]
	IllegalDependencyCycle { name: String, dependency: String },

	/// Singleton creation was attempted while the registry is tearing down.
	#[error("creation of singleton '{name}' not allowed while the registry is tearing down")]
	CreationDuringTeardown { name: String },

	/// The resolved instance does not satisfy the required type, even after
	/// best-effort conversion.
	#[error("instance '{name}' is not of required type '{required}'")]
	TypeMismatch { name: String, required: &'static str },

	/// A producer-dereference request (`&name`) resolved to a plain instance.
	#[error("'{name}' does not resolve to an indirect producer")]
	NotAProducer { name: String },

	/// No definition is registered under this name (locally or in a parent).
	#[error("no definition registered for '{name}'")]
	MissingDefinition { name: String },

	/// The definition names a custom scope that was never registered.
	#[error("no scope registered under '{scope}' (requested by '{name}')")]
	UnknownScope { name: String, scope: String },

	/// A custom scope refused the request (e.g. not active on this thread).
	#[error("scope '{scope}' refused '{name}': {reason}")]
	ScopeInactive {
		name: String,
		scope: String,
		reason: String,
	},

	/// Attempted to replace one of the built-in scopes.
	#[error("cannot replace built-in scope '{scope}'")]
	ReservedScope { scope: String },

	/// Registering the alias would form a canonicalization loop.
	#[error("alias '{alias}' for '{name}' would form a loop")]
	AliasLoop { name: String, alias: String },

	/// The alias is already bound to a different canonical name.
	#[error("alias '{alias}' is already bound to '{existing}'")]
	AliasShadowed { alias: String, existing: String },

	/// Construction of an instance failed. `related` carries secondary
	/// failures suppressed while resolving this name's dependencies.
	#[error("error creating '{name}': {reason}")]
	CreationFailure {
		name: String,
		reason: String,
		#[source]
		source: Option<Box<ContainerError>>,
		related: Vec<ContainerError>,
	},
}

impl ContainerError {
	/// Creation failure without an underlying cause.
	pub fn creation(name: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::CreationFailure {
			name: name.into(),
			reason: reason.into(),
			source: None,
			related: Vec::new(),
		}
	}

	/// Creation failure wrapping the error that caused it.
	pub fn creation_with(
		name: impl Into<String>,
		reason: impl Into<String>,
		source: ContainerError,
	) -> Self {
		Self::CreationFailure {
			name: name.into(),
			reason: reason.into(),
			source: Some(Box::new(source)),
			related: Vec::new(),
		}
	}

	/// Secondary failures attached to a top-level creation failure.
	/// Empty for every other variant.
	pub fn related_causes(&self) -> &[ContainerError] {
		match self {
			Self::CreationFailure { related, .. } => related,
			_ => &[],
		}
	}

	/// Attaches suppressed secondary failures, wrapping `self` in a
	/// [`ContainerError::CreationFailure`] first if necessary.
	pub(crate) fn with_related(self, name: &str, causes: Vec<ContainerError>) -> Self {
		if causes.is_empty() {
			return self;
		}
		match self {
			Self::CreationFailure {
				name,
				reason,
				source,
				mut related,
			} => {
				related.extend(causes);
				Self::CreationFailure {
					name,
					reason,
					source,
					related,
				}
			}
			other => Self::CreationFailure {
				name: name.to_owned(),
				reason: "construction failed".to_owned(),
				source: Some(Box::new(other)),
				related: causes,
			},
		}
	}
}
