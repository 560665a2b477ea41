//! Instance model: type-erased shared objects, indirect producers, and
//! disposal handles.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// A managed instance. Identity (`Arc::ptr_eq`) is what the registry compares;
/// two equal values under different allocations are different instances.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Wraps a value as a managed [`Instance`].
pub fn instance<T: Any + Send + Sync>(value: T) -> Instance {
	Arc::new(value)
}

/// A capability invoked exactly once at teardown to release a named
/// instance's resources. Failures are logged, never propagated.
pub type DisposalHandle = Box<dyn FnOnce() -> Result<()> + Send>;

/// An indirect producer: an object whose role is to yield another object on
/// demand rather than being used directly.
///
/// When the registry resolves a name to a `Producer` and the request was not
/// a producer-dereference request, the orchestrator invokes [`Self::produce`]
/// to obtain the real object. Singleton-like producers cache what they
/// produce unless flagged synthetic.
pub struct Producer {
	make: Box<dyn Fn() -> Result<Instance> + Send + Sync>,
	singleton: bool,
	synthetic: bool,
	cache: Mutex<Option<Instance>>,
}

impl Producer {
	/// A singleton-like, non-synthetic producer.
	pub fn new(make: impl Fn() -> Result<Instance> + Send + Sync + 'static) -> Self {
		Self {
			make: Box::new(make),
			singleton: true,
			synthetic: false,
			cache: Mutex::new(None),
		}
	}

	/// Marks the producer as yielding a fresh object per call.
	pub fn non_singleton(mut self) -> Self {
		self.singleton = false;
		self
	}

	/// Marks the produced object as synthetic, bypassing the produced-object
	/// cache.
	pub fn synthetic(mut self) -> Self {
		self.synthetic = true;
		self
	}

	pub fn is_singleton_like(&self) -> bool {
		self.singleton
	}

	pub fn is_synthetic(&self) -> bool {
		self.synthetic
	}

	/// Yields the produced object, caching it when the producer is
	/// singleton-like and not synthetic.
	pub fn produce(&self) -> Result<Instance> {
		if !self.singleton || self.synthetic {
			return (self.make)();
		}
		let mut cache = self.cache.lock();
		if let Some(cached) = cache.as_ref() {
			return Ok(cached.clone());
		}
		let produced = (self.make)()?;
		*cache = Some(produced.clone());
		Ok(produced)
	}
}

impl std::fmt::Debug for Producer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Producer")
			.field("singleton", &self.singleton)
			.field("synthetic", &self.synthetic)
			.field("cached", &self.cache.lock().is_some())
			.finish()
	}
}
