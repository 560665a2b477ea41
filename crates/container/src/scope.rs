//! Custom scope boundary: pluggable storage and lifecycle for any scope other
//! than singleton and independent (e.g. request- or session-bound lifetimes).

use crate::error::Result;
use crate::object::Instance;

/// External scope collaborator. The orchestrator calls [`Scope::get`] with a
/// creation callback already wrapped in the per-thread creation-state
/// bracket; the scope decides whether to return a stored instance or invoke
/// the callback.
///
/// A scope that is not active for the calling context should fail with
/// [`crate::ContainerError::ScopeInactive`].
pub trait Scope: Send + Sync {
	/// Returns the instance stored under `name`, creating it via `create` if
	/// absent.
	fn get(&self, name: &str, create: &mut dyn FnMut() -> Result<Instance>) -> Result<Instance>;

	/// Removes and returns the instance stored under `name`, if any.
	fn remove(&self, name: &str) -> Option<Instance>;

	/// Registers a callback the scope invokes when it destroys `name` (or
	/// ends entirely). Scope callbacks fire on scope end, not at registry
	/// teardown.
	fn register_destruction_callback(&self, name: &str, callback: Box<dyn FnOnce() + Send>);
}
