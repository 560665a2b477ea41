//! Type conversion boundary for typed retrieval.
//!
//! Assignability in this core is downcast success; a converter is the
//! best-effort fallback consulted before a type mismatch is raised.

use std::any::TypeId;

use crate::object::Instance;

/// Best-effort conversion of a resolved instance to a required type.
pub trait TypeConverter: Send + Sync {
	/// Returns a replacement instance of the required type, or `None` if no
	/// conversion applies.
	fn convert(&self, name: &str, instance: &Instance, required: TypeId) -> Option<Instance>;
}

/// The default converter: never converts.
#[derive(Default)]
pub struct NoConversion;

impl TypeConverter for NoConversion {
	fn convert(&self, _name: &str, _instance: &Instance, _required: TypeId) -> Option<Instance> {
		None
	}
}
