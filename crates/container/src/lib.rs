//! Lifecycle core for named, shared object instances.
//!
//! The [`SingletonRegistry`] owns a tiered instance cache (shared instances,
//! early references, early-reference producers) that lets two singletons
//! referencing each other both finish construction, tracks which names are
//! currently being built, and tears everything down in reverse dependency
//! order. The [`ContainerFactory`] sits on top and runs the per-request
//! resolution algorithm: alias canonicalization, cache fast path, parent
//! delegation, depends-on ordering, scope dispatch, and producer
//! dereferencing.
//!
//! Construction itself is external: callers plug in a
//! [`ConstructionStrategy`] (see [`ProviderStrategy`] for the closure-backed
//! one), definitions through a [`DefinitionStore`], and optionally custom
//! [`Scope`]s and a [`TypeConverter`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use armature_container::{
//!     ContainerFactory, DefinitionMap, ObjectDefinition, ProviderStrategy, instance,
//! };
//!
//! let definitions = Arc::new(DefinitionMap::new());
//! definitions.insert("greeting", ObjectDefinition::singleton());
//!
//! let providers = Arc::new(ProviderStrategy::new());
//! providers.provide("greeting", |_| Ok(instance(String::from("hello"))));
//!
//! let factory = ContainerFactory::new(definitions, providers);
//! let greeting = factory.get_as::<String>("greeting").unwrap();
//! assert_eq!(*greeting, "hello");
//! ```

mod alias;
mod convert;
mod definition;
mod error;
mod factory;
mod graph;
mod object;
mod registry;
mod scope;
mod strategy;
mod tracker;

pub use alias::AliasRegistry;
pub use convert::{NoConversion, TypeConverter};
pub use definition::{DefinitionMap, DefinitionStore, ObjectDefinition, ObjectScope};
pub use error::{ContainerError, Result};
pub use factory::{
	ContainerFactory, PRODUCER_PREFIX, SCOPE_INDEPENDENT, SCOPE_SINGLETON,
};
pub use graph::DependencyGraph;
pub use object::{DisposalHandle, Instance, Producer, instance};
pub use registry::{EarlyProducer, SingletonRegistry};
pub use scope::Scope;
pub use strategy::{ConstructionStrategy, ProviderStrategy};
