use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rustc_hash::FxHashMap as HashMap;

use super::ContainerFactory;
use crate::convert::TypeConverter;
use crate::definition::{DefinitionMap, ObjectDefinition};
use crate::error::{ContainerError, Result};
use crate::object::{Instance, Producer, instance};
use crate::scope::Scope;
use crate::strategy::ProviderStrategy;

fn factory_with(
	setup: impl FnOnce(&DefinitionMap, &ProviderStrategy),
) -> ContainerFactory {
	let definitions = Arc::new(DefinitionMap::new());
	let strategy = Arc::new(ProviderStrategy::new());
	setup(&definitions, &strategy);
	ContainerFactory::new(definitions, strategy)
}

/// Singleton definitions resolve to one shared instance; the provider runs
/// exactly once.
#[test]
fn test_singleton_resolution_is_cached() {
	let calls = Arc::new(AtomicUsize::new(0));
	let factory = factory_with(|defs, providers| {
		defs.insert("service", ObjectDefinition::singleton());
		let calls = calls.clone();
		providers.provide("service", move |_| {
			calls.fetch_add(1, Ordering::SeqCst);
			Ok(instance(String::from("ready")))
		});
	});

	let first = factory.get("service").expect("first resolution");
	let second = factory.get("service").expect("second resolution");

	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert!(factory.contains("service"));
	assert!(factory.was_created("service"));
}

/// Independent-scope definitions yield a fresh instance per request.
#[test]
fn test_independent_scope_never_caches() {
	let factory = factory_with(|defs, providers| {
		defs.insert("worker", ObjectDefinition::independent());
		providers.provide("worker", |_| Ok(instance(0_u64)));
	});

	let first = factory.get("worker").expect("first resolution");
	let second = factory.get("worker").expect("second resolution");

	assert!(!Arc::ptr_eq(&first, &second));
	assert!(!factory.registry().contains("worker"));
}

/// An independent-scope provider that requests itself is an unresolvable
/// cycle on the requesting thread.
#[test]
fn test_independent_scope_self_cycle_fails() {
	let factory = factory_with(|defs, providers| {
		defs.insert("selfish", ObjectDefinition::independent());
		providers.provide("selfish", |f| f.get("selfish"));
	});

	let err = factory.get("selfish").expect_err("self-cycle must fail");
	assert!(matches!(err, ContainerError::ReentrantCreation { .. }));
}

/// Unknown names fail with a missing-definition error.
#[test]
fn test_missing_definition() {
	let factory = factory_with(|_, _| {});
	let err = factory.get("ghost").expect_err("unknown name");
	assert!(matches!(err, ContainerError::MissingDefinition { .. }));
	assert!(!factory.contains("ghost"));
}

/// Names with no local definition delegate to the parent factory.
#[test]
fn test_parent_delegation() {
	let parent = Arc::new(factory_with(|defs, providers| {
		defs.insert("shared", ObjectDefinition::singleton());
		providers.provide("shared", |_| Ok(instance(11_u32)));
	}));
	let child = factory_with(|_, _| {}).with_parent(parent.clone());

	let from_child = child.get("shared").expect("delegated resolution");
	let from_parent = parent.get("shared").expect("parent resolution");

	assert!(Arc::ptr_eq(&from_child, &from_parent));
	assert!(child.contains("shared"));
	assert!(
		!child.registry().contains("shared"),
		"instance lives in the parent registry"
	);
}

/// Aliases canonicalize before every other step, so an alias and its
/// canonical name resolve to the same singleton.
#[test]
fn test_alias_resolution() {
	let factory = factory_with(|defs, providers| {
		defs.insert("primary", ObjectDefinition::singleton());
		providers.provide("primary", |_| Ok(instance(1_u8)));
	});
	factory.register_alias("primary", "nickname").expect("alias");

	let by_alias = factory.get("nickname").expect("alias resolution");
	let by_name = factory.get("primary").expect("canonical resolution");
	assert!(Arc::ptr_eq(&by_alias, &by_name));
}

/// A name resolving to an indirect producer yields the produced object, while
/// the prefixed form addresses the producer itself.
#[test]
fn test_producer_dereference() {
	let factory = factory_with(|defs, providers| {
		defs.insert("conn", ObjectDefinition::singleton());
		providers.provide("conn", |_| {
			Ok(instance(Producer::new(|| Ok(instance(99_i64)))))
		});
		defs.insert("plain", ObjectDefinition::singleton());
		providers.provide("plain", |_| Ok(instance(0_i64)));
	});

	let produced = factory.get("conn").expect("dereferenced producer");
	assert_eq!(*produced.downcast_ref::<i64>().expect("typed"), 99);

	// Singleton-like producer output is cached.
	let again = factory.get("conn").expect("second dereference");
	assert!(Arc::ptr_eq(&produced, &again));

	let producer = factory.get("&conn").expect("producer itself");
	assert!(producer.downcast_ref::<Producer>().is_some());

	let err = factory.get("&plain").expect_err("plain instance");
	assert!(matches!(err, ContainerError::NotAProducer { .. }));
}

/// Typed retrieval downcasts, consults the converter as a fallback, and
/// reports a mismatch naming the required type.
#[test]
fn test_typed_retrieval_and_conversion() {
	struct StringToLen;
	impl TypeConverter for StringToLen {
		fn convert(
			&self,
			_name: &str,
			found: &Instance,
			required: std::any::TypeId,
		) -> Option<Instance> {
			if required == std::any::TypeId::of::<usize>() {
				let s = found.downcast_ref::<String>()?;
				return Some(instance(s.len()));
			}
			None
		}
	}

	let factory = factory_with(|defs, providers| {
		defs.insert("text", ObjectDefinition::singleton());
		providers.provide("text", |_| Ok(instance(String::from("hello"))));
	})
	.with_converter(Arc::new(StringToLen));

	let text = factory.get_as::<String>("text").expect("direct downcast");
	assert_eq!(*text, "hello");

	let len = factory.get_as::<usize>("text").expect("converted");
	assert_eq!(*len, 5);

	let err = factory.get_as::<u8>("text").expect_err("no conversion");
	assert!(matches!(err, ContainerError::TypeMismatch { .. }));
}

/// Declared prerequisites are constructed before the dependent name, and the
/// dependency edges drive teardown ordering.
#[test]
fn test_depends_on_resolution_order() {
	let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
	let factory = factory_with(|defs, providers| {
		defs.insert("db", ObjectDefinition::singleton());
		defs.insert("app", ObjectDefinition::singleton().depends_on(["db"]));
		let seen = order.clone();
		providers.provide("db", move |_| {
			seen.lock().push("db");
			Ok(instance(0_u8))
		});
		let seen = order.clone();
		providers.provide("app", move |_| {
			seen.lock().push("app");
			Ok(instance(1_u8))
		});
	});

	factory.get("app").expect("resolution succeeds");
	assert_eq!(*order.lock(), vec!["db", "app"]);
	assert!(factory.registry().graph().is_transitively_dependent("db", "app"));
}

/// A depends-on cycle is detected before any construction starts.
#[test]
fn test_depends_on_cycle_detected() {
	let factory = factory_with(|defs, providers| {
		defs.insert("a", ObjectDefinition::singleton().depends_on(["b"]));
		defs.insert("b", ObjectDefinition::singleton().depends_on(["a"]));
		providers.provide("a", |_| Ok(instance(0_u8)));
		providers.provide("b", |_| Ok(instance(0_u8)));
	});

	let err = factory.get("a").expect_err("declared cycle");
	let mut found_cycle = matches!(err, ContainerError::IllegalDependencyCycle { .. });
	// The cycle may surface wrapped in the dependent's creation failure.
	if let ContainerError::CreationFailure { source, .. } = &err {
		if let Some(inner) = source {
			found_cycle |= matches!(**inner, ContainerError::IllegalDependencyCycle { .. });
		}
	}
	assert!(found_cycle, "expected a dependency-cycle failure, got: {err}");
}

/// A failing prerequisite surfaces as a creation failure naming the
/// dependent and carrying the prerequisite's error as its cause.
#[test]
fn test_failed_prerequisite_wrapped() {
	let factory = factory_with(|defs, providers| {
		defs.insert("app", ObjectDefinition::singleton().depends_on(["db"]));
		providers.provide("app", |_| Ok(instance(0_u8)));
	});

	let err = factory.get("app").expect_err("prerequisite missing");
	match err {
		ContainerError::CreationFailure { name, source, .. } => {
			assert_eq!(name, "app");
			assert!(source.is_some(), "cause must be attached");
		}
		other => panic!("expected CreationFailure, got: {other}"),
	}
}

/// After a failed singleton construction the name is rolled back and a later
/// attempt can succeed.
#[test]
fn test_failed_construction_rolls_back_and_retries() {
	let attempts = Arc::new(AtomicUsize::new(0));
	let factory = factory_with(|defs, providers| {
		defs.insert("flaky", ObjectDefinition::singleton());
		let attempts = attempts.clone();
		providers.provide("flaky", move |_| {
			if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
				return Err(ContainerError::creation("flaky", "first attempt fails"));
			}
			Ok(instance(1_u8))
		});
	});

	factory.get("flaky").expect_err("first attempt");
	assert!(!factory.registry().contains("flaky"));
	assert!(!factory.was_created("flaky"), "creation mark rolled back");

	factory.get("flaky").expect("second attempt succeeds");
	assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

/// Custom scopes own storage; built-in scope names cannot be replaced and
/// unregistered scopes are an error.
#[test]
fn test_custom_scope_dispatch() {
	#[derive(Default)]
	struct MapScope {
		stored: Mutex<HashMap<String, Instance>>,
		callbacks: Mutex<HashMap<String, Box<dyn FnOnce() + Send>>>,
	}
	impl Scope for MapScope {
		fn get(
			&self,
			name: &str,
			create: &mut dyn FnMut() -> Result<Instance>,
		) -> Result<Instance> {
			if let Some(found) = self.stored.lock().get(name) {
				return Ok(found.clone());
			}
			let created = create()?;
			self.stored
				.lock()
				.insert(name.to_owned(), created.clone());
			Ok(created)
		}

		fn remove(&self, name: &str) -> Option<Instance> {
			if let Some(callback) = self.callbacks.lock().remove(name) {
				callback();
			}
			self.stored.lock().remove(name)
		}

		fn register_destruction_callback(
			&self,
			name: &str,
			callback: Box<dyn FnOnce() + Send>,
		) {
			self.callbacks.lock().insert(name.to_owned(), callback);
		}
	}

	let calls = Arc::new(AtomicUsize::new(0));
	let factory = factory_with(|defs, providers| {
		defs.insert("session_data", ObjectDefinition::custom("session"));
		let calls = calls.clone();
		providers.provide("session_data", move |_| {
			calls.fetch_add(1, Ordering::SeqCst);
			Ok(instance(0_u16))
		});
	});

	// Unregistered scope name.
	let err = factory.get("session_data").expect_err("scope missing");
	assert!(matches!(err, ContainerError::UnknownScope { .. }));

	let scope = Arc::new(MapScope::default());
	factory.register_scope("session", scope.clone()).expect("register scope");
	assert!(factory.registered_scope("session").is_some());

	let first = factory.get("session_data").expect("scoped resolution");
	let second = factory.get("session_data").expect("scoped hit");
	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(calls.load(Ordering::SeqCst), 1);

	// The scope owns removal and its own destruction callbacks.
	let destroyed = Arc::new(AtomicUsize::new(0));
	let counter = destroyed.clone();
	scope.register_destruction_callback(
		"session_data",
		Box::new(move || {
			counter.fetch_add(1, Ordering::SeqCst);
		}),
	);
	scope.remove("session_data").expect("stored instance");
	assert_eq!(destroyed.load(Ordering::SeqCst), 1);
	let third = factory.get("session_data").expect("re-created");
	assert!(!Arc::ptr_eq(&first, &third));

	// Built-in names are reserved.
	let err = factory
		.register_scope("singleton", Arc::new(MapScope::default()))
		.expect_err("reserved");
	assert!(matches!(err, ContainerError::ReservedScope { .. }));
}

/// Pre-registered instances take precedence over definitions and are served
/// from the cache without touching the provider.
#[test]
fn test_registered_instance_wins() {
	let factory = factory_with(|defs, providers| {
		defs.insert("config", ObjectDefinition::singleton());
		providers.provide("config", |_| {
			panic!("provider must not run for a pre-registered instance")
		});
	});

	let existing = instance(String::from("external"));
	factory
		.register_instance("config", existing.clone())
		.expect("register");

	let found = factory.get("config").expect("cached resolution");
	assert!(Arc::ptr_eq(&found, &existing));
}
