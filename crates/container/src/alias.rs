//! Alias bookkeeping: every lookup name canonicalizes to exactly one
//! registered name before touching any cache.

use parking_lot::RwLock;
use rustc_hash::FxHashMap as HashMap;

use crate::error::{ContainerError, Result};

/// Alias → canonical-name map with chain following.
#[derive(Default)]
pub struct AliasRegistry {
	aliases: RwLock<HashMap<String, String>>,
}

impl AliasRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `alias` for `name`.
	///
	/// An alias equal to the name itself removes any existing mapping.
	/// Fails if the alias is already bound to a different name, or if the
	/// mapping would form a canonicalization loop.
	pub fn register_alias(&self, name: &str, alias: &str) -> Result<()> {
		let mut aliases = self.aliases.write();
		if alias == name {
			aliases.remove(alias);
			return Ok(());
		}
		if let Some(existing) = aliases.get(alias) {
			if existing == name {
				return Ok(());
			}
			return Err(ContainerError::AliasShadowed {
				alias: alias.to_owned(),
				existing: existing.clone(),
			});
		}
		if Self::chain_reaches(&aliases, name, alias) {
			return Err(ContainerError::AliasLoop {
				name: name.to_owned(),
				alias: alias.to_owned(),
			});
		}
		aliases.insert(alias.to_owned(), name.to_owned());
		Ok(())
	}

	/// Removes an alias. Returns whether it existed.
	pub fn remove_alias(&self, alias: &str) -> bool {
		self.aliases.write().remove(alias).is_some()
	}

	pub fn is_alias(&self, name: &str) -> bool {
		self.aliases.read().contains_key(name)
	}

	/// Follows the alias chain from `name` to its canonical name.
	pub fn canonical_name(&self, name: &str) -> String {
		let aliases = self.aliases.read();
		let mut canonical = name;
		while let Some(next) = aliases.get(canonical) {
			canonical = next;
		}
		canonical.to_owned()
	}

	/// All aliases that canonicalize (directly or transitively) to `name`.
	pub fn aliases_of(&self, name: &str) -> Vec<String> {
		let aliases = self.aliases.read();
		aliases
			.keys()
			.filter(|alias| {
				let mut canonical = alias.as_str();
				while let Some(next) = aliases.get(canonical) {
					canonical = next;
				}
				canonical == name
			})
			.cloned()
			.collect()
	}

	/// True if following the chain from `from` reaches `target`.
	fn chain_reaches(aliases: &HashMap<String, String>, from: &str, target: &str) -> bool {
		let mut current = from;
		while let Some(next) = aliases.get(current) {
			if next == target {
				return true;
			}
			current = next;
		}
		false
	}
}
