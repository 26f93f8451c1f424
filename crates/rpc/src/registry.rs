//! Method registry.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::binding::MethodBinding;
use crate::error::{Error, Result};

/// Ordered set of method bindings, keyed by method name.
///
/// Immutable once the server starts; iteration follows binding order so
/// records are seeded deterministically.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
	methods: IndexMap<Arc<str>, Arc<MethodBinding>>,
}

impl ServiceRegistry {
	/// Empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a binding.
	///
	/// # Errors
	///
	/// Returns [`Error::DuplicateMethod`] if the name is already bound.
	pub fn bind(&mut self, binding: MethodBinding) -> Result<()> {
		if self.methods.contains_key(binding.name()) {
			return Err(Error::DuplicateMethod(binding.name().to_owned()));
		}
		let name = Arc::clone(binding.name_arc());
		self.methods.insert(name, Arc::new(binding));
		Ok(())
	}

	/// Binding for `method`, if bound.
	pub fn get(&self, method: &str) -> Option<&Arc<MethodBinding>> {
		self.methods.get(method)
	}

	/// Number of bound methods.
	pub fn len(&self) -> usize {
		self.methods.len()
	}

	/// Whether nothing is bound.
	pub fn is_empty(&self) -> bool {
		self.methods.is_empty()
	}

	/// Method names in binding order.
	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.methods.keys().map(|name| &**name)
	}

	/// Bindings in binding order.
	pub fn iter(&self) -> impl Iterator<Item = &Arc<MethodBinding>> {
		self.methods.values()
	}
}

#[cfg(test)]
mod tests {
	use bytes::Bytes;

	use super::*;
	use crate::binding::Handler;
	use crate::status::Outcome;

	fn binding(name: &str) -> MethodBinding {
		MethodBinding::new(name, |_, _, _| {}, Handler::Inline(Arc::new(|req: &Bytes| Outcome::Ok(req.clone()))))
	}

	#[test]
	fn keeps_binding_order() {
		let mut registry = ServiceRegistry::new();
		registry.bind(binding("SayHello")).unwrap();
		registry.bind(binding("HealthCheck")).unwrap();
		registry.bind(binding("GetMetaData")).unwrap();
		assert_eq!(registry.names().collect::<Vec<_>>(), ["SayHello", "HealthCheck", "GetMetaData"]);
		assert!(registry.get("HealthCheck").is_some());
		assert!(registry.get("Missing").is_none());
	}

	#[test]
	fn rejects_duplicate_names() {
		let mut registry = ServiceRegistry::new();
		registry.bind(binding("Echo")).unwrap();
		assert_eq!(registry.bind(binding("Echo")), Err(Error::DuplicateMethod("Echo".into())));
		assert_eq!(registry.len(), 1);
	}
}
