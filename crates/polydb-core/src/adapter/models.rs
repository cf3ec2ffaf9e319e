//! Model registries and relational model definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::backend::{RelationalConnection, RelationalModel, TableDefinition};
use crate::error::BackendError;

/// Realised model handles keyed by model name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRegistry<H> {
    models: BTreeMap<String, H>,
}

impl<H> ModelRegistry<H> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            models: BTreeMap::new(),
        }
    }

    /// Insert or replace a handle.
    pub fn insert(&mut self, name: impl Into<String>, handle: H) {
        self.models.insert(name.into(), handle);
    }

    /// Handle registered under `name`.
    pub fn get(&self, name: &str) -> Option<&H> {
        self.models.get(name)
    }

    /// Handle registered under `name`, or [`BackendError::UnknownModel`].
    pub fn require(&self, name: &str) -> Result<&H, BackendError> {
        self.models
            .get(name)
            .ok_or_else(|| BackendError::UnknownModel(name.to_string()))
    }

    /// Model names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Iterate over `(name, handle)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &H)> {
        self.models.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether no model is registered.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl<H> Default for ModelRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a relational model on a live connection.
pub type ModelFactory =
    Arc<dyn Fn(&str, &dyn RelationalConnection) -> Result<RelationalModel, BackendError> + Send + Sync>;

/// Declares associations once every model of the adapter exists.
pub type AssociateHook = Arc<
    dyn Fn(&mut RelationalModel, &ModelRegistry<RelationalModel>) -> Result<(), BackendError>
        + Send
        + Sync,
>;

/// How a relational model is realised, plus its optional `associate` hook.
#[derive(Clone)]
pub struct ModelDefinition {
    factory: ModelFactory,
    associate: Option<AssociateHook>,
}

impl ModelDefinition {
    /// Realise the model with a custom factory. The factory receives the
    /// model name and the connection.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&str, &dyn RelationalConnection) -> Result<RelationalModel, BackendError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            factory: Arc::new(factory),
            associate: None,
        }
    }

    /// Realise the model by defining `definition` on the connection.
    pub fn table(definition: TableDefinition) -> Self {
        Self::new(move |name, conn| conn.define(name, definition.clone()))
    }

    /// Run `hook` after all models of the adapter are realised.
    pub fn with_associate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RelationalModel, &ModelRegistry<RelationalModel>) -> Result<(), BackendError>
            + Send
            + Sync
            + 'static,
    {
        self.associate = Some(Arc::new(hook));
        self
    }

    /// Realise the model on `conn`.
    pub fn realise(
        &self,
        name: &str,
        conn: &dyn RelationalConnection,
    ) -> Result<RelationalModel, BackendError> {
        (self.factory)(name, conn)
    }

    /// The `associate` hook, if any.
    pub fn associate(&self) -> Option<&AssociateHook> {
        self.associate.as_ref()
    }
}

impl fmt::Debug for ModelDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDefinition")
            .field("associate", &self.associate.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_require() {
        let mut registry = ModelRegistry::new();
        registry.insert("User", 1);
        assert_eq!(registry.require("User").unwrap(), &1);
        assert!(matches!(
            registry.require("Post"),
            Err(BackendError::UnknownModel(name)) if name == "Post"
        ));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["User"]);
    }

    #[test]
    fn test_associate_hook_sees_registry() {
        let definition = ModelDefinition::table(TableDefinition::new("posts")).with_associate(
            |post, models| {
                let user = models.require("User")?;
                post.belongs_to(user, "author_id");
                Ok(())
            },
        );

        let mut registry = ModelRegistry::new();
        registry.insert("User", RelationalModel::new("User", TableDefinition::new("users")));

        let mut post = RelationalModel::new("Post", TableDefinition::new("posts"));
        let hook = definition.associate().unwrap();
        hook(&mut post, &registry).unwrap();
        assert_eq!(post.associations()[0].target, "User");

        let empty = ModelRegistry::new();
        let mut orphan = RelationalModel::new("Post", TableDefinition::new("posts"));
        assert!(hook(&mut orphan, &empty).is_err());
    }
}
