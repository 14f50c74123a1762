use super::{descriptor_of, Model, ModelDescriptor};
use crate::error::{ModelError, ModelResult};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Descriptors looked up by model name.
///
/// Used where the payload type is only known at runtime, such as updates
/// arriving as JSON.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: DashMap<String, Arc<ModelDescriptor>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `M` under its model name, replacing any previous entry
    pub fn register<M: Model>(&self) -> ModelResult<Arc<ModelDescriptor>> {
        let descriptor = descriptor_of::<M>()?;
        debug!(model = M::model_name(), "Registered model");
        self.models
            .insert(M::model_name().to_string(), Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Look up a descriptor by name
    pub fn get(&self, name: &str) -> ModelResult<Arc<ModelDescriptor>> {
        self.models
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ModelError::UnknownModel(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Constructor, FieldDef};

    struct Tag;
    impl Model for Tag {
        fn model_name() -> &'static str {
            "Tag"
        }
        fn constructor() -> Constructor {
            Constructor::Record
        }
        fn fields() -> Vec<FieldDef> {
            vec![FieldDef::leaf("id"), FieldDef::leaf("label")]
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ModelRegistry::new();
        registry.register::<Tag>().unwrap();

        assert!(registry.contains("Tag"));
        assert_eq!(registry.get("Tag").unwrap().fields.len(), 2);
        assert_eq!(registry.names(), vec!["Tag".to_string()]);
    }

    #[test]
    fn test_unknown_model() {
        let registry = ModelRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(
            registry.get("Missing").unwrap_err(),
            ModelError::UnknownModel("Missing".to_string())
        );
    }
}
