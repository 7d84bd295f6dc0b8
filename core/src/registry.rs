//! Registry of published directory clients

use crate::directory::DirectoryClient;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared map of upstream name to the client currently published for it
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn DirectoryClient>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every published client with `providers`
    pub fn replace_all(&self, providers: Vec<Arc<dyn DirectoryClient>>) {
        let next: HashMap<String, Arc<dyn DirectoryClient>> = providers
            .into_iter()
            .map(|provider| (provider.name().to_string(), provider))
            .collect();
        *self.providers.write() = next;
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DirectoryClient>> {
        self.providers.read().get(name).cloned()
    }

    /// Published upstream names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }
}
