use std::collections::BTreeMap;
use std::sync::Arc;

/// Named back-ends for one provider capability (vision, generation, storage).
///
/// Entries are shared handles so a selected back-end can be moved into
/// request threads while the registry stays put.
pub struct ProviderRegistry<P: ?Sized> {
    providers: BTreeMap<String, Arc<P>>,
}

impl<P: ?Sized> Default for ProviderRegistry<P> {
    fn default() -> Self {
        Self {
            providers: BTreeMap::new(),
        }
    }
}

impl<P: ?Sized> ProviderRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, provider: Arc<P>) {
        self.providers
            .insert(name.trim().to_ascii_lowercase(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<P>> {
        self.providers
            .get(&name.trim().to_ascii_lowercase())
            .cloned()
    }

    /// Like `get`, but the error names every registered provider.
    pub fn select(&self, name: &str) -> Result<Arc<P>, String> {
        self.get(name).ok_or_else(|| {
            format!(
                "Unknown provider '{}' (available: {}).",
                name.trim(),
                self.names().join(", ")
            )
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}
