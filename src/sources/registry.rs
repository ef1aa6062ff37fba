//! Named lookup of source implementations

use super::{HuggingFaceSource, ModelSource};
use crate::error::{DevonError, Result};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Builds a fresh source instance; takes no arguments
pub type SourceFactory = Arc<dyn Fn() -> Arc<dyn ModelSource> + Send + Sync>;

/// How long an availability probe may take before the source counts as unavailable
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Registry of source factories keyed by name
///
/// Constructed once during process initialization and passed to whatever needs
/// lookups. Registration is rare; lookups happen per request.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    factories: Arc<DashMap<String, SourceFactory>>,
}

impl SourceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every source compiled into this binary
    pub fn with_builtin_sources() -> Self {
        let registry = Self::new();
        registry.register(
            "huggingface",
            Arc::new(|| Arc::new(HuggingFaceSource::new()) as Arc<dyn ModelSource>),
        );
        registry
    }

    /// Insert a factory, replacing any factory already registered under `name`
    pub fn register(&self, name: impl Into<String>, factory: SourceFactory) {
        let name = name.into();
        if self.factories.insert(name.clone(), factory).is_some() {
            tracing::debug!(source = %name, "Replaced registered source");
        } else {
            tracing::debug!(source = %name, "Registered source");
        }
    }

    /// Drop every source not named in `enabled`
    pub fn retain(&self, enabled: &[String]) {
        self.factories.retain(|name, _| {
            let keep = enabled.iter().any(|e| e == name);
            if !keep {
                tracing::debug!(source = %name, "Source disabled by configuration");
            }
            keep
        });
    }

    pub fn factory(&self, name: &str) -> Result<SourceFactory> {
        self.factories
            .get(name)
            .map(|f| f.value().clone())
            .ok_or_else(|| DevonError::SourceNotFound {
                name: name.to_string(),
                available: self.list_all(),
            })
    }

    /// Instantiate the named source
    pub fn get(&self, name: &str) -> Result<Arc<dyn ModelSource>> {
        let factory = self.factory(name)?;
        Ok(factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// All registered names, sorted
    pub fn list_all(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Names of the sources whose availability probe succeeds, sorted
    ///
    /// Probes run concurrently. A probe that exceeds the timeout or panics counts
    /// as unavailable.
    pub async fn list_available(&self) -> Vec<String> {
        let sources: Vec<(String, SourceFactory)> = self
            .factories
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let probes = sources.into_iter().map(|(name, factory)| async move {
            let probe = tokio::spawn(async move {
                let source = factory();
                tokio::time::timeout(PROBE_TIMEOUT, source.is_available()).await
            });
            let available = matches!(probe.await, Ok(Ok(true)));
            if !available {
                tracing::debug!(source = %name, "Source unavailable");
            }
            (name, available)
        });

        let mut available: Vec<String> = futures::future::join_all(probes)
            .await
            .into_iter()
            .filter_map(|(name, ok)| ok.then_some(name))
            .collect();
        available.sort();
        available
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.list_all())
            .finish()
    }
}
