//! Builder for assembling a configured engine.

use std::sync::Arc;

use tracing::debug;

use fincalc_core::{Result, SourceAdapter};
use fincalc_engine::{
    CalculationRegistry, ConceptResolver, Engine, ReconcilerConfig, SanityValidator,
};
use fincalc_store::{FactStore, StoreConfig};

/// Builds an [`Engine`] from source adapters and component configuration.
///
/// Adapter registration order is fallback order: the first adapter that
/// yields facts for a concept wins, and later ones only serve as backups
/// (or as independent voices during cross-source reconciliation).
///
/// # Example
///
/// ```rust,ignore
/// use fincalc::EngineBuilder;
///
/// let engine = EngineBuilder::new()
///     .with_edgar("MyApp/1.0 (contact@example.com)")?
///     .build();
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    store_config: StoreConfig,
    resolver: Option<ConceptResolver>,
    registry: Option<CalculationRegistry>,
    validator: SanityValidator,
    reconciler: ReconcilerConfig,
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field(
                "adapters",
                &self.adapters.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .field("store_config", &self.store_config)
            .finish_non_exhaustive()
    }
}

impl EngineBuilder {
    /// Creates an empty builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the SEC EDGAR adapter.
    ///
    /// The SEC requires an identifying user agent of the form
    /// `"AppName/Version (contact@email.com)"`.
    #[cfg(feature = "edgar")]
    pub fn with_edgar(mut self, user_agent: &str) -> Result<Self> {
        let adapter = fincalc_edgar::EdgarAdapter::new(user_agent)?;
        self.adapters.push(Arc::new(adapter));
        Ok(self)
    }

    /// Registers any source adapter.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        debug!(adapter = adapter.name(), "Adding source adapter");
        self.adapters.push(adapter);
        self
    }

    /// Overrides the store configuration (TTL, timeouts, retries, rate).
    #[must_use]
    pub fn store_config(mut self, config: StoreConfig) -> Self {
        self.store_config = config;
        self
    }

    /// Overrides the concept resolver.
    #[must_use]
    pub fn resolver(mut self, resolver: ConceptResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Overrides the metric registry.
    #[must_use]
    pub fn registry(mut self, registry: CalculationRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Overrides the sanity validator.
    #[must_use]
    pub fn validator(mut self, validator: SanityValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Overrides the reconciliation configuration.
    #[must_use]
    pub fn reconciler(mut self, config: ReconcilerConfig) -> Self {
        self.reconciler = config;
        self
    }

    /// Assembles the engine.
    #[must_use]
    pub fn build(self) -> Engine {
        let store = Arc::new(FactStore::new(self.store_config, self.adapters));
        Engine::with_parts(
            store,
            self.resolver.unwrap_or_else(ConceptResolver::with_defaults),
            self.registry.unwrap_or_else(CalculationRegistry::with_builtins),
            self.validator,
            self.reconciler,
        )
    }
}
