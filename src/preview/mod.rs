//! Hover-driven preview orchestration.
//!
//! A [`PreviewSessionManager`] is mounted per card. All cards mounted from the
//! same [`PreviewContext`] share its [`SessionBudget`], which is the only
//! state shared between cards.

mod manager;
mod state;

pub use manager::PreviewSessionManager;
pub use state::{PresentationSignal, PreviewSnapshot, SessionState};

use std::sync::Arc;

use crate::budget::SessionBudget;
use crate::config::{Config, PreviewConfig};
use crate::resolver::{resolver_from_config, StreamResolver};
use crate::streaming::{engine_from_config, StreamingEngine};

/// Collaborators handed to every card.
#[derive(Clone)]
pub struct PreviewContext {
    pub budget: Arc<SessionBudget>,
    pub resolver: Arc<dyn StreamResolver>,
    pub engine: Arc<dyn StreamingEngine>,
    pub config: Arc<PreviewConfig>,
}

impl PreviewContext {
    pub fn new(
        config: PreviewConfig,
        resolver: Arc<dyn StreamResolver>,
        engine: Arc<dyn StreamingEngine>,
    ) -> Self {
        Self {
            budget: SessionBudget::new(config.max_concurrent),
            resolver,
            engine,
            config: Arc::new(config),
        }
    }

    /// Build resolver, engine and budget from a loaded configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let resolver = resolver_from_config(config)?;
        let engine = engine_from_config(&config.engine);

        tracing::debug!(
            resolver = resolver.name(),
            engine = engine.name(),
            max_concurrent = config.preview.max_concurrent,
            "Preview context ready"
        );

        Ok(Self::new(config.preview.clone(), resolver, engine))
    }

    /// Share an existing budget instead of the one built from config.
    pub fn with_budget(mut self, budget: Arc<SessionBudget>) -> Self {
        self.budget = budget;
        self
    }
}

impl std::fmt::Debug for PreviewContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewContext")
            .field("budget", &self.budget)
            .field("resolver", &self.resolver.name())
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .finish()
    }
}
