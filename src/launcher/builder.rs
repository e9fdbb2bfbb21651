//! Builder wiring the launcher and its collaborators together.

use std::sync::Arc;

use crate::bus::{topics, MessageBus, SubscribeOptions};
use crate::config::OrchestratorConfig;
use crate::health::HealthMonitor;
use crate::recovery::ErrorHandler;
use crate::registry::NodeRegistry;
use crate::subscribers::LogSubscriber;

use super::descriptor::{GlobalOverrides, NodeDescriptor};
use super::launcher::Launcher;
use super::spawn::{DefaultSpawner, LocalSpawner, NodeContext, NodeFuture, Spawner};

type FactoryEntry = (String, Box<dyn Fn(NodeContext) -> NodeFuture + Send + Sync>);

/// Builder for an assembled [`Launcher`].
///
/// Constructs the bus, registry, error handler and health monitor from one
/// [`OrchestratorConfig`] and wires them together. In-process node
/// factories are registered here; descriptors can be supplied up front or
/// later via [`Launcher::load`].
pub struct LauncherBuilder {
    config: OrchestratorConfig,
    factories: Vec<FactoryEntry>,
    descriptors: Vec<NodeDescriptor>,
    overrides: GlobalOverrides,
    spawner: Option<Arc<dyn Spawner>>,
    log_system_topics: bool,
}

impl LauncherBuilder {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            factories: Vec::new(),
            descriptors: Vec::new(),
            overrides: GlobalOverrides::default(),
            spawner: None,
            log_system_topics: false,
        }
    }

    /// Registers an in-process factory for descriptors of the given `kind`.
    pub fn with_factory<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(NodeContext) -> NodeFuture + Send + Sync + 'static,
    {
        self.factories.push((kind.into(), Box::new(factory)));
        self
    }

    /// Seeds the fleet with parsed descriptors.
    pub fn with_descriptors(mut self, descriptors: Vec<NodeDescriptor>) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    /// Applies fleet-wide overrides (disable/enable lists, env overlay) to
    /// every descriptor before dependency resolution.
    pub fn with_overrides(mut self, overrides: GlobalOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Replaces the default process/local spawner routing entirely.
    pub fn with_spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Attaches a [`LogSubscriber`] rendering system topics through
    /// `tracing`.
    pub fn with_system_logging(mut self) -> Self {
        self.log_system_topics = true;
        self
    }

    /// Builds the launcher and its collaborators.
    ///
    /// Must run inside a tokio runtime. Nothing is started yet; call
    /// [`Launcher::start`] or [`Launcher::run_until_signal`].
    pub async fn build(self) -> Launcher {
        let bus = MessageBus::new(self.config.bus.clone());
        let registry = NodeRegistry::with_bus(bus.clone());
        let recovery = ErrorHandler::with_bus(self.config.recovery.clone(), bus.clone());
        let health = HealthMonitor::with_bus(&self.config, registry.clone(), bus.clone());

        let spawner = match self.spawner {
            Some(spawner) => spawner,
            None => {
                let mut local = LocalSpawner::new(bus.clone());
                for (kind, factory) in self.factories {
                    local.register(kind, factory);
                }
                Arc::new(DefaultSpawner::new(local))
            }
        };

        if self.log_system_topics {
            let log = Arc::new(LogSubscriber::new());
            for topic in [
                topics::REGISTRY,
                topics::HEALTH,
                topics::ERRORS,
            ] {
                bus.subscribe_handler("log", topic, SubscribeOptions::default(), log.clone());
            }
        }

        let launcher = Launcher::new_internal(
            self.config,
            bus,
            registry,
            recovery,
            health,
            spawner,
            self.overrides,
        );
        launcher.load(self.descriptors).await;
        launcher
    }
}
