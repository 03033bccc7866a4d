//! The world: the single point of truth for simulated time and state.
//!
//! A [`World`] owns the environment [`Field`], the event [`Scheduler`], the
//! node registry, the registered [`Subsystem`]s and the injected
//! [`SnapshotSink`]. Every method takes `&self`, so a world can be shared
//! behind an [`Arc`] between the run loop and collaborators. Interior state
//! sits behind short-lived locks that are never held across an await; the
//! field in particular is reached only through the closure helpers
//! [`with_field`](World::with_field) and [`with_field_mut`](World::with_field_mut).
//!
//! The tick orchestrator itself lives in [`crate::tick`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info};
use verdant_events::{Event, EventPayload, Scheduler, SchedulerConfig};
use verdant_types::{NodeId, NodeSnapshot, WorldId};
use verdant_world::{DiffusionSettings, EnvironmentSystem, Field, FieldError};

use crate::clock::WorldClock;
use crate::config::SimulationConfig;
use crate::node::Node;
use crate::persistence::{NullSnapshotSink, SnapshotSink};
use crate::subsystem::Subsystem;

/// Errors raised while building or mutating a world.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The field could not be created.
    #[error("field error: {source}")]
    Field {
        /// The underlying field error.
        #[from]
        source: FieldError,
    },

    /// A node with this id is already registered.
    #[error("node {node_id} is already registered")]
    DuplicateNode {
        /// The conflicting id.
        node_id: NodeId,
    },
}

/// Builder for [`World`].
pub struct WorldBuilder {
    id: WorldId,
    name: String,
    width: u32,
    height: u32,
    chunk_size: u32,
    scheduler: SchedulerConfig,
    diffusion: DiffusionSettings,
    environment_enabled: bool,
    sink: Arc<dyn SnapshotSink>,
}

impl WorldBuilder {
    /// Start from the defaults of [`SimulationConfig`].
    pub fn new() -> Self {
        Self::from_config(&SimulationConfig::default())
    }

    /// Start from a loaded configuration.
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            id: WorldId::new(),
            name: config.world.name.clone(),
            width: config.world.width,
            height: config.world.height,
            chunk_size: config.world.chunk_size,
            scheduler: config.scheduler.scheduler_config(),
            diffusion: config.environment.diffusion_settings(),
            environment_enabled: config.environment.enabled,
            sink: Arc::new(NullSnapshotSink),
        }
    }

    /// Use a specific world id.
    #[must_use]
    pub const fn id(mut self, id: WorldId) -> Self {
        self.id = id;
        self
    }

    /// Set the human-readable name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the field size in cells.
    #[must_use]
    pub const fn dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the chunk side length.
    #[must_use]
    pub const fn chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the scheduler configuration.
    #[must_use]
    pub const fn scheduler(mut self, config: SchedulerConfig) -> Self {
        self.scheduler = config;
        self
    }

    /// Set the diffusion settings of the environment update.
    #[must_use]
    pub fn diffusion(mut self, settings: DiffusionSettings) -> Self {
        self.diffusion = settings;
        self
    }

    /// Enable or disable the per-tick environment update.
    #[must_use]
    pub const fn environment_enabled(mut self, enabled: bool) -> Self {
        self.environment_enabled = enabled;
        self
    }

    /// Inject the snapshot sink.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Build the world.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Field`] if the field dimensions are invalid.
    pub fn build(self) -> Result<World, WorldError> {
        let field = Field::new(self.width, self.height, self.chunk_size)?;
        info!(
            world_id = %self.id,
            name = %self.name,
            width = self.width,
            height = self.height,
            chunk_size = self.chunk_size,
            "World created"
        );
        Ok(World {
            id: self.id,
            name: self.name,
            clock: Mutex::new(WorldClock::new()),
            ticking: AtomicBool::new(false),
            field: RwLock::new(field),
            scheduler: Scheduler::new(self.scheduler),
            environment: EnvironmentSystem::new(self.diffusion),
            environment_enabled: self.environment_enabled,
            nodes: RwLock::new(BTreeMap::new()),
            subsystems: RwLock::new(Vec::new()),
            id_counter: AtomicU64::new(1),
            predictions: Mutex::new(None),
            sink: self.sink,
        })
    }
}

impl Default for WorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A simulated world.
pub struct World {
    id: WorldId,
    name: String,
    pub(crate) clock: Mutex<WorldClock>,
    pub(crate) ticking: AtomicBool,
    field: RwLock<Field>,
    scheduler: Scheduler,
    pub(crate) environment: EnvironmentSystem,
    pub(crate) environment_enabled: bool,
    nodes: RwLock<BTreeMap<NodeId, Node>>,
    subsystems: RwLock<Vec<Arc<dyn Subsystem>>>,
    id_counter: AtomicU64,
    predictions: Mutex<Option<serde_json::Value>>,
    pub(crate) sink: Arc<dyn SnapshotSink>,
}

impl World {
    /// Start building a world.
    pub fn builder() -> WorldBuilder {
        WorldBuilder::new()
    }

    /// Build a world from configuration with the given sink.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Field`] if the configured dimensions are invalid.
    pub fn from_config(config: &SimulationConfig, sink: Arc<dyn SnapshotSink>) -> Result<Self, WorldError> {
        WorldBuilder::from_config(config).sink(sink).build()
    }

    /// The world id.
    pub const fn id(&self) -> WorldId {
        self.id
    }

    /// The human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tick most recently started (0 before the first tick).
    pub fn current_tick(&self) -> u64 {
        self.clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tick()
    }

    /// A copy of the world clock.
    pub fn clock(&self) -> WorldClock {
        *self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a tick is in flight.
    pub fn is_ticking(&self) -> bool {
        self.ticking.load(Ordering::Acquire)
    }

    /// The event scheduler. Clone it to keep a handle.
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The environment update routine.
    pub const fn environment(&self) -> &EnvironmentSystem {
        &self.environment
    }

    /// Read the field.
    pub fn with_field<R>(&self, f: impl FnOnce(&Field) -> R) -> R {
        let field = self.field.read().unwrap_or_else(PoisonError::into_inner);
        f(&field)
    }

    /// Mutate the field.
    pub fn with_field_mut<R>(&self, f: impl FnOnce(&mut Field) -> R) -> R {
        let mut field = self.field.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut field)
    }

    /// Allocate a world-unique id of the form
    /// `{prefix}-{world_id}-{tick}-{counter}`.
    ///
    /// The counter is per world and strictly increasing, so ids stay unique
    /// within a tick.
    pub fn next_id(&self, prefix: &str) -> String {
        let counter = self.id_counter.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}-{}-{}-{counter}", self.id, self.current_tick())
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    /// Register a node and announce it with a `NodeAdded` event.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateNode`] if the id is taken.
    pub fn insert_node(&self, node: Node) -> Result<(), WorldError> {
        let node_id = node.id().clone();
        let node_type = node.node_type().to_owned();
        {
            let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
            if nodes.contains_key(&node_id) {
                return Err(WorldError::DuplicateNode { node_id });
            }
            nodes.insert(node_id.clone(), node);
        }
        debug!(node_id = %node_id, node_type = %node_type, "Node registered");
        self.scheduler.publish(
            Event::new(EventPayload::NodeAdded { node_id, node_type }).with_source(self.id.to_string()),
        );
        Ok(())
    }

    /// Remove a node, announcing it with a `NodeRemoved` event.
    pub fn remove_node(&self, node_id: &NodeId) -> Option<Node> {
        let removed = self
            .nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(node_id);
        if removed.is_some() {
            debug!(node_id = %node_id, "Node removed");
            self.scheduler.publish(
                Event::new(EventPayload::NodeRemoved {
                    node_id: node_id.clone(),
                })
                .with_source(self.id.to_string()),
            );
        }
        removed
    }

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Inspect one node.
    pub fn with_node<R>(&self, node_id: &NodeId, f: impl FnOnce(&Node) -> R) -> Option<R> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes.get(node_id).map(f)
    }

    /// Mutate one node.
    pub fn with_node_mut<R>(&self, node_id: &NodeId, f: impl FnOnce(&mut Node) -> R) -> Option<R> {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        nodes.get_mut(node_id).map(f)
    }

    /// Serialize every node, ordered by id.
    pub(crate) fn node_snapshots(&self) -> Result<Vec<NodeSnapshot>, serde_json::Error> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Node::snapshot)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Subsystems and predictions
    // -----------------------------------------------------------------------

    /// Register a subsystem. Subsystems run in registration order.
    pub fn register_subsystem(&self, subsystem: Arc<dyn Subsystem>) {
        info!(subsystem = subsystem.name(), "Subsystem registered");
        self.subsystems
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subsystem);
    }

    /// Number of registered subsystems.
    pub fn subsystem_count(&self) -> usize {
        self.subsystems
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The registered subsystems, in order.
    pub(crate) fn subsystems(&self) -> Vec<Arc<dyn Subsystem>> {
        self.subsystems
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stage predictions to attach to the next snapshot. Replaces anything
    /// staged earlier in the same tick.
    pub fn stage_predictions(&self, predictions: serde_json::Value) {
        *self
            .predictions
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(predictions);
    }

    /// Take the staged predictions, leaving none.
    pub(crate) fn take_predictions(&self) -> Option<serde_json::Value> {
        self.predictions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl core::fmt::Debug for World {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("tick", &self.current_tick())
            .field("nodes", &self.node_count())
            .field("subsystems", &self.subsystem_count())
            .finish_non_exhaustive()
    }
}

/// A small world for tests and embedding: 64x64 cells, 16-cell chunks.
pub fn small_world(sink: Arc<dyn SnapshotSink>) -> Result<World, WorldError> {
    World::builder()
        .dimensions(64, 64)
        .chunk_size(16)
        .sink(sink)
        .build()
}
