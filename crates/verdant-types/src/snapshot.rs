//! Snapshot payloads handed to the persistence collaborator.
//!
//! A [`WorldSnapshot`] is built once per tick, after the second scheduler
//! drain. Component state is captured through each component's own
//! versioned serializer, so the `data` of a [`ComponentSnapshot`] is only
//! meaningful together with its `kind` and `version`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{NodeId, WorldId};

/// End-of-tick serialization of a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct WorldSnapshot {
    /// The world this snapshot belongs to.
    pub world_id: WorldId,
    /// The tick that just completed.
    pub tick: u64,
    /// Wall-clock time the snapshot was built.
    pub timestamp: DateTime<Utc>,
    /// Every registered node, ordered by id.
    pub nodes: Vec<NodeSnapshot>,
    /// Predictions staged by subsystems during this tick, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictions: Option<serde_json::Value>,
}

/// Serialized state of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NodeSnapshot {
    /// Node identifier.
    pub id: NodeId,
    /// Free-form node type (e.g. `"organism"`, `"settlement"`).
    #[serde(rename = "type")]
    pub node_type: String,
    /// Serialized components in registration order.
    pub components: Vec<ComponentSnapshot>,
}

/// Serialized state of one component, tagged with its schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ComponentSnapshot {
    /// Stable component type name.
    pub kind: String,
    /// Schema version of `data`.
    pub version: u32,
    /// Component state as written by the component's serializer.
    pub data: serde_json::Value,
}

impl WorldSnapshot {
    /// Find a node by id.
    pub fn node(&self, id: &NodeId) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|node| &node.id == id)
    }
}

impl NodeSnapshot {
    /// Find a component by kind.
    pub fn component(&self, kind: &str) -> Option<&ComponentSnapshot> {
        self.components.iter().find(|component| component.kind == kind)
    }
}
