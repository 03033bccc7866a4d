//! Nodes registered with a world and the components they carry.
//!
//! A [`Node`] is a named entity (an organism, a settlement, a maze cell) that
//! collaborators attach typed state to. Each [`Component`] knows how to
//! serialize itself, along with a stable kind name and schema version, so a
//! snapshot can capture arbitrary component types without a generic deep
//! copy. Components holding maps or sets serialize them explicitly.

use verdant_types::{ComponentSnapshot, NodeId, NodeSnapshot};

/// Typed state attached to a [`Node`].
pub trait Component: Send + Sync {
    /// Stable type name written into snapshots.
    fn kind(&self) -> &str;

    /// Schema version of the serialized form.
    fn version(&self) -> u32 {
        1
    }

    /// Serialize the component's current state.
    ///
    /// # Errors
    ///
    /// Returns the serializer's error if the state cannot be represented
    /// as JSON.
    fn to_value(&self) -> Result<serde_json::Value, serde_json::Error>;
}

/// An entity registered with a world.
pub struct Node {
    id: NodeId,
    node_type: String,
    components: Vec<Box<dyn Component>>,
}

impl Node {
    /// Create a node with no components.
    pub fn new(id: NodeId, node_type: impl Into<String>) -> Self {
        Self {
            id,
            node_type: node_type.into(),
            components: Vec::new(),
        }
    }

    /// Attach a component.
    #[must_use]
    pub fn with_component(mut self, component: impl Component + 'static) -> Self {
        self.components.push(Box::new(component));
        self
    }

    /// Attach a component to an existing node.
    pub fn add_component(&mut self, component: Box<dyn Component>) {
        self.components.push(component);
    }

    /// The node id.
    pub const fn id(&self) -> &NodeId {
        &self.id
    }

    /// The declared node type.
    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    /// Number of attached components.
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Find a component by kind.
    pub fn component(&self, kind: &str) -> Option<&dyn Component> {
        self.components
            .iter()
            .find(|c| c.kind() == kind)
            .map(AsRef::as_ref)
    }

    /// Serialize this node and its components.
    ///
    /// # Errors
    ///
    /// Returns the first component serialization error.
    pub fn snapshot(&self) -> Result<NodeSnapshot, serde_json::Error> {
        let components = self
            .components
            .iter()
            .map(|component| {
                Ok(ComponentSnapshot {
                    kind: component.kind().to_owned(),
                    version: component.version(),
                    data: component.to_value()?,
                })
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;
        Ok(NodeSnapshot {
            id: self.id.clone(),
            node_type: self.node_type.clone(),
            components,
        })
    }
}

impl core::fmt::Debug for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let kinds: Vec<&str> = self.components.iter().map(|c| c.kind()).collect();
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("node_type", &self.node_type)
            .field("components", &kinds)
            .finish()
    }
}
