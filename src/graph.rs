use serde::{Deserialize, Serialize};

/// One node of the logical graph, as stored in the editor's model.
///
/// Positions are program coordinates: zoom- and pan-independent, anchored at
/// the node's top-left corner. Read-only to this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelNode {
    pub id: String,
    /// Display title. Not an identifier; many nodes may share one.
    pub title: String,
    pub pos: (f32, f32),
}

impl ModelNode {
    pub fn new(id: impl Into<String>, title: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            pos: (x, y),
        }
    }
}

/// Read-only view of the logical graph handed to a registration attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphModel {
    nodes: Vec<ModelNode>,
}

impl GraphModel {
    pub fn new(nodes: Vec<ModelNode>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[ModelNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
