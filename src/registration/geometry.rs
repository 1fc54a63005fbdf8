use std::collections::HashMap;

use crate::graph::ModelNode;
use crate::registration::mapping::MappingData;

/// Detections reduced to their anchor points (bbox top-left), grouped by
/// title.
pub fn detection_anchors_by_title(mapping: &MappingData) -> HashMap<String, Vec<(f32, f32)>> {
    let mut anchors: HashMap<String, Vec<(f32, f32)>> = HashMap::new();
    for title in &mapping.shared_titles {
        let entries: Vec<(f32, f32)> = mapping
            .detections(title)
            .iter()
            .map(|detection| detection.bbox.top_left())
            .collect();
        if !entries.is_empty() {
            anchors.insert(title.clone(), entries);
        }
    }
    anchors
}

/// All model nodes under shared titles, flattened with their title attached.
pub fn flatten_model_nodes(mapping: &MappingData) -> Vec<(String, ModelNode)> {
    let mut nodes = Vec::new();
    for title in &mapping.shared_titles {
        for node in mapping.model_nodes(title) {
            nodes.push((title.clone(), node.clone()));
        }
    }
    nodes
}

/// Centroid of all shared-title model nodes in program space. Central nodes
/// make statistically better anchors, so candidates are ranked against this.
pub fn model_centroid(mapping: &MappingData) -> (f32, f32) {
    let mut sum_x = 0.0f32;
    let mut sum_y = 0.0f32;
    let mut count = 0usize;
    for title in &mapping.shared_titles {
        for node in mapping.model_nodes(title) {
            sum_x += node.pos.0;
            sum_y += node.pos.1;
            count += 1;
        }
    }
    if count == 0 {
        return (0.0, 0.0);
    }
    (sum_x / count as f32, sum_y / count as f32)
}
