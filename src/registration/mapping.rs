use std::collections::{HashMap, HashSet};

use crate::graph::{GraphModel, ModelNode};
use crate::perception::types::Detection;

/// Per-title correspondence table between model nodes and detections.
///
/// Titles are not identifiers, so both sides map one title to a sequence;
/// resolving which node is which detection is deferred to the strategies.
/// Rebuilt from scratch on every registration attempt.
#[derive(Debug, Clone, Default)]
pub struct MappingData {
    /// Titles present on both sides, in graph order.
    pub shared_titles: Vec<String>,
    pub model_by_title: HashMap<String, Vec<ModelNode>>,
    pub detections_by_title: HashMap<String, Vec<Detection>>,
    /// Titles with exactly one model node, safe for 1:1 reasoning.
    pub unique_model_titles: HashSet<String>,
    /// Titles with exactly one detection.
    pub unique_detection_titles: HashSet<String>,
}

impl MappingData {
    pub fn model_nodes(&self, title: &str) -> &[ModelNode] {
        self.model_by_title.get(title).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn detections(&self, title: &str) -> &[Detection] {
        self.detections_by_title
            .get(title)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True when the title has exactly one node and exactly one detection.
    pub fn is_unique_title(&self, title: &str) -> bool {
        self.unique_model_titles.contains(title) && self.unique_detection_titles.contains(title)
    }
}

/// Groups both sides by exact title equality. Titles missing on either side
/// are dropped from `shared_titles`. Pure; no fuzzy matching happens here.
pub fn build_mapping_data(graph: &GraphModel, detections: &[Detection]) -> MappingData {
    let mut model_by_title: HashMap<String, Vec<ModelNode>> = HashMap::new();
    let mut model_title_order: Vec<String> = Vec::new();
    for node in graph.nodes() {
        let entry = model_by_title.entry(node.title.clone()).or_default();
        if entry.is_empty() {
            model_title_order.push(node.title.clone());
        }
        entry.push(node.clone());
    }

    let mut detections_by_title: HashMap<String, Vec<Detection>> = HashMap::new();
    for detection in detections {
        detections_by_title
            .entry(detection.title.clone())
            .or_default()
            .push(detection.clone());
    }

    let shared_titles: Vec<String> = model_title_order
        .into_iter()
        .filter(|title| detections_by_title.contains_key(title))
        .collect();

    let unique_model_titles: HashSet<String> = model_by_title
        .iter()
        .filter(|(_, nodes)| nodes.len() == 1)
        .map(|(title, _)| title.clone())
        .collect();
    let unique_detection_titles: HashSet<String> = detections_by_title
        .iter()
        .filter(|(_, dets)| dets.len() == 1)
        .map(|(title, _)| title.clone())
        .collect();

    MappingData {
        shared_titles,
        model_by_title,
        detections_by_title,
        unique_model_titles,
        unique_detection_titles,
    }
}
