use serde::{Deserialize, Serialize};

/// A single LLM call or Stage 6 node's accounting record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetric {
    pub node_name: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub ok: bool,
    pub error_class: Option<String>,
}

/// Monotonic per-job counters, accumulated across the life of a job
/// (a lesson, or a course-level stage).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub model_used: Option<String>,
    pub regeneration_attempts: u32,
    pub quality_score: Option<f32>,
    pub nodes: Vec<NodeMetric>,
}

impl NodeMetrics {
    pub fn record(&mut self, node: NodeMetric) {
        self.tokens_used += (node.input_tokens + node.output_tokens) as u64;
        self.cost_usd += node.cost_usd;
        self.duration_ms += node.duration_ms;
        self.model_used = Some(node.model.clone());
        self.nodes.push(node);
    }
}
