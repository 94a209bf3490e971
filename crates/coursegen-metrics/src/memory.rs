use std::sync::Mutex;

use async_trait::async_trait;
use coursegen_types::NodeMetric;

use crate::{MetricsError, MetricsScope, MetricsSink};

#[derive(Default)]
pub struct InMemoryMetricsSink {
    recorded: Mutex<Vec<(MetricsScopeKey, NodeMetric)>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricsScopeKey {
    Lesson(uuid::Uuid),
    Course(uuid::Uuid),
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded_count(&self) -> usize {
        self.recorded.lock().unwrap().len()
    }

    pub fn total_tokens(&self) -> u64 {
        self.recorded
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| (m.input_tokens + m.output_tokens) as u64)
            .sum()
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetricsSink {
    async fn record(&self, scope: MetricsScope, metric: NodeMetric) -> Result<(), MetricsError> {
        let key = match scope {
            MetricsScope::Lesson { lesson_id, .. } => MetricsScopeKey::Lesson(lesson_id),
            MetricsScope::Course { course_id } => MetricsScopeKey::Course(course_id),
        };
        self.recorded.lock().unwrap().push((key, metric));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn records_accumulate_tokens() {
        let sink = InMemoryMetricsSink::new();
        let scope = MetricsScope::Lesson {
            course_id: Uuid::new_v4(),
            lesson_id: Uuid::new_v4(),
        };
        sink.record(
            scope,
            NodeMetric {
                node_name: "generate".into(),
                model: "m".into(),
                input_tokens: 10,
                output_tokens: 20,
                cost_usd: 0.01,
                duration_ms: 50,
                ok: true,
                error_class: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(sink.recorded_count(), 1);
        assert_eq!(sink.total_tokens(), 30);
    }
}
