use std::sync::Arc;

use cellmetrics_state::{StoreClient, TaskState};
use tracing::warn;

use super::{emit_counts, Instrument};
use crate::sink::MetricSink;

pub const TASKS_PENDING: &str = "TasksPending";
pub const TASKS_RUNNING: &str = "TasksRunning";
pub const TASKS_COMPLETED: &str = "TasksCompleted";
pub const TASKS_RESOLVING: &str = "TasksResolving";

const BUCKETS: [(TaskState, &str); 4] = [
    (TaskState::Pending, TASKS_PENDING),
    (TaskState::Running, TASKS_RUNNING),
    (TaskState::Completed, TASKS_COMPLETED),
    (TaskState::Resolving, TASKS_RESOLVING),
];

/// Counts tasks per lifecycle state.
pub struct TaskInstrument {
    client: Arc<dyn StoreClient>,
}

impl TaskInstrument {
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self { client }
    }
}

impl Instrument for TaskInstrument {
    fn name(&self) -> &'static str {
        "tasks"
    }

    fn sample(&self, sink: &dyn MetricSink) {
        let tasks = match self.client.tasks() {
            Ok(tasks) => Some(tasks),
            Err(e) => {
                warn!(instrument = self.name(), error = %e, "failed to fetch tasks");
                None
            }
        };
        emit_counts(sink, &BUCKETS, tasks.as_deref(), |t| t.state);
    }
}
