use std::sync::Arc;

use crate::app::Components;
use crate::ledger::TaskStore;
use crate::messaging::LiveFeed;
use crate::observability::Metrics;
use crate::pipeline::{CreateLog, InitiateRetention};

#[derive(Clone)]
pub struct AppState {
    pub create_log: Arc<CreateLog>,
    pub retention: Arc<InitiateRetention>,
    pub tasks: TaskStore,
    pub feed: LiveFeed,
    pub metrics: Arc<Metrics>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(components: &Components, max_body_bytes: usize) -> Self {
        Self {
            create_log: Arc::new(components.create_log()),
            retention: Arc::new(components.retention()),
            tasks: components.task_store(),
            feed: components.feed.clone(),
            metrics: Arc::clone(&components.metrics),
            max_body_bytes,
        }
    }
}
