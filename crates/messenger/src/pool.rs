use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::service::{InboundMessageService, IngressEvent};

/// Runs one task per inbound message, at most `max_concurrent` at a time.
pub struct IngressPool {
    service: Arc<InboundMessageService>,
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl IngressPool {
    pub fn new(service: Arc<InboundMessageService>, max_concurrent: usize) -> Self {
        Self {
            service,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tasks: JoinSet::new(),
        }
    }

    /// Waits for a free slot, then spawns the message task.
    pub async fn submit(&mut self, event: IngressEvent) {
        self.reap();
        let Ok(permit) = self.permits.clone().acquire_owned().await else {
            warn!(event_name = "ingress.pool_closed", "ingress pool closed; dropping message");
            return;
        };
        let service = self.service.clone();
        self.tasks.spawn(async move {
            service.handle(event).await;
            drop(permit);
        });
    }

    /// Waits for every in-flight message task.
    pub async fn drain(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            log_join_error(result);
        }
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            log_join_error(result);
        }
    }
}

fn log_join_error(result: Result<(), tokio::task::JoinError>) {
    if let Err(error) = result {
        warn!(event_name = "ingress.task_panicked", error = %error, "message task aborted");
    }
}
