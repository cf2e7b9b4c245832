use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::pool::IngressPool;
use crate::service::{InboundMessageService, IngressEvent};

/// Default depth of the webhook-to-worker queue.
pub const QUEUE_CAPACITY: usize = 256;

/// Consumes queued webhook messages until every sender handle is dropped.
pub struct MessageWorker {
    receiver: mpsc::Receiver<IngressEvent>,
    pool: IngressPool,
}

impl MessageWorker {
    pub fn new(
        receiver: mpsc::Receiver<IngressEvent>,
        service: Arc<InboundMessageService>,
        max_concurrent: usize,
    ) -> Self {
        Self { receiver, pool: IngressPool::new(service, max_concurrent) }
    }

    pub async fn run(mut self) {
        info!(event_name = "ingress.whatsapp.worker_started", "whatsapp worker started");
        while let Some(event) = self.receiver.recv().await {
            self.pool.submit(event).await;
        }
        self.pool.drain().await;
        info!(event_name = "ingress.whatsapp.worker_stopped", "whatsapp worker stopped");
    }
}
