use std::sync::Arc;

use tokio::sync::broadcast;

use crate::collaborators::{BroadcastNotifier, EventEnvelope, NoChat, RecordedPayments};
use crate::observability::metrics::Metrics;
use crate::service::DispatchService;

pub struct AppState {
    pub service: DispatchService,
    /// Concrete gateway handle so the payment webhook can record statuses;
    /// the service only sees the read-only trait.
    pub payments: Arc<RecordedPayments>,
    pub events_tx: broadcast::Sender<EventEnvelope>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        let notifier = Arc::new(BroadcastNotifier::new(events_tx.clone()));
        let payments = Arc::new(RecordedPayments::default());
        let metrics = Metrics::new();
        let service = DispatchService::new(
            notifier,
            payments.clone(),
            Arc::new(NoChat),
            metrics.clone(),
        );

        Self {
            service,
            payments,
            events_tx,
            metrics,
        }
    }
}
