//! Time-driven expiry of unclaimed requests. A best-effort background sweep:
//! redundant or concurrent invocations are safe because the status guard is
//! re-checked under the row's entry lock, and a request that raced into
//! acceptance is silently skipped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::offer::OfferStatus;
use crate::models::request::RequestStatus;
use crate::state::AppState;
use crate::store::offers::OfferStore;
use crate::store::requests::RequestStore;

#[derive(Debug, Clone, Copy)]
pub struct ExpiredRequest {
    pub request_id: Uuid,
    pub customer_id: Uuid,
}

/// One pass over the store. Returns the requests expired by this pass only.
pub fn sweep_once(
    requests: &RequestStore,
    offers: &OfferStore,
    now: DateTime<Utc>,
) -> Vec<ExpiredRequest> {
    let mut expired = Vec::new();

    for request_id in requests.expiry_candidates(now) {
        let result = requests.update(request_id, |req| {
            let due = req.expires_at.is_some_and(|deadline| deadline < now);
            if req.status.accepts_offers() && due {
                req.status = RequestStatus::Expired;
                Ok(())
            } else {
                // Raced with an acceptance or an earlier sweep.
                Err(DispatchError::RequestNotAcceptingOffers)
            }
        });

        match result {
            Ok(request) => {
                offers.close_open_offers(request_id, OfferStatus::Expired, None);
                expired.push(ExpiredRequest {
                    request_id,
                    customer_id: request.customer_id,
                });
            }
            Err(err) if err.is_retryable() => {
                warn!(request_id = %request_id, error = %err, "expiry attempt failed, retrying next sweep");
            }
            Err(err) => {
                debug!(request_id = %request_id, error = %err, "skipping expiry candidate");
            }
        }
    }

    expired
}

pub async fn run_expiry_sweep(state: Arc<AppState>, period: Duration) {
    info!(period_secs = period.as_secs(), "expiry sweep started");

    let mut ticker = interval(period);
    loop {
        ticker.tick().await;
        let count = state.service.expire_stale(Utc::now());
        if count > 0 {
            info!(count, "expired stale requests");
        }
    }
}
