use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::request::DeliveryRequest;

/// Persistence boundary for delivery requests.
///
/// `update` is the store's conditional-write primitive: the closure runs on a
/// draft under the row's entry lock and the row is only replaced when the
/// closure returns `Ok`, so concurrent writers to the same request serialize
/// and a rejected update leaves the row untouched.
#[derive(Default)]
pub struct RequestStore {
    rows: DashMap<Uuid, DeliveryRequest>,
}

impl RequestStore {
    pub fn insert(&self, request: DeliveryRequest) {
        self.rows.insert(request.id, request);
    }

    pub fn get(&self, id: Uuid) -> Result<DeliveryRequest, DispatchError> {
        self.rows
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DispatchError::NotFound(format!("request {id}")))
    }

    pub fn update<F>(&self, id: Uuid, mutate: F) -> Result<DeliveryRequest, DispatchError>
    where
        F: FnOnce(&mut DeliveryRequest) -> Result<(), DispatchError>,
    {
        let mut entry = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| DispatchError::NotFound(format!("request {id}")))?;

        let mut draft = entry.value().clone();
        mutate(&mut draft)?;
        draft.updated_at = Utc::now();
        *entry.value_mut() = draft.clone();
        Ok(draft)
    }

    /// Requests past their deadline that no courier has committed to yet.
    pub fn expiry_candidates(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        self.rows
            .iter()
            .filter(|entry| {
                let request = entry.value();
                request.status.accepts_offers()
                    && request.expires_at.is_some_and(|deadline| deadline < now)
            })
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
