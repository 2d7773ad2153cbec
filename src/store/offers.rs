use dashmap::DashMap;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::offer::{DeliveryOffer, OfferStatus};

/// Persistence boundary for offers submitted against requests.
#[derive(Default)]
pub struct OfferStore {
    rows: DashMap<Uuid, DeliveryOffer>,
}

impl OfferStore {
    pub fn insert(&self, offer: DeliveryOffer) {
        self.rows.insert(offer.id, offer);
    }

    pub fn get(&self, id: Uuid) -> Result<DeliveryOffer, DispatchError> {
        self.rows
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DispatchError::NotFound(format!("offer {id}")))
    }

    pub fn update<F>(&self, id: Uuid, mutate: F) -> Result<DeliveryOffer, DispatchError>
    where
        F: FnOnce(&mut DeliveryOffer) -> Result<(), DispatchError>,
    {
        let mut entry = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| DispatchError::NotFound(format!("offer {id}")))?;

        let mut draft = entry.value().clone();
        mutate(&mut draft)?;
        *entry.value_mut() = draft.clone();
        Ok(draft)
    }

    pub fn by_request(&self, request_id: Uuid) -> Vec<DeliveryOffer> {
        let mut offers: Vec<DeliveryOffer> = self
            .rows
            .iter()
            .filter(|entry| entry.value().request_id == request_id)
            .map(|entry| entry.value().clone())
            .collect();
        offers.sort_by_key(|offer| offer.created_at);
        offers
    }

    pub fn open_by_request(&self, request_id: Uuid) -> Vec<DeliveryOffer> {
        self.by_request(request_id)
            .into_iter()
            .filter(|offer| offer.status == OfferStatus::Open)
            .collect()
    }

    /// Terminate every still-open offer on a request. Offers that raced into
    /// another terminal status are skipped, not failed.
    pub fn close_open_offers(&self, request_id: Uuid, into: OfferStatus, except: Option<Uuid>) {
        for offer in self.open_by_request(request_id) {
            if Some(offer.id) == except {
                continue;
            }
            let _ = self.update(offer.id, |o| {
                if o.status == OfferStatus::Open {
                    o.status = into;
                }
                Ok(())
            });
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}
