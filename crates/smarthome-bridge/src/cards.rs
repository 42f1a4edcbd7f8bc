//! Card authorisation lookups.

use std::sync::Arc;

use smarthome_types::AuthorisedCard;

use crate::storage::Storage;

/// Answers whether a presented card may open the door.
#[derive(Clone)]
pub struct CardLookupService {
    storage: Arc<dyn Storage>,
}

impl CardLookupService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// The registered card with this raw id, if any.
    pub async fn find_by_card_id(
        &self,
        card_id: &str,
    ) -> smarthome_store::Result<Option<AuthorisedCard>> {
        self.storage.find_card_by_card_id(card_id).await
    }

    /// A card is valid iff it is registered and active.
    pub async fn is_valid(&self, card_id: &str) -> smarthome_store::Result<bool> {
        Ok(self
            .find_by_card_id(card_id)
            .await?
            .is_some_and(|card| card.grants_access()))
    }
}
