//! Bulk read used to cold-start a client cache.
//!
//! Every list is ordered by id so two reads of the same state serialize to
//! the same bytes.

use crate::{
    entity::{Customer, Item, Supplier},
    error::Result,
    EntityId, Error,
};
use serde::{Deserialize, Serialize};

/// Current contents of every cacheable table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitialData {
    pub inventory: Vec<Item>,
    pub customers: Vec<Customer>,
    pub suppliers: Vec<Supplier>,
    pub wholesale: Vec<Item>,
}

impl InitialData {
    /// Sort every list by id. Stores that read tables in arbitrary order
    /// call this before returning.
    pub fn normalize(mut self) -> Self {
        self.inventory.sort_by_key(|item| item.id);
        self.customers.sort_by_key(|customer| customer.id);
        self.suppliers.sort_by_key(|supplier| supplier.id);
        self.wholesale.sort_by_key(|item| item.id);
        self
    }

    pub fn item(&self, id: EntityId) -> Option<&Item> {
        self.inventory.iter().find(|item| item.id == id)
    }

    pub fn wholesale_item(&self, id: EntityId) -> Option<&Item> {
        self.wholesale.iter().find(|item| item.id == id)
    }

    pub fn customer(&self, id: EntityId) -> Option<&Customer> {
        self.customers.iter().find(|customer| customer.id == id)
    }

    /// Items at or below their low-stock threshold.
    pub fn low_stock(&self) -> impl Iterator<Item = &Item> {
        self.inventory.iter().filter(|item| item.is_low_on_stock())
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidPayload(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidPayload(e.to_string()))
    }
}
