//! MemoryStore - the in-memory authoritative store.
//!
//! Holds every table plus the idempotency keys already applied. Used as the
//! development backend of the server and as the reference the database store
//! is tested against.
//!
//! Each action checks everything it needs before writing anything, so a
//! rejected action leaves no trace. A per-batch transaction clones every
//! table, sales history and applied keys included, and swaps the clone in
//! only when every action applied. The clone costs time and memory in
//! proportion to everything ever stored, not to the batch.

use crate::{
    action::{
        parse_batch, Action, ActionEnvelope, CustomerAction, InventoryAction, ParsedAction,
        SalesAction, SupplierAction, WholesaleAction,
    },
    coordinator::{ActionResult, Atomicity, BatchReport},
    entity::{
        Customer, CustomerPatch, Item, ItemPatch, NewCustomer, NewItem, NewSale,
        NewSupplier, PaymentMethod, Sale, SaleLine, StockPool, Supplier, SupplierPatch,
    },
    error::Result,
    resolver::{check_wallet, StockDemand},
    snapshot::InitialData,
    Cents, Domain, EntityId, EntityKind, Error, IdempotencyKey, Timestamp,
};
use std::collections::BTreeMap;

/// Last id handed out per table. Ids are never reused, even after a delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct IdSequences {
    item: EntityId,
    wholesale_item: EntityId,
    customer: EntityId,
    supplier: EntityId,
    sale: EntityId,
    sale_line: EntityId,
}

impl IdSequences {
    fn next(&mut self, entity: EntityKind) -> EntityId {
        let last = match entity {
            EntityKind::Item => &mut self.item,
            EntityKind::WholesaleItem => &mut self.wholesale_item,
            EntityKind::Customer => &mut self.customer,
            EntityKind::Supplier => &mut self.supplier,
            EntityKind::Sale => &mut self.sale,
        };
        *last += 1;
        *last
    }

    fn next_line(&mut self) -> EntityId {
        self.sale_line += 1;
        self.sale_line
    }
}

/// An idempotency key already applied, and what it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AppliedKey {
    domain: Domain,
    action_type: &'static str,
    entity_id: EntityId,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    items: BTreeMap<EntityId, Item>,
    wholesale_items: BTreeMap<EntityId, Item>,
    customers: BTreeMap<EntityId, Customer>,
    suppliers: BTreeMap<EntityId, Supplier>,
    sales: BTreeMap<EntityId, Sale>,
    sale_lines: BTreeMap<EntityId, SaleLine>,
    applied: BTreeMap<IdempotencyKey, AppliedKey>,
    ids: IdSequences,
}

impl Tables {
    fn pool(&self, pool: StockPool) -> &BTreeMap<EntityId, Item> {
        match pool {
            StockPool::Retail => &self.items,
            StockPool::Wholesale => &self.wholesale_items,
        }
    }

    fn pool_mut(&mut self, pool: StockPool) -> &mut BTreeMap<EntityId, Item> {
        match pool {
            StockPool::Retail => &mut self.items,
            StockPool::Wholesale => &mut self.wholesale_items,
        }
    }

    fn apply(&mut self, parsed: &ParsedAction, now: Timestamp) -> Result<ActionResult> {
        if let Some(key) = &parsed.idempotency_key {
            if let Some(applied) = self.applied.get(key) {
                parsed.check_replay(applied.domain.as_str(), applied.action_type)?;
                return Ok(ActionResult::duplicate(applied.entity_id));
            }
        }

        let entity_id = match &parsed.action {
            Action::Inventory(action) => match action {
                InventoryAction::AddItem(new) => self.add_item(StockPool::Retail, new),
                InventoryAction::UpdateItem { id, patch } => {
                    self.update_item(StockPool::Retail, *id, patch)?
                }
                InventoryAction::DeleteItem { id } => self.delete_item(StockPool::Retail, *id)?,
            },
            Action::Sales(SalesAction::AddSale(sale)) => {
                self.add_sale(StockPool::Retail, sale, now)?
            }
            Action::Customers(action) => match action {
                CustomerAction::AddCustomer(new) => self.add_customer(new),
                CustomerAction::UpdateCustomer { id, patch } => self.update_customer(*id, patch)?,
                CustomerAction::TopUpWallet { id, amount } => self.top_up_wallet(*id, *amount)?,
            },
            Action::Suppliers(action) => match action {
                SupplierAction::AddSupplier(new) => self.add_supplier(new),
                SupplierAction::UpdateSupplier { id, patch } => self.update_supplier(*id, patch)?,
            },
            Action::Wholesale(action) => match action {
                WholesaleAction::AddItem(new) => self.add_item(StockPool::Wholesale, new),
                WholesaleAction::UpdateItem { id, patch } => {
                    self.update_item(StockPool::Wholesale, *id, patch)?
                }
                WholesaleAction::DeleteItem { id } => {
                    self.delete_item(StockPool::Wholesale, *id)?
                }
                WholesaleAction::AddSale(sale) => {
                    self.add_sale(StockPool::Wholesale, sale, now)?
                }
            },
        };

        if let Some(key) = &parsed.idempotency_key {
            self.applied.insert(
                key.clone(),
                AppliedKey {
                    domain: parsed.action.domain(),
                    action_type: parsed.action.action_type(),
                    entity_id,
                },
            );
        }

        Ok(ActionResult::applied(entity_id))
    }

    fn add_item(&mut self, pool: StockPool, new: &NewItem) -> EntityId {
        let id = self.ids.next(pool.entity());
        self.pool_mut(pool)
            .insert(id, Item::from_new(id, new.clone()));
        id
    }

    fn update_item(&mut self, pool: StockPool, id: EntityId, patch: &ItemPatch) -> Result<EntityId> {
        let item = self.pool_mut(pool).get_mut(&id).ok_or(Error::NotFound {
            entity: pool.entity(),
            id,
        })?;
        item.apply_patch(patch);
        Ok(id)
    }

    fn delete_item(&mut self, pool: StockPool, id: EntityId) -> Result<EntityId> {
        self.pool_mut(pool)
            .remove(&id)
            .map(|_| id)
            .ok_or(Error::NotFound {
                entity: pool.entity(),
                id,
            })
    }

    fn add_sale(&mut self, pool: StockPool, new: &NewSale, now: Timestamp) -> Result<EntityId> {
        // Checks, in lock order: customer, then stock, then wallet.
        if let Some(customer_id) = new.customer_id {
            if !self.customers.contains_key(&customer_id) {
                return Err(Error::NotFound {
                    entity: EntityKind::Customer,
                    id: customer_id,
                });
            }
        }

        let demand = StockDemand::from_lines(&new.lines);
        let items = self.pool(pool);
        let remaining = demand.check(pool, |id| items.get(&id).map(|item| item.stock))?;

        let (lines, total) = new.price(|id| items.get(&id).map(|item| item.price));

        let wallet = match (new.payment_method, new.customer_id) {
            (PaymentMethod::Wallet, Some(customer_id)) => {
                let balance = self
                    .customers
                    .get(&customer_id)
                    .map(|c| c.wallet_balance)
                    .unwrap_or(0);
                Some((customer_id, check_wallet(customer_id, balance, total)?))
            }
            _ => None,
        };

        // Every check passed; write.
        let table = self.pool_mut(pool);
        for (item_id, stock) in remaining {
            if let Some(item) = table.get_mut(&item_id) {
                item.stock = stock;
            }
        }
        if let Some((customer_id, balance)) = wallet {
            if let Some(customer) = self.customers.get_mut(&customer_id) {
                customer.wallet_balance = balance;
            }
        }

        let sale_id = self.ids.next(EntityKind::Sale);
        self.sales.insert(
            sale_id,
            Sale {
                id: sale_id,
                pool,
                customer_id: new.customer_id,
                payment_method: new.payment_method,
                total_amount: total,
                created_at: now,
            },
        );
        for line in lines {
            let id = self.ids.next_line();
            self.sale_lines.insert(
                id,
                SaleLine {
                    id,
                    sale_id,
                    item_id: line.item_id,
                    quantity: line.quantity,
                    price: line.price,
                    discount_amount: line.discount_amount,
                },
            );
        }

        Ok(sale_id)
    }

    fn add_customer(&mut self, new: &NewCustomer) -> EntityId {
        let id = self.ids.next(EntityKind::Customer);
        self.customers
            .insert(id, Customer::from_new(id, new.clone()));
        id
    }

    fn customer_mut(&mut self, id: EntityId) -> Result<&mut Customer> {
        self.customers.get_mut(&id).ok_or(Error::NotFound {
            entity: EntityKind::Customer,
            id,
        })
    }

    fn update_customer(&mut self, id: EntityId, patch: &CustomerPatch) -> Result<EntityId> {
        self.customer_mut(id)?.apply_patch(patch);
        Ok(id)
    }

    fn top_up_wallet(&mut self, id: EntityId, amount: Cents) -> Result<EntityId> {
        let customer = self.customer_mut(id)?;
        customer.wallet_balance = customer.wallet_balance.checked_add(amount).ok_or_else(|| {
            Error::invalid_value("amount", "wallet balance would overflow")
        })?;
        Ok(id)
    }

    fn add_supplier(&mut self, new: &NewSupplier) -> EntityId {
        let id = self.ids.next(EntityKind::Supplier);
        self.suppliers
            .insert(id, Supplier::from_new(id, new.clone()));
        id
    }

    fn update_supplier(&mut self, id: EntityId, patch: &SupplierPatch) -> Result<EntityId> {
        let supplier = self.suppliers.get_mut(&id).ok_or(Error::NotFound {
            entity: EntityKind::Supplier,
            id,
        })?;
        supplier.apply_patch(patch);
        Ok(id)
    }
}

/// The in-memory authoritative store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Tables,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one action in its own transaction.
    pub fn apply(&mut self, action: &ParsedAction, now: Timestamp) -> Result<ActionResult> {
        self.tables.apply(action, now)
    }

    /// Apply a parsed batch.
    ///
    /// Entries that failed to parse are reported at their position; under
    /// [`Atomicity::PerBatch`] they abort the batch like any other failure.
    /// A per-batch call clones all tables first, so its cost grows with the
    /// store's history rather than the batch size.
    pub fn apply_batch(
        &mut self,
        actions: &[Result<ParsedAction>],
        atomicity: Atomicity,
        now: Timestamp,
    ) -> BatchReport {
        match atomicity {
            Atomicity::PerBatch => {
                let mut scratch = self.tables.clone();
                let mut results = Vec::with_capacity(actions.len());
                for (index, action) in actions.iter().enumerate() {
                    let outcome = match action {
                        Ok(action) => scratch.apply(action, now),
                        Err(e) => Err(e.clone()),
                    };
                    match outcome {
                        Ok(result) => results.push(result),
                        Err(e) => return BatchReport::aborted(actions.len(), index, &e),
                    }
                }
                self.tables = scratch;
                BatchReport::new(results)
            }
            Atomicity::PerAction => BatchReport::new(
                actions
                    .iter()
                    .map(|action| {
                        action
                            .as_ref()
                            .map_err(Clone::clone)
                            .and_then(|action| self.tables.apply(action, now))
                            .unwrap_or_else(|e| ActionResult::rejected(&e))
                    })
                    .collect(),
            ),
        }
    }

    /// Parse and apply a batch of envelopes submitted for `domain`.
    ///
    /// Fails without touching the store only when the batch as a whole is
    /// malformed (client sequence out of order).
    pub fn sync(
        &mut self,
        domain: Domain,
        envelopes: &[ActionEnvelope],
        atomicity: Atomicity,
        now: Timestamp,
    ) -> Result<BatchReport> {
        let parsed = parse_batch(domain, envelopes)?;
        Ok(self.apply_batch(&parsed, atomicity, now))
    }

    /// Bulk read for cold-starting a client cache.
    pub fn initial_data(&self) -> InitialData {
        InitialData {
            inventory: self.tables.items.values().cloned().collect(),
            customers: self.tables.customers.values().cloned().collect(),
            suppliers: self.tables.suppliers.values().cloned().collect(),
            wholesale: self.tables.wholesale_items.values().cloned().collect(),
        }
    }

    pub fn item(&self, id: EntityId) -> Option<&Item> {
        self.tables.items.get(&id)
    }

    pub fn wholesale_item(&self, id: EntityId) -> Option<&Item> {
        self.tables.wholesale_items.get(&id)
    }

    pub fn customer(&self, id: EntityId) -> Option<&Customer> {
        self.tables.customers.get(&id)
    }

    pub fn supplier(&self, id: EntityId) -> Option<&Supplier> {
        self.tables.suppliers.get(&id)
    }

    pub fn sale(&self, id: EntityId) -> Option<&Sale> {
        self.tables.sales.get(&id)
    }

    /// Lines of one sale, in insertion order.
    pub fn sale_lines(&self, sale_id: EntityId) -> Vec<&SaleLine> {
        self.tables
            .sale_lines
            .values()
            .filter(|line| line.sale_id == sale_id)
            .collect()
    }

    pub fn item_count(&self) -> usize {
        self.tables.items.len()
    }

    pub fn wholesale_item_count(&self) -> usize {
        self.tables.wholesale_items.len()
    }

    pub fn sale_count(&self) -> usize {
        self.tables.sales.len()
    }

    /// Whether an idempotency key has been applied.
    pub fn is_applied(&self, key: &str) -> bool {
        self.tables.applied.contains_key(key)
    }

    /// Domain and entity recorded for an applied idempotency key.
    pub fn applied_key(&self, key: &str) -> Option<(Domain, EntityId)> {
        self.tables
            .applied
            .get(key)
            .map(|applied| (applied.domain, applied.entity_id))
    }
}
