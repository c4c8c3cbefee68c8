//! Conflict and consistency checks applied inside a transaction.
//!
//! Offline registers compute sales against a stale view of stock. Nothing the
//! client believed is trusted here: every decrement is checked against the
//! value re-read inside the transaction that will write it.
//!
//! Field updates follow last-write-wins: an `update_*` action overwrites the
//! fields it names with no merge, so the action applied last decides.

use crate::{
    entity::{NewSaleLine, StockPool},
    error::Result,
    Cents, EntityId, Error,
};
use std::collections::BTreeMap;

/// What a decrement is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementTarget {
    Stock { pool: StockPool, id: EntityId },
    Wallet { customer_id: EntityId },
}

/// Compute `current - requested`, refusing to go below zero.
pub fn check_decrement(target: DecrementTarget, current: i64, requested: i64) -> Result<i64> {
    match current.checked_sub(requested) {
        Some(remaining) if remaining >= 0 => Ok(remaining),
        _ => Err(match target {
            DecrementTarget::Stock { pool, id } => Error::InsufficientStock {
                entity: pool.entity(),
                id,
                available: current,
                requested,
            },
            DecrementTarget::Wallet { customer_id } => Error::InsufficientBalance {
                id: customer_id,
                available: current,
                requested,
            },
        }),
    }
}

/// Shorthand for a stock decrement.
pub fn check_stock(pool: StockPool, id: EntityId, current: i64, requested: i64) -> Result<i64> {
    check_decrement(DecrementTarget::Stock { pool, id }, current, requested)
}

/// Shorthand for a wallet debit.
pub fn check_wallet(customer_id: EntityId, balance: Cents, amount: Cents) -> Result<Cents> {
    check_decrement(DecrementTarget::Wallet { customer_id }, balance, amount)
}

/// Quantity demanded per item by one sale.
///
/// Lines naming the same item are summed, so two lines of 2 against a stock
/// of 3 fail together instead of passing one at a time. Iteration is in
/// ascending item id, which is also the order rows are locked in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockDemand {
    per_item: BTreeMap<EntityId, i64>,
}

impl StockDemand {
    pub fn from_lines(lines: &[NewSaleLine]) -> Self {
        let mut demand = Self::default();
        for line in lines {
            demand.add(line.item_id, line.quantity);
        }
        demand
    }

    pub fn add(&mut self, item_id: EntityId, quantity: i64) {
        let total = self.per_item.entry(item_id).or_insert(0);
        *total = total.saturating_add(quantity);
    }

    /// `(item_id, total_quantity)` in lock order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, i64)> + '_ {
        self.per_item.iter().map(|(&id, &qty)| (id, qty))
    }

    /// Item ids in lock order.
    pub fn item_ids(&self) -> Vec<EntityId> {
        self.per_item.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.per_item.len()
    }

    pub fn is_empty(&self) -> bool {
        self.per_item.is_empty()
    }

    /// Check every item against the stock read for it.
    ///
    /// `stock_of` returns `None` for an item that does not exist. Returns the
    /// remaining stock per item, in lock order; nothing is returned unless
    /// every item passes.
    pub fn check(
        &self,
        pool: StockPool,
        mut stock_of: impl FnMut(EntityId) -> Option<i64>,
    ) -> Result<Vec<(EntityId, i64)>> {
        self.iter()
            .map(|(id, requested)| {
                let current = stock_of(id).ok_or(Error::NotFound {
                    entity: pool.entity(),
                    id,
                })?;
                Ok((id, check_stock(pool, id, current, requested)?))
            })
            .collect()
    }
}
