//! Entities held by the authoritative store.
//!
//! Field names follow the point-of-sale's own models so that the bulk read can
//! be dropped straight into the client cache. Money is kept in cents and
//! written as decimal major units on the wire.

use crate::{Cents, EntityId, Timestamp};
use serde::{Deserialize, Serialize};

/// The kinds of entity actions can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Item,
    WholesaleItem,
    Customer,
    Supplier,
    Sale,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Item => "item",
            EntityKind::WholesaleItem => "wholesale item",
            EntityKind::Customer => "customer",
            EntityKind::Supplier => "supplier",
            EntityKind::Sale => "sale",
        };
        f.write_str(name)
    }
}

/// The two independent stock pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockPool {
    Retail,
    Wholesale,
}

impl StockPool {
    pub fn as_str(self) -> &'static str {
        match self {
            StockPool::Retail => "retail",
            StockPool::Wholesale => "wholesale",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "retail" => Some(StockPool::Retail),
            "wholesale" => Some(StockPool::Wholesale),
            _ => None,
        }
    }

    pub fn entity(self) -> EntityKind {
        match self {
            StockPool::Retail => EntityKind::Item,
            StockPool::Wholesale => EntityKind::WholesaleItem,
        }
    }
}

/// Serde adapter writing cents as a decimal amount of major units.
pub mod money {
    use crate::payload::{parse_cents, MoneyError};
    use crate::Cents;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(cents: &Cents, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(*cents as f64 / 100.0)
    }

    /// Amounts finer than a cent are refused rather than rounded.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Cents, D::Error> {
        let amount = serde_json::Number::deserialize(deserializer)?;
        parse_cents(amount.to_string()).map_err(|e| match e {
            MoneyError::SubCent => {
                D::Error::custom(format!("{amount} has more than two decimal places"))
            }
            MoneyError::NotANumber | MoneyError::OutOfRange => {
                D::Error::custom(format!("{amount} is not a valid amount"))
            }
        })
    }
}

/// A stock-keeping item. Retail and wholesale stock share the shape but live
/// in separate tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: EntityId,
    pub name: String,
    pub dosage_form: Option<String>,
    pub brand: Option<String>,
    pub unit: Option<String>,
    #[serde(with = "money")]
    pub cost: Cents,
    #[serde(with = "money")]
    pub price: Cents,
    pub markup: f64,
    pub stock: i64,
    pub low_stock_threshold: i64,
    pub exp_date: Option<String>,
}

/// Fields of an item about to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub name: String,
    pub dosage_form: Option<String>,
    pub brand: Option<String>,
    pub unit: Option<String>,
    pub cost: Cents,
    pub price: Cents,
    pub markup: f64,
    pub stock: i64,
    pub low_stock_threshold: i64,
    pub exp_date: Option<String>,
}

/// A partial item update. `None` leaves a field untouched; for nullable
/// fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub dosage_form: Option<Option<String>>,
    pub brand: Option<Option<String>>,
    pub unit: Option<Option<String>>,
    pub cost: Option<Cents>,
    pub price: Option<Cents>,
    pub markup: Option<f64>,
    pub stock: Option<i64>,
    pub low_stock_threshold: Option<i64>,
    pub exp_date: Option<Option<String>>,
}

impl Item {
    pub fn from_new(id: EntityId, new: NewItem) -> Self {
        Self {
            id,
            name: new.name,
            dosage_form: new.dosage_form,
            brand: new.brand,
            unit: new.unit,
            cost: new.cost,
            price: new.price,
            markup: new.markup,
            stock: new.stock,
            low_stock_threshold: new.low_stock_threshold,
            exp_date: new.exp_date,
        }
    }

    /// Apply a patch field by field; the last write wins.
    pub fn apply_patch(&mut self, patch: &ItemPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(dosage_form) = &patch.dosage_form {
            self.dosage_form = dosage_form.clone();
        }
        if let Some(brand) = &patch.brand {
            self.brand = brand.clone();
        }
        if let Some(unit) = &patch.unit {
            self.unit = unit.clone();
        }
        if let Some(cost) = patch.cost {
            self.cost = cost;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(markup) = patch.markup {
            self.markup = markup;
        }
        if let Some(stock) = patch.stock {
            self.stock = stock;
        }
        if let Some(threshold) = patch.low_stock_threshold {
            self.low_stock_threshold = threshold;
        }
        if let Some(exp_date) = &patch.exp_date {
            self.exp_date = exp_date.clone();
        }
    }

    pub fn is_low_on_stock(&self) -> bool {
        self.stock <= self.low_stock_threshold
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: EntityId,
    pub name: String,
    pub phone: String,
    pub address: String,
    #[serde(with = "money")]
    pub wallet_balance: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomer {
    pub name: String,
    pub phone: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl Customer {
    pub fn from_new(id: EntityId, new: NewCustomer) -> Self {
        Self {
            id,
            name: new.name,
            phone: new.phone,
            address: new.address,
            wallet_balance: 0,
        }
    }

    pub fn apply_patch(&mut self, patch: &CustomerPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(phone) = &patch.phone {
            self.phone = phone.clone();
        }
        if let Some(address) = &patch.address {
            self.address = address.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: EntityId,
    pub name: String,
    pub phone: Option<String>,
    pub contact_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSupplier {
    pub name: String,
    pub phone: Option<String>,
    pub contact_info: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupplierPatch {
    pub name: Option<String>,
    pub phone: Option<Option<String>>,
    pub contact_info: Option<Option<String>>,
}

impl Supplier {
    pub fn from_new(id: EntityId, new: NewSupplier) -> Self {
        Self {
            id,
            name: new.name,
            phone: new.phone,
            contact_info: new.contact_info,
        }
    }

    pub fn apply_patch(&mut self, patch: &SupplierPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(phone) = &patch.phone {
            self.phone = phone.clone();
        }
        if let Some(contact_info) = &patch.contact_info {
            self.contact_info = contact_info.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[default]
    Cash,
    Wallet,
    Transfer,
}

impl PaymentMethod {
    /// Parse a payment method name, ignoring case.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "cash" => Some(PaymentMethod::Cash),
            "wallet" => Some(PaymentMethod::Wallet),
            "transfer" => Some(PaymentMethod::Transfer),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::Wallet => "Wallet",
            PaymentMethod::Transfer => "Transfer",
        }
    }
}

/// A recorded sale header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: EntityId,
    pub pool: StockPool,
    pub customer_id: Option<EntityId>,
    pub payment_method: PaymentMethod,
    #[serde(with = "money")]
    pub total_amount: Cents,
    pub created_at: Timestamp,
}

/// One line of a recorded sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub id: EntityId,
    pub sale_id: EntityId,
    pub item_id: EntityId,
    pub quantity: i64,
    #[serde(with = "money")]
    pub price: Cents,
    #[serde(with = "money")]
    pub discount_amount: Cents,
}

/// A sale about to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSale {
    pub customer_id: Option<EntityId>,
    pub payment_method: PaymentMethod,
    /// Explicit total; the line total is used when absent.
    pub total_amount: Option<Cents>,
    pub lines: Vec<NewSaleLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSaleLine {
    pub item_id: EntityId,
    pub quantity: i64,
    /// Unit price; the item's current price is used when absent.
    pub price: Option<Cents>,
    pub discount_amount: Cents,
}

/// A sale line with its unit price settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub item_id: EntityId,
    pub quantity: i64,
    pub price: Cents,
    pub discount_amount: Cents,
}

impl PricedLine {
    pub fn total(&self) -> Cents {
        line_total(self.price, self.quantity, self.discount_amount)
    }
}

impl NewSale {
    /// Settle each line's unit price and the sale total.
    ///
    /// A line without a price takes the item's current price from `price_of`.
    /// Without an explicit total, the sum of line totals is used.
    pub fn price(
        &self,
        mut price_of: impl FnMut(EntityId) -> Option<Cents>,
    ) -> (Vec<PricedLine>, Cents) {
        let lines: Vec<PricedLine> = self
            .lines
            .iter()
            .map(|line| PricedLine {
                item_id: line.item_id,
                quantity: line.quantity,
                price: line
                    .price
                    .or_else(|| price_of(line.item_id))
                    .unwrap_or(0),
                discount_amount: line.discount_amount,
            })
            .collect();
        let total = self
            .total_amount
            .unwrap_or_else(|| lines.iter().map(PricedLine::total).sum());
        (lines, total)
    }
}

/// `price * quantity - discount`, floored at zero.
pub fn line_total(price: Cents, quantity: i64, discount: Cents) -> Cents {
    price
        .saturating_mul(quantity)
        .saturating_sub(discount)
        .max(0)
}
