//! Row types and reads for the entity tables.

use chrono::NaiveDate;
use pharmsync_engine::{
    entity::{Customer, Item, StockPool, Supplier},
    payload::DATE_FORMAT,
    Error as EngineError, InitialData,
};
use sqlx::{PgExecutor, PgPool, Row};

/// Table holding a stock pool.
pub fn item_table(pool: StockPool) -> &'static str {
    match pool {
        StockPool::Retail => "items",
        StockPool::Wholesale => "wholesale_items",
    }
}

/// Parse a validated `YYYY-MM-DD` payload date.
pub fn parse_date(value: Option<&str>) -> Result<Option<NaiveDate>, EngineError> {
    value
        .map(|s| {
            NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| EngineError::InvalidValue {
                field: "exp_date".to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

/// A stored item row, retail or wholesale.
#[derive(Debug)]
pub struct StoredItem {
    pub id: i64,
    pub name: String,
    pub dosage_form: Option<String>,
    pub brand: Option<String>,
    pub unit: Option<String>,
    pub cost: i64,
    pub price: i64,
    pub markup: f64,
    pub stock: i64,
    pub low_stock_threshold: i64,
    pub exp_date: Option<NaiveDate>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredItem {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredItem {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            dosage_form: row.try_get("dosage_form")?,
            brand: row.try_get("brand")?,
            unit: row.try_get("unit")?,
            cost: row.try_get("cost")?,
            price: row.try_get("price")?,
            markup: row.try_get("markup")?,
            stock: row.try_get("stock")?,
            low_stock_threshold: row.try_get("low_stock_threshold")?,
            exp_date: row.try_get("exp_date")?,
        })
    }
}

impl StoredItem {
    /// Convert database row to an engine Item.
    pub fn into_item(self) -> Item {
        Item {
            id: self.id,
            name: self.name,
            dosage_form: self.dosage_form,
            brand: self.brand,
            unit: self.unit,
            cost: self.cost,
            price: self.price,
            markup: self.markup,
            stock: self.stock,
            low_stock_threshold: self.low_stock_threshold,
            exp_date: self
                .exp_date
                .map(|date| date.format(DATE_FORMAT).to_string()),
        }
    }
}

pub const ITEM_COLUMNS: &str = "id, name, dosage_form, brand, unit, cost, price, markup, \
                                stock, low_stock_threshold, exp_date";

#[derive(Debug)]
pub struct StoredCustomer {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub wallet_balance: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredCustomer {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredCustomer {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            phone: row.try_get("phone")?,
            address: row.try_get("address")?,
            wallet_balance: row.try_get("wallet_balance")?,
        })
    }
}

impl StoredCustomer {
    pub fn into_customer(self) -> Customer {
        Customer {
            id: self.id,
            name: self.name,
            phone: self.phone,
            address: self.address,
            wallet_balance: self.wallet_balance,
        }
    }
}

#[derive(Debug)]
pub struct StoredSupplier {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub contact_info: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredSupplier {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredSupplier {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            phone: row.try_get("phone")?,
            contact_info: row.try_get("contact_info")?,
        })
    }
}

impl StoredSupplier {
    pub fn into_supplier(self) -> Supplier {
        Supplier {
            id: self.id,
            name: self.name,
            phone: self.phone,
            contact_info: self.contact_info,
        }
    }
}

/// All items of one pool, ordered by id.
pub async fn get_items<'e>(
    executor: impl PgExecutor<'e>,
    pool: StockPool,
) -> Result<Vec<Item>, sqlx::Error> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM {} ORDER BY id",
        item_table(pool)
    );
    let rows = sqlx::query_as::<_, StoredItem>(&sql)
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(StoredItem::into_item).collect())
}

/// Bulk read of every cacheable table.
pub async fn get_initial_data(pool: &PgPool) -> Result<InitialData, sqlx::Error> {
    let inventory = get_items(pool, StockPool::Retail).await?;
    let wholesale = get_items(pool, StockPool::Wholesale).await?;

    let customers = sqlx::query_as::<_, StoredCustomer>(
        r#"
        SELECT id, name, phone, address, wallet_balance
        FROM customers
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let suppliers = sqlx::query_as::<_, StoredSupplier>(
        r#"
        SELECT id, name, phone, contact_info
        FROM suppliers
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(InitialData {
        inventory,
        customers: customers
            .into_iter()
            .map(StoredCustomer::into_customer)
            .collect(),
        suppliers: suppliers
            .into_iter()
            .map(StoredSupplier::into_supplier)
            .collect(),
        wholesale,
    }
    .normalize())
}
