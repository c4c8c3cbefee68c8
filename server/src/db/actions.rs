//! Applying parsed actions inside a PostgreSQL transaction.
//!
//! Every function here runs on the connection of an open transaction; the
//! caller decides whether that transaction spans one action or a batch.
//! Rows that get decremented are locked with `SELECT ... FOR UPDATE` in a
//! fixed order (customer, then items by ascending id) and re-checked through
//! the resolver before they are written.

use super::rows::{item_table, parse_date, StoredCustomer, StoredItem, StoredSupplier, ITEM_COLUMNS};
use pharmsync_engine::{
    entity::{
        CustomerPatch, ItemPatch, NewCustomer, NewItem, NewSale, NewSupplier, PaymentMethod,
        StockPool, SupplierPatch,
    },
    resolver::{check_wallet, StockDemand},
    Action, ActionResult, Cents, CustomerAction, EntityId, EntityKind,
    Error as EngineError, InventoryAction, ParsedAction, SalesAction, SupplierAction, Timestamp,
    WholesaleAction,
};
use sqlx::PgConnection;
use std::collections::BTreeMap;

/// Why an action did not apply.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// The action itself was refused; the transaction is intact.
    #[error(transparent)]
    Rejected(#[from] EngineError),

    /// The database failed underneath the action.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Apply one action on an open transaction.
pub async fn apply_action(
    conn: &mut PgConnection,
    parsed: &ParsedAction,
    now: Timestamp,
) -> Result<ActionResult, ApplyError> {
    let action = &parsed.action;
    if let Some(key) = &parsed.idempotency_key {
        if let Some(entity_id) = reserve_key(conn, key, parsed).await? {
            return Ok(ActionResult::duplicate(entity_id));
        }
    }

    let entity_id = match action {
        Action::Inventory(action) => match action {
            InventoryAction::AddItem(new) => add_item(conn, StockPool::Retail, new).await?,
            InventoryAction::UpdateItem { id, patch } => {
                update_item(conn, StockPool::Retail, *id, patch).await?
            }
            InventoryAction::DeleteItem { id } => {
                delete_item(conn, StockPool::Retail, *id).await?
            }
        },
        Action::Sales(SalesAction::AddSale(sale)) => {
            add_sale(conn, StockPool::Retail, sale, now).await?
        }
        Action::Customers(action) => match action {
            CustomerAction::AddCustomer(new) => add_customer(conn, new).await?,
            CustomerAction::UpdateCustomer { id, patch } => {
                update_customer(conn, *id, patch).await?
            }
            CustomerAction::TopUpWallet { id, amount } => top_up_wallet(conn, *id, *amount).await?,
        },
        Action::Suppliers(action) => match action {
            SupplierAction::AddSupplier(new) => add_supplier(conn, new).await?,
            SupplierAction::UpdateSupplier { id, patch } => {
                update_supplier(conn, *id, patch).await?
            }
        },
        Action::Wholesale(action) => match action {
            WholesaleAction::AddItem(new) => add_item(conn, StockPool::Wholesale, new).await?,
            WholesaleAction::UpdateItem { id, patch } => {
                update_item(conn, StockPool::Wholesale, *id, patch).await?
            }
            WholesaleAction::DeleteItem { id } => {
                delete_item(conn, StockPool::Wholesale, *id).await?
            }
            WholesaleAction::AddSale(sale) => {
                add_sale(conn, StockPool::Wholesale, sale, now).await?
            }
        },
    };

    if let Some(key) = &parsed.idempotency_key {
        sqlx::query("UPDATE applied_actions SET entity_id = $2 WHERE idempotency_key = $1")
            .bind(key)
            .bind(entity_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(ActionResult::applied(entity_id))
}

/// Claim an idempotency key for this transaction.
///
/// Returns the recorded entity when the key was already applied by the same
/// kind of action. A concurrent transaction holding the same key makes this
/// wait until it commits or rolls back.
async fn reserve_key(
    conn: &mut PgConnection,
    key: &str,
    parsed: &ParsedAction,
) -> Result<Option<EntityId>, ApplyError> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO applied_actions (idempotency_key, domain, action_type)
        VALUES ($1, $2, $3)
        ON CONFLICT (idempotency_key) DO NOTHING
        "#,
    )
    .bind(key)
    .bind(parsed.action.domain().as_str())
    .bind(parsed.action.action_type())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if inserted == 1 {
        return Ok(None);
    }

    let (domain, action_type, entity_id): (String, String, Option<i64>) = sqlx::query_as(
        "SELECT domain, action_type, entity_id FROM applied_actions WHERE idempotency_key = $1",
    )
    .bind(key)
    .fetch_one(&mut *conn)
    .await?;

    parsed.check_replay(&domain, &action_type)?;

    entity_id.map(Some).ok_or_else(|| {
        ApplyError::Rejected(EngineError::TransactionFailure(format!(
            "idempotency key '{key}' has no recorded entity"
        )))
    })
}

async fn add_item(
    conn: &mut PgConnection,
    pool: StockPool,
    new: &NewItem,
) -> Result<EntityId, ApplyError> {
    let sql = format!(
        r#"
        INSERT INTO {} (
            name, dosage_form, brand, unit, cost, price, markup,
            stock, low_stock_threshold, exp_date
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
        item_table(pool)
    );
    let id = sqlx::query_scalar(&sql)
        .bind(&new.name)
        .bind(&new.dosage_form)
        .bind(&new.brand)
        .bind(&new.unit)
        .bind(new.cost)
        .bind(new.price)
        .bind(new.markup)
        .bind(new.stock)
        .bind(new.low_stock_threshold)
        .bind(parse_date(new.exp_date.as_deref())?)
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}

async fn update_item(
    conn: &mut PgConnection,
    pool: StockPool,
    id: EntityId,
    patch: &ItemPatch,
) -> Result<EntityId, ApplyError> {
    let table = item_table(pool);
    let sql = format!("SELECT {ITEM_COLUMNS} FROM {table} WHERE id = $1 FOR UPDATE");
    let mut item = sqlx::query_as::<_, StoredItem>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(EngineError::NotFound {
            entity: pool.entity(),
            id,
        })?
        .into_item();

    item.apply_patch(patch);

    let sql = format!(
        r#"
        UPDATE {table} SET
            name = $2, dosage_form = $3, brand = $4, unit = $5, cost = $6,
            price = $7, markup = $8, stock = $9, low_stock_threshold = $10,
            exp_date = $11
        WHERE id = $1
        "#
    );
    sqlx::query(&sql)
        .bind(id)
        .bind(&item.name)
        .bind(&item.dosage_form)
        .bind(&item.brand)
        .bind(&item.unit)
        .bind(item.cost)
        .bind(item.price)
        .bind(item.markup)
        .bind(item.stock)
        .bind(item.low_stock_threshold)
        .bind(parse_date(item.exp_date.as_deref())?)
        .execute(&mut *conn)
        .await?;
    Ok(id)
}

async fn delete_item(
    conn: &mut PgConnection,
    pool: StockPool,
    id: EntityId,
) -> Result<EntityId, ApplyError> {
    let sql = format!("DELETE FROM {} WHERE id = $1", item_table(pool));
    let deleted = sqlx::query(&sql)
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(EngineError::NotFound {
            entity: pool.entity(),
            id,
        }
        .into());
    }
    Ok(id)
}

async fn add_sale(
    conn: &mut PgConnection,
    pool: StockPool,
    sale: &NewSale,
    now: Timestamp,
) -> Result<EntityId, ApplyError> {
    let table = item_table(pool);

    let balance = match sale.customer_id {
        Some(customer_id) => Some(
            sqlx::query_scalar::<_, i64>(
                "SELECT wallet_balance FROM customers WHERE id = $1 FOR UPDATE",
            )
            .bind(customer_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(EngineError::NotFound {
                entity: EntityKind::Customer,
                id: customer_id,
            })?,
        ),
        None => None,
    };

    let demand = StockDemand::from_lines(&sale.lines);
    let sql = format!(
        "SELECT id, stock, price FROM {table} WHERE id = ANY($1) ORDER BY id FOR UPDATE"
    );
    let current: BTreeMap<EntityId, (i64, Cents)> = sqlx::query_as::<_, (i64, i64, i64)>(&sql)
        .bind(demand.item_ids())
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|(id, stock, price)| (id, (stock, price)))
        .collect();

    let remaining = demand.check(pool, |id| current.get(&id).map(|&(stock, _)| stock))?;
    let (lines, total) = sale.price(|id| current.get(&id).map(|&(_, price)| price));

    let wallet = match (sale.payment_method, sale.customer_id, balance) {
        (PaymentMethod::Wallet, Some(customer_id), Some(balance)) => {
            Some((customer_id, check_wallet(customer_id, balance, total)?))
        }
        _ => None,
    };

    let sql = format!("UPDATE {table} SET stock = $2 WHERE id = $1");
    for (id, stock) in remaining {
        sqlx::query(&sql)
            .bind(id)
            .bind(stock)
            .execute(&mut *conn)
            .await?;
    }

    if let Some((customer_id, balance)) = wallet {
        sqlx::query("UPDATE customers SET wallet_balance = $2 WHERE id = $1")
            .bind(customer_id)
            .bind(balance)
            .execute(&mut *conn)
            .await?;
    }

    let sale_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sales (pool, customer_id, payment_method, total_amount, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(pool.as_str())
    .bind(sale.customer_id)
    .bind(sale.payment_method.as_str())
    .bind(total)
    .bind(now as i64)
    .fetch_one(&mut *conn)
    .await?;

    for line in lines {
        sqlx::query(
            r#"
            INSERT INTO sale_items (sale_id, item_id, quantity, price, discount_amount)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(sale_id)
        .bind(line.item_id)
        .bind(line.quantity)
        .bind(line.price)
        .bind(line.discount_amount)
        .execute(&mut *conn)
        .await?;
    }

    Ok(sale_id)
}

async fn add_customer(conn: &mut PgConnection, new: &NewCustomer) -> Result<EntityId, ApplyError> {
    let id = sqlx::query_scalar(
        "INSERT INTO customers (name, phone, address) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(&new.name)
    .bind(&new.phone)
    .bind(&new.address)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

async fn update_customer(
    conn: &mut PgConnection,
    id: EntityId,
    patch: &CustomerPatch,
) -> Result<EntityId, ApplyError> {
    let mut customer = sqlx::query_as::<_, StoredCustomer>(
        "SELECT id, name, phone, address, wallet_balance FROM customers WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(EngineError::NotFound {
        entity: EntityKind::Customer,
        id,
    })?
    .into_customer();

    customer.apply_patch(patch);

    sqlx::query("UPDATE customers SET name = $2, phone = $3, address = $4 WHERE id = $1")
        .bind(id)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(&customer.address)
        .execute(&mut *conn)
        .await?;
    Ok(id)
}

async fn top_up_wallet(
    conn: &mut PgConnection,
    id: EntityId,
    amount: Cents,
) -> Result<EntityId, ApplyError> {
    sqlx::query_scalar::<_, i64>(
        "UPDATE customers SET wallet_balance = wallet_balance + $2 WHERE id = $1 RETURNING id",
    )
    .bind(id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| {
        EngineError::NotFound {
            entity: EntityKind::Customer,
            id,
        }
        .into()
    })
}

async fn add_supplier(conn: &mut PgConnection, new: &NewSupplier) -> Result<EntityId, ApplyError> {
    let id = sqlx::query_scalar(
        "INSERT INTO suppliers (name, phone, contact_info) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(&new.name)
    .bind(&new.phone)
    .bind(&new.contact_info)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

async fn update_supplier(
    conn: &mut PgConnection,
    id: EntityId,
    patch: &SupplierPatch,
) -> Result<EntityId, ApplyError> {
    let mut supplier = sqlx::query_as::<_, StoredSupplier>(
        "SELECT id, name, phone, contact_info FROM suppliers WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(EngineError::NotFound {
        entity: EntityKind::Supplier,
        id,
    })?
    .into_supplier();

    supplier.apply_patch(patch);

    sqlx::query("UPDATE suppliers SET name = $2, phone = $3, contact_info = $4 WHERE id = $1")
        .bind(id)
        .bind(&supplier.name)
        .bind(&supplier.phone)
        .bind(&supplier.contact_info)
        .execute(&mut *conn)
        .await?;
    Ok(id)
}
