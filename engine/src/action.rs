//! Actions: the queued mutations replayed by the coordinator.
//!
//! On the wire an action is an [`ActionEnvelope`], a string tag plus a JSON
//! payload. Before it reaches the store it is parsed into a closed, per-domain
//! enum, so an unrecognised tag is an explicit `UnknownActionType` failure and
//! every payload has been checked against its [`PayloadSchema`].

use crate::{
    entity::{
        CustomerPatch, ItemPatch, NewCustomer, NewItem, NewSale, NewSaleLine, NewSupplier,
        PaymentMethod, SupplierPatch,
    },
    error::Result,
    payload::{FieldDef, FieldType, Payload, PayloadSchema},
    Cents, EntityId, Error, IdempotencyKey,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An entity domain. Each has its own sync endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Inventory,
    Sales,
    Customers,
    Suppliers,
    Wholesale,
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::Inventory,
        Domain::Sales,
        Domain::Customers,
        Domain::Suppliers,
        Domain::Wholesale,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Inventory => "inventory",
            Domain::Sales => "sales",
            Domain::Customers => "customers",
            Domain::Suppliers => "suppliers",
            Domain::Wholesale => "wholesale",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == name)
    }

    /// Action tags accepted by this domain's endpoint.
    pub fn action_types(self) -> &'static [&'static str] {
        match self {
            Domain::Inventory => &["add_item", "update_item", "delete_item"],
            Domain::Sales => &["add_sale"],
            Domain::Customers => &["add_customer", "update_customer", "top_up_wallet"],
            Domain::Suppliers => &["add_supplier", "update_supplier"],
            Domain::Wholesale => &[
                "add_wholesale_item",
                "update_wholesale_item",
                "delete_wholesale_item",
                "add_wholesale_sale",
            ],
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued action as sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEnvelope {
    /// Action tag, e.g. `add_item`
    pub action_type: String,
    /// Payload; absent is treated as an empty object
    #[serde(default)]
    pub data: Value,
    /// Client-generated key making resubmission safe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<IdempotencyKey>,
    /// Position in the client's queue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_sequence: Option<u64>,
}

impl ActionEnvelope {
    pub fn new(action_type: impl Into<String>, data: Value) -> Self {
        Self {
            action_type: action_type.into(),
            data,
            idempotency_key: None,
            client_sequence: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<IdempotencyKey>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_client_sequence(mut self, sequence: u64) -> Self {
        self.client_sequence = Some(sequence);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InventoryAction {
    AddItem(NewItem),
    UpdateItem { id: EntityId, patch: ItemPatch },
    DeleteItem { id: EntityId },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SalesAction {
    AddSale(NewSale),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CustomerAction {
    AddCustomer(NewCustomer),
    UpdateCustomer { id: EntityId, patch: CustomerPatch },
    TopUpWallet { id: EntityId, amount: Cents },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SupplierAction {
    AddSupplier(NewSupplier),
    UpdateSupplier { id: EntityId, patch: SupplierPatch },
}

#[derive(Debug, Clone, PartialEq)]
pub enum WholesaleAction {
    AddItem(NewItem),
    UpdateItem { id: EntityId, patch: ItemPatch },
    DeleteItem { id: EntityId },
    AddSale(NewSale),
}

/// A parsed action, tagged by domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Inventory(InventoryAction),
    Sales(SalesAction),
    Customers(CustomerAction),
    Suppliers(SupplierAction),
    Wholesale(WholesaleAction),
}

impl Action {
    /// Parse an envelope submitted to `domain`'s endpoint.
    pub fn parse(domain: Domain, envelope: &ActionEnvelope) -> Result<Action> {
        let empty = Value::Object(Map::new());
        let data = if envelope.data.is_null() {
            &empty
        } else {
            &envelope.data
        };

        let action = match (domain, envelope.action_type.as_str()) {
            (Domain::Inventory, "add_item") => {
                Action::Inventory(InventoryAction::AddItem(parse_new_item(data)?))
            }
            (Domain::Inventory, "update_item") => {
                let (id, patch) = parse_item_patch(data)?;
                Action::Inventory(InventoryAction::UpdateItem { id, patch })
            }
            (Domain::Inventory, "delete_item") => Action::Inventory(InventoryAction::DeleteItem {
                id: parse_target(data)?,
            }),
            (Domain::Sales, "add_sale") => {
                Action::Sales(SalesAction::AddSale(parse_new_sale(&RETAIL_SALE, data)?))
            }
            (Domain::Customers, "add_customer") => {
                Action::Customers(CustomerAction::AddCustomer(parse_new_customer(data)?))
            }
            (Domain::Customers, "update_customer") => {
                let (id, patch) = parse_customer_patch(data)?;
                Action::Customers(CustomerAction::UpdateCustomer { id, patch })
            }
            (Domain::Customers, "top_up_wallet") => {
                let (id, amount) = parse_top_up(data)?;
                Action::Customers(CustomerAction::TopUpWallet { id, amount })
            }
            (Domain::Suppliers, "add_supplier") => {
                Action::Suppliers(SupplierAction::AddSupplier(parse_new_supplier(data)?))
            }
            (Domain::Suppliers, "update_supplier") => {
                let (id, patch) = parse_supplier_patch(data)?;
                Action::Suppliers(SupplierAction::UpdateSupplier { id, patch })
            }
            (Domain::Wholesale, "add_wholesale_item") => {
                Action::Wholesale(WholesaleAction::AddItem(parse_new_item(data)?))
            }
            (Domain::Wholesale, "update_wholesale_item") => {
                let (id, patch) = parse_item_patch(data)?;
                Action::Wholesale(WholesaleAction::UpdateItem { id, patch })
            }
            (Domain::Wholesale, "delete_wholesale_item") => {
                Action::Wholesale(WholesaleAction::DeleteItem {
                    id: parse_target(data)?,
                })
            }
            (Domain::Wholesale, "add_wholesale_sale") => Action::Wholesale(
                WholesaleAction::AddSale(parse_new_sale(&WHOLESALE_SALE, data)?),
            ),
            _ => {
                return Err(Error::UnknownActionType {
                    domain,
                    action_type: envelope.action_type.clone(),
                })
            }
        };

        Ok(action)
    }

    pub fn domain(&self) -> Domain {
        match self {
            Action::Inventory(_) => Domain::Inventory,
            Action::Sales(_) => Domain::Sales,
            Action::Customers(_) => Domain::Customers,
            Action::Suppliers(_) => Domain::Suppliers,
            Action::Wholesale(_) => Domain::Wholesale,
        }
    }

    /// The wire tag of this action.
    pub fn action_type(&self) -> &'static str {
        match self {
            Action::Inventory(InventoryAction::AddItem(_)) => "add_item",
            Action::Inventory(InventoryAction::UpdateItem { .. }) => "update_item",
            Action::Inventory(InventoryAction::DeleteItem { .. }) => "delete_item",
            Action::Sales(SalesAction::AddSale(_)) => "add_sale",
            Action::Customers(CustomerAction::AddCustomer(_)) => "add_customer",
            Action::Customers(CustomerAction::UpdateCustomer { .. }) => "update_customer",
            Action::Customers(CustomerAction::TopUpWallet { .. }) => "top_up_wallet",
            Action::Suppliers(SupplierAction::AddSupplier(_)) => "add_supplier",
            Action::Suppliers(SupplierAction::UpdateSupplier { .. }) => "update_supplier",
            Action::Wholesale(WholesaleAction::AddItem(_)) => "add_wholesale_item",
            Action::Wholesale(WholesaleAction::UpdateItem { .. }) => "update_wholesale_item",
            Action::Wholesale(WholesaleAction::DeleteItem { .. }) => "delete_wholesale_item",
            Action::Wholesale(WholesaleAction::AddSale(_)) => "add_wholesale_sale",
        }
    }
}

/// An action ready to apply, carrying its idempotency key.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAction {
    pub action: Action,
    pub idempotency_key: Option<IdempotencyKey>,
}

impl ParsedAction {
    pub fn parse(domain: Domain, envelope: &ActionEnvelope) -> Result<Self> {
        Ok(Self {
            action: Action::parse(domain, envelope)?,
            idempotency_key: envelope.idempotency_key.clone(),
        })
    }

    /// Check that this action may replay a key already recorded for
    /// `domain` / `action_type`.
    ///
    /// A key reused by a different action is a client bug; reporting it as a
    /// duplicate would let the client drop an action that never applied.
    pub fn check_replay(&self, domain: &str, action_type: &str) -> Result<()> {
        if self.action.domain().as_str() == domain && self.action.action_type() == action_type {
            return Ok(());
        }
        Err(Error::invalid_value(
            "idempotencyKey",
            format!(
                "key '{}' was already used by {domain} {action_type}",
                self.idempotency_key.as_deref().unwrap_or_default()
            ),
        ))
    }
}

/// Parse every envelope of a batch, keeping positions.
///
/// Per-action parse failures are returned in place so the coordinator can
/// report them. The outer error is reserved for problems with the batch as a
/// whole: client sequence numbers that are present must strictly increase.
pub fn parse_batch(
    domain: Domain,
    envelopes: &[ActionEnvelope],
) -> Result<Vec<Result<ParsedAction>>> {
    check_sequence(envelopes)?;
    Ok(envelopes
        .iter()
        .map(|envelope| ParsedAction::parse(domain, envelope))
        .collect())
}

fn check_sequence(envelopes: &[ActionEnvelope]) -> Result<()> {
    let mut previous: Option<u64> = None;
    for (position, envelope) in envelopes.iter().enumerate() {
        let Some(sequence) = envelope.client_sequence else {
            continue;
        };
        if let Some(previous) = previous {
            if sequence <= previous {
                return Err(Error::SequenceOutOfOrder {
                    position,
                    previous,
                    sequence,
                });
            }
        }
        previous = Some(sequence);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Payload schemas
// ---------------------------------------------------------------------------

const NEW_ITEM: PayloadSchema = PayloadSchema::new(&[
    FieldDef::required("name", FieldType::String),
    FieldDef::optional("dosage_form", FieldType::String),
    FieldDef::optional("brand", FieldType::String),
    FieldDef::optional("unit", FieldType::String),
    FieldDef::optional("cost", FieldType::Money),
    FieldDef::optional("price", FieldType::Money),
    FieldDef::optional("markup", FieldType::Float),
    FieldDef::optional("stock", FieldType::Count),
    FieldDef::optional("low_stock_threshold", FieldType::Count),
    FieldDef::optional("exp_date", FieldType::Date),
]);

const ITEM_PATCH: PayloadSchema = PayloadSchema::new(&[
    FieldDef::required("id", FieldType::Id),
    FieldDef::optional("name", FieldType::String),
    FieldDef::optional("dosage_form", FieldType::String),
    FieldDef::optional("brand", FieldType::String),
    FieldDef::optional("unit", FieldType::String),
    FieldDef::optional("cost", FieldType::Money),
    FieldDef::optional("price", FieldType::Money),
    FieldDef::optional("markup", FieldType::Float),
    FieldDef::optional("stock", FieldType::Count),
    FieldDef::optional("low_stock_threshold", FieldType::Count),
    FieldDef::optional("exp_date", FieldType::Date),
]);

const TARGET: PayloadSchema = PayloadSchema::new(&[FieldDef::required("id", FieldType::Id)]);

const NEW_CUSTOMER: PayloadSchema = PayloadSchema::new(&[
    FieldDef::required("name", FieldType::String),
    FieldDef::required("phone", FieldType::String),
    FieldDef::optional("address", FieldType::String),
]);

const CUSTOMER_PATCH: PayloadSchema = PayloadSchema::new(&[
    FieldDef::required("id", FieldType::Id),
    FieldDef::optional("name", FieldType::String),
    FieldDef::optional("phone", FieldType::String),
    FieldDef::optional("address", FieldType::String),
]);

const TOP_UP: PayloadSchema = PayloadSchema::new(&[
    FieldDef::required("id", FieldType::Id),
    FieldDef::required("amount", FieldType::Money),
]);

const NEW_SUPPLIER: PayloadSchema = PayloadSchema::new(&[
    FieldDef::required("name", FieldType::String),
    FieldDef::optional("phone", FieldType::String),
    FieldDef::optional("contact_info", FieldType::String),
]);

const SUPPLIER_PATCH: PayloadSchema = PayloadSchema::new(&[
    FieldDef::required("id", FieldType::Id),
    FieldDef::optional("name", FieldType::String),
    FieldDef::optional("phone", FieldType::String),
    FieldDef::optional("contact_info", FieldType::String),
]);

const RETAIL_SALE: PayloadSchema = PayloadSchema::new(&[
    FieldDef::optional("customer_id", FieldType::Id),
    FieldDef::optional("payment_method", FieldType::String),
    FieldDef::optional("total_amount", FieldType::Money),
    FieldDef::required("items", FieldType::Lines),
]);

const WHOLESALE_SALE: PayloadSchema = PayloadSchema::new(&[
    FieldDef::optional("payment_method", FieldType::String),
    FieldDef::optional("total_amount", FieldType::Money),
    FieldDef::required("items", FieldType::Lines),
]);

const SALE_LINE: PayloadSchema = PayloadSchema::new(&[
    FieldDef::required("item_id", FieldType::Id),
    FieldDef::required("quantity", FieldType::Count),
    FieldDef::optional("price", FieldType::Money),
    FieldDef::optional("discount_amount", FieldType::Money),
]);

fn parse_target(data: &Value) -> Result<EntityId> {
    TARGET.validate(data)?.required_id("id")
}

fn parse_new_item(data: &Value) -> Result<NewItem> {
    let p = NEW_ITEM.validate(data)?;
    Ok(NewItem {
        name: p.non_empty_string("name")?,
        dosage_form: p.string("dosage_form"),
        brand: p.string("brand"),
        unit: p.string("unit"),
        cost: p.money("cost")?.unwrap_or(0),
        price: p.money("price")?.unwrap_or(0),
        markup: p.float("markup")?.unwrap_or(0.0),
        stock: p.count("stock")?.unwrap_or(0),
        low_stock_threshold: p.count("low_stock_threshold")?.unwrap_or(0),
        exp_date: p.string("exp_date"),
    })
}

fn parse_item_patch(data: &Value) -> Result<(EntityId, ItemPatch)> {
    let p = ITEM_PATCH.validate(data)?;
    for field in [
        "name",
        "cost",
        "price",
        "markup",
        "stock",
        "low_stock_threshold",
    ] {
        p.not_null(field)?;
    }
    let name = match p.string("name") {
        Some(_) => Some(p.non_empty_string("name")?),
        None => None,
    };
    let patch = ItemPatch {
        name,
        dosage_form: p.nullable_string("dosage_form"),
        brand: p.nullable_string("brand"),
        unit: p.nullable_string("unit"),
        cost: p.money("cost")?,
        price: p.money("price")?,
        markup: p.float("markup")?,
        stock: p.count("stock")?,
        low_stock_threshold: p.count("low_stock_threshold")?,
        exp_date: p.nullable_string("exp_date"),
    };
    Ok((p.required_id("id")?, patch))
}

fn parse_new_customer(data: &Value) -> Result<NewCustomer> {
    let p = NEW_CUSTOMER.validate(data)?;
    Ok(NewCustomer {
        name: p.non_empty_string("name")?,
        phone: p.required_string("phone")?,
        address: p.string("address").unwrap_or_default(),
    })
}

fn parse_customer_patch(data: &Value) -> Result<(EntityId, CustomerPatch)> {
    let p = CUSTOMER_PATCH.validate(data)?;
    for field in ["name", "phone", "address"] {
        p.not_null(field)?;
    }
    let patch = CustomerPatch {
        name: p.string("name"),
        phone: p.string("phone"),
        address: p.string("address"),
    };
    Ok((p.required_id("id")?, patch))
}

fn parse_top_up(data: &Value) -> Result<(EntityId, Cents)> {
    let p = TOP_UP.validate(data)?;
    let amount = p.money("amount")?.unwrap_or(0);
    if amount <= 0 {
        return Err(Error::invalid_value("amount", "must be greater than zero"));
    }
    Ok((p.required_id("id")?, amount))
}

fn parse_new_supplier(data: &Value) -> Result<NewSupplier> {
    let p = NEW_SUPPLIER.validate(data)?;
    Ok(NewSupplier {
        name: p.non_empty_string("name")?,
        phone: p.string("phone"),
        contact_info: p.string("contact_info"),
    })
}

fn parse_supplier_patch(data: &Value) -> Result<(EntityId, SupplierPatch)> {
    let p = SUPPLIER_PATCH.validate(data)?;
    p.not_null("name")?;
    let patch = SupplierPatch {
        name: p.string("name"),
        phone: p.nullable_string("phone"),
        contact_info: p.nullable_string("contact_info"),
    };
    Ok((p.required_id("id")?, patch))
}

fn parse_new_sale(schema: &PayloadSchema, data: &Value) -> Result<NewSale> {
    let p = schema.validate(data)?;

    let payment_method = match p.string("payment_method") {
        Some(name) => PaymentMethod::parse(&name).ok_or_else(|| {
            Error::invalid_value("payment_method", format!("unknown payment method '{name}'"))
        })?,
        None => PaymentMethod::default(),
    };
    let customer_id = p.id("customer_id")?;
    if payment_method == PaymentMethod::Wallet && customer_id.is_none() {
        return Err(Error::invalid_value(
            "payment_method",
            "wallet payment requires a customer_id",
        ));
    }

    let lines = p
        .lines("items")
        .into_iter()
        .enumerate()
        .map(|(index, line)| {
            parse_sale_line(line).map_err(|e| Error::InvalidValue {
                field: format!("items[{index}]"),
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    if lines.is_empty() {
        return Err(Error::invalid_value("items", "a sale needs at least one line"));
    }

    Ok(NewSale {
        customer_id,
        payment_method,
        total_amount: p.money("total_amount")?,
        lines,
    })
}

fn parse_sale_line(line: &Value) -> Result<NewSaleLine> {
    let p: Payload<'_> = SALE_LINE.validate(line)?;
    let quantity = p.count("quantity")?.unwrap_or(0);
    if quantity == 0 {
        return Err(Error::invalid_value("quantity", "must be greater than zero"));
    }
    Ok(NewSaleLine {
        item_id: p.required_id("item_id")?,
        quantity,
        price: p.money("price")?,
        discount_amount: p.money("discount_amount")?.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;

    fn envelope(action_type: &str, data: Value) -> ActionEnvelope {
        ActionEnvelope::new(action_type, data)
    }

    #[test]
    fn parse_add_item() {
        let action = Action::parse(
            Domain::Inventory,
            &envelope(
                "add_item",
                json!({"name": "Paracetamol", "stock": 100, "price": 50}),
            ),
        )
        .unwrap();

        match action {
            Action::Inventory(InventoryAction::AddItem(item)) => {
                assert_eq!(item.name, "Paracetamol");
                assert_eq!(item.stock, 100);
                assert_eq!(item.price, 5000);
                assert_eq!(item.low_stock_threshold, 0);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn parse_update_item_keeps_absent_fields_untouched() {
        let action = Action::parse(
            Domain::Inventory,
            &envelope("update_item", json!({"id": 4, "stock": 80, "brand": null})),
        )
        .unwrap();

        let Action::Inventory(InventoryAction::UpdateItem { id, patch }) = action else {
            panic!("expected update_item");
        };
        assert_eq!(id, 4);
        assert_eq!(patch.stock, Some(80));
        assert_eq!(patch.brand, Some(None));
        assert_eq!(patch.name, None);
        assert_eq!(patch.price, None);
    }

    #[test]
    fn update_cannot_null_required_fields() {
        let err = Action::parse(
            Domain::Inventory,
            &envelope("update_item", json!({"id": 4, "stock": null})),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn unknown_action_type() {
        let err = Action::parse(Domain::Inventory, &envelope("bogus_type", json!({}))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownActionType);
    }

    #[test]
    fn action_type_of_another_domain_is_unknown() {
        let err = Action::parse(
            Domain::Customers,
            &envelope("add_item", json!({"name": "Paracetamol"})),
        )
        .unwrap_err();
        assert_eq!(
            err,
            Error::UnknownActionType {
                domain: Domain::Customers,
                action_type: "add_item".into(),
            }
        );
    }

    #[test]
    fn missing_data_is_an_empty_payload() {
        let err = Action::parse(Domain::Inventory, &envelope("add_item", Value::Null)).unwrap_err();
        assert_eq!(err, Error::MissingRequiredField("name".into()));
    }

    #[test]
    fn parse_sale_lines() {
        let action = Action::parse(
            Domain::Sales,
            &envelope(
                "add_sale",
                json!({
                    "customer_id": 3,
                    "payment_method": "Wallet",
                    "items": [
                        {"item_id": 1, "quantity": 2},
                        {"item_id": 2, "quantity": "1", "price": 12.5, "discount_amount": 1}
                    ]
                }),
            ),
        )
        .unwrap();

        let Action::Sales(SalesAction::AddSale(sale)) = action else {
            panic!("expected add_sale");
        };
        assert_eq!(sale.customer_id, Some(3));
        assert_eq!(sale.payment_method, PaymentMethod::Wallet);
        assert_eq!(sale.lines.len(), 2);
        assert_eq!(sale.lines[0].price, None);
        assert_eq!(sale.lines[1].price, Some(1250));
        assert_eq!(sale.lines[1].discount_amount, 100);
    }

    #[test]
    fn sale_line_errors_name_the_line() {
        let err = Action::parse(
            Domain::Sales,
            &envelope(
                "add_sale",
                json!({"items": [{"item_id": 1, "quantity": 1}, {"item_id": 2, "quantity": 0}]}),
            ),
        )
        .unwrap_err();

        assert!(matches!(err, Error::InvalidValue { ref field, .. } if field == "items[1]"));
    }

    #[test]
    fn empty_sale_rejected() {
        let err =
            Action::parse(Domain::Sales, &envelope("add_sale", json!({"items": []}))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn wallet_sale_needs_customer() {
        let err = Action::parse(
            Domain::Sales,
            &envelope(
                "add_sale",
                json!({"payment_method": "wallet", "items": [{"item_id": 1, "quantity": 1}]}),
            ),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn wholesale_sale_has_no_customer() {
        let err = Action::parse(
            Domain::Wholesale,
            &envelope(
                "add_wholesale_sale",
                json!({"customer_id": 1, "items": [{"item_id": 1, "quantity": 1}]}),
            ),
        )
        .unwrap_err();
        assert_eq!(err, Error::UnknownField("customer_id".into()));
    }

    #[test]
    fn top_up_must_be_positive() {
        let err = Action::parse(
            Domain::Customers,
            &envelope("top_up_wallet", json!({"id": 1, "amount": 0})),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn every_listed_action_type_is_recognised() {
        for domain in Domain::ALL {
            for action_type in domain.action_types() {
                let result = Action::parse(domain, &envelope(action_type, json!({})));
                if let Err(err) = result {
                    assert_ne!(
                        err.kind(),
                        ErrorKind::UnknownActionType,
                        "{domain}/{action_type}"
                    );
                }
            }
        }
    }

    #[test]
    fn action_type_round_trips_through_parse() {
        let action = Action::parse(
            Domain::Wholesale,
            &envelope("delete_wholesale_item", json!({"id": 9})),
        )
        .unwrap();
        assert_eq!(action.action_type(), "delete_wholesale_item");
        assert_eq!(action.domain(), Domain::Wholesale);
    }

    #[test]
    fn envelope_wire_format() {
        let json = r#"{"actionType": "add_item", "data": {"name": "Paracetamol"},
                       "idempotencyKey": "till-1:1", "clientSequence": 1}"#;
        let parsed: ActionEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.action_type, "add_item");
        assert_eq!(parsed.idempotency_key.as_deref(), Some("till-1:1"));
        assert_eq!(parsed.client_sequence, Some(1));

        let minimal: ActionEnvelope = serde_json::from_str(r#"{"actionType": "x"}"#).unwrap();
        assert!(minimal.data.is_null());
        assert!(minimal.idempotency_key.is_none());
    }

    #[test]
    fn batch_rejects_out_of_order_sequences() {
        let envelopes = vec![
            envelope("delete_item", json!({"id": 1})).with_client_sequence(5),
            envelope("delete_item", json!({"id": 2})),
            envelope("delete_item", json!({"id": 3})).with_client_sequence(5),
        ];
        let err = parse_batch(Domain::Inventory, &envelopes).unwrap_err();
        assert_eq!(
            err,
            Error::SequenceOutOfOrder {
                position: 2,
                previous: 5,
                sequence: 5,
            }
        );
    }

    #[test]
    fn replay_must_match_the_recorded_action() {
        let parsed = ParsedAction::parse(
            Domain::Sales,
            &envelope("add_sale", json!({"items": [{"item_id": 1, "quantity": 2}]}))
                .with_idempotency_key("k1"),
        )
        .unwrap();

        assert!(parsed.check_replay("sales", "add_sale").is_ok());

        let err = parsed.check_replay("inventory", "add_item").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(err.to_string().contains("inventory add_item"));
        assert!(parsed.check_replay("sales", "add_item").is_err());
    }

    #[test]
    fn batch_keeps_positions() {
        let envelopes = vec![
            envelope("delete_item", json!({"id": 1})).with_client_sequence(1),
            envelope("bogus_type", json!({})).with_client_sequence(2),
            envelope("delete_item", json!({"id": 3})).with_client_sequence(3),
        ];
        let parsed = parse_batch(Domain::Inventory, &envelopes).unwrap();
        assert_eq!(parsed.len(), 3);
        assert!(parsed[0].is_ok());
        assert!(parsed[1].is_err());
        assert!(parsed[2].is_ok());
    }
}
