//! # Pharmsync Engine
//!
//! Offline action replay for a pharmacy point of sale.
//!
//! A register that loses its connection keeps selling: each mutation is
//! recorded as an *action* in a client-side [`ActionQueue`]. On reconnect the
//! queue is replayed against the authoritative store one *batch* per
//! [`Domain`], and every action gets a result at its own position.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine knows nothing of files, network or databases
//! - **Closed action set**: wire tags are parsed into per-domain enums, and an
//!   unknown tag is an explicit failure
//! - **Nothing stale is trusted**: stock and wallet decrements are re-checked
//!   against the stored value inside the transaction that writes them
//!
//! ## Core Concepts
//!
//! ### Actions
//!
//! An [`ActionEnvelope`] carries an `actionType` tag, a `data` payload, and
//! optionally an idempotency key and client sequence number.
//! [`Action::parse`] checks the payload against its schema and produces a
//! typed [`Action`].
//!
//! ### Batches
//!
//! [`MemoryStore::sync`] applies a batch under an [`Atomicity`]:
//! - [`Atomicity::PerBatch`] - all or nothing (default)
//! - [`Atomicity::PerAction`] - each action commits on its own
//!
//! The outcome is a [`BatchReport`] of [`ActionResult`]s.
//!
//! ## Quick Start
//!
//! ```rust
//! use pharmsync_engine::{ActionQueue, Atomicity, Domain, MemoryStore};
//! use serde_json::json;
//!
//! // 1. Queue actions at the register
//! let mut queue = ActionQueue::new("till-1");
//! queue.enqueue(Domain::Inventory, "add_item", json!({"name": "Paracetamol", "stock": 100}));
//! queue.enqueue(Domain::Inventory, "update_item", json!({"id": 1, "stock": 80}));
//!
//! // 2. Replay them against the store
//! let mut store = MemoryStore::new();
//! let batch = queue.next_batch(Domain::Inventory, 50);
//! let report = store
//!     .sync(Domain::Inventory, &batch.pending_actions, Atomicity::PerBatch, 1_760_000_000_000)
//!     .unwrap();
//! assert!(report.is_success());
//!
//! // 3. Prune what the store accepted
//! queue.reconcile(Domain::Inventory, &report.results).unwrap();
//! assert!(queue.is_empty());
//! assert_eq!(store.item(1).unwrap().stock, 80);
//! ```

pub mod action;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod payload;
pub mod queue;
pub mod resolver;
pub mod snapshot;
pub mod store;

// Re-export main types at crate root
pub use action::{
    parse_batch, Action, ActionEnvelope, CustomerAction, Domain, InventoryAction, ParsedAction,
    SalesAction, SupplierAction, WholesaleAction,
};
pub use coordinator::{ActionResult, Atomicity, BatchReport, SyncResponse, SyncStatus};
pub use entity::{
    Customer, EntityKind, Item, NewItem, NewSale, NewSaleLine, PaymentMethod, PricedLine, Sale,
    SaleLine, StockPool, Supplier,
};
pub use error::{Error, ErrorKind};
pub use payload::{FieldDef, FieldType, PayloadSchema};
pub use queue::{ActionQueue, QueueState, QueuedAction, ReconcileOutcome, SyncRequest};
pub use resolver::{check_decrement, DecrementTarget, StockDemand};
pub use snapshot::InitialData;
pub use store::MemoryStore;

/// Type aliases for clarity
pub type EntityId = i64;
pub type IdempotencyKey = String;
pub type NodeId = String;
/// Milliseconds since the Unix epoch
pub type Timestamp = u64;
/// Money in minor units
pub type Cents = i64;
