//! Database module for PostgreSQL persistence.

mod actions;
mod batch;
mod pool;
mod rows;

pub use batch::apply_batch;
pub use pool::{create_pool, run_migrations, Pool};
pub use rows::get_initial_data;
