//! Initial data handler - bulk read for cold-starting a register's cache.

use crate::error::Result;
use crate::store::Backend;
use pharmsync_engine::InitialData;

/// Read every cacheable table from `backend`.
pub async fn handle_initial_data(backend: &Backend) -> Result<InitialData> {
    let data = backend.initial_data().await?;
    tracing::debug!(
        inventory = data.inventory.len(),
        customers = data.customers.len(),
        suppliers = data.suppliers.len(),
        wholesale = data.wholesale.len(),
        "Serving initial data"
    );
    Ok(data)
}
