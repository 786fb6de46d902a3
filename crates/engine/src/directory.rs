//! Customer resolution by channel identity.

use std::sync::Arc;

use mostrador_core::domain::customer::CustomerProfile;
use mostrador_core::matching::phone_matches;
use mostrador_store::{CustomerStore, StoreError};

#[derive(Clone)]
pub struct CustomerDirectory {
    customers: Arc<dyn CustomerStore>,
}

impl CustomerDirectory {
    pub fn new(customers: Arc<dyn CustomerStore>) -> Self {
        Self { customers }
    }

    /// Finds the first profile whose stored phone contains `identity`.
    /// `None` is an answer, not an error: callers decide whether an
    /// unresolved customer blocks the operation.
    pub async fn resolve(&self, identity: &str) -> Result<Option<CustomerProfile>, StoreError> {
        let customers = self.customers.list_customers().await?;
        Ok(customers.into_iter().find(|customer| phone_matches(&customer.phone, identity)))
    }
}
