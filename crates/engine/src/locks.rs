//! Per-product async locks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per product identity, created on first use. The key is
/// the case-folded `name|size` pair, the same identity the stock update
/// addresses. Guards are owned so they can be held across the await points
/// of a reservation.
#[derive(Debug, Default)]
pub struct ProductLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ProductLocks {
    pub async fn acquire(&self, name: &str, size: &str) -> OwnedMutexGuard<()> {
        let key = format!("{}|{}", name.to_lowercase(), size.to_lowercase());

        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(key).or_default())
        };

        lock.lock_owned().await
    }
}
