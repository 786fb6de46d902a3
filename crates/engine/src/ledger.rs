//! The reservation ledger: the only writer of stock and reservation rows.
//!
//! Every mutation happens under the per-product lock, against a fresh read
//! of the product row taken after the lock was acquired. The stock seen
//! during disambiguation is advisory; only the locked re-read decides.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use mostrador_core::domain::product::Product;
use mostrador_core::domain::reservation::{Reservation, ReservationStatus};
use mostrador_core::matching::{eq_ci, phone_matches, split_trailing_size};
use mostrador_store::{ProductStore, ReservationStore, StoreError};

use crate::catalog::{CatalogIndex, StockFilter};
use crate::directory::CustomerDirectory;
use crate::locks::ProductLocks;
use crate::reference::ReferenceSource;

const REFERENCE_ATTEMPTS: u32 = 32;

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("no product matches the request")]
    ProductNotFound,
    #[error("{} products match the request", candidates.len())]
    Ambiguous { candidates: Vec<Candidate> },
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: i64 },
    #[error("no customer profile matches the phone")]
    CustomerNotFound,
    #[error("no reservation matches the reference for this customer")]
    ReservationNotFound,
    #[error("reservation status `{status}` does not allow cancellation")]
    InvalidState { status: String },
    #[error("no unused reference found after {attempts} attempts")]
    ReferenceGeneration { attempts: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One entry of the disambiguation list returned when a request matches
/// several products, priced for the requesting customer's tier.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Candidate {
    pub name: String,
    pub size: String,
    pub brand: String,
    pub stock: i64,
    pub price: Decimal,
}

pub struct ReservationLedger {
    catalog: CatalogIndex,
    directory: CustomerDirectory,
    products: Arc<dyn ProductStore>,
    reservations: Arc<dyn ReservationStore>,
    references: Arc<dyn ReferenceSource>,
    locks: ProductLocks,
}

impl ReservationLedger {
    pub fn new(
        catalog: CatalogIndex,
        directory: CustomerDirectory,
        products: Arc<dyn ProductStore>,
        reservations: Arc<dyn ReservationStore>,
        references: Arc<dyn ReferenceSource>,
    ) -> Self {
        Self {
            catalog,
            directory,
            products,
            reservations,
            references,
            locks: ProductLocks::default(),
        }
    }

    /// Reserves `quantity` units of the single product matching `query` and
    /// `size` for the customer whose stored phone contains `phone`.
    ///
    /// When `size` is absent, the trailing token of a multi-word query is
    /// taken as an implicit size. Zero or many matches fail before anything
    /// is written; the stock check, the decrement and the ledger append all
    /// happen under the product lock.
    pub async fn reserve(
        &self,
        phone: &str,
        query: &str,
        size: Option<&str>,
        quantity: u32,
    ) -> Result<Reservation, ReservationError> {
        let (name, size) = match size {
            Some(size) if !size.trim().is_empty() => {
                (query.trim().to_string(), Some(size.trim().to_string()))
            }
            _ => split_trailing_size(query),
        };

        let profile = self.directory.resolve(phone).await?;
        let tier = profile.as_ref().map(|profile| profile.tier).unwrap_or_default();

        let candidates = self
            .catalog
            .search(&name, size.as_deref(), StockFilter::IncludeOutOfStock)
            .await?;

        let product = match candidates.as_slice() {
            [] => return Err(ReservationError::ProductNotFound),
            [only] => only.clone(),
            many => {
                let candidates = many
                    .iter()
                    .map(|product| Candidate {
                        name: product.name.clone(),
                        size: product.code.clone(),
                        brand: product.brand.clone(),
                        stock: product.stock_total,
                        price: product.price_for(tier),
                    })
                    .collect();
                return Err(ReservationError::Ambiguous { candidates });
            }
        };

        let _guard = self.locks.acquire(&product.name, &product.code).await;

        let fresh = self
            .fresh_product(&product.name, &product.code)
            .await?
            .ok_or(ReservationError::ProductNotFound)?;

        if fresh.stock_total < i64::from(quantity) {
            return Err(ReservationError::InsufficientStock {
                requested: quantity,
                available: fresh.stock_total,
            });
        }

        let profile = profile.ok_or(ReservationError::CustomerNotFound)?;
        let reference = self.unused_reference().await?;

        let unit_price = fresh.price_for(tier);
        let total_price = unit_price * Decimal::from(quantity);
        let new_stock = fresh.stock_total - i64::from(quantity);

        self.products.update_stock(&fresh.name, &fresh.code, new_stock).await?;

        let tax_id = profile.tax_id.trim();
        let tax_id = if tax_id.is_empty() {
            "No especificado".to_string()
        } else {
            tax_id.to_string()
        };

        let reservation = Reservation {
            reference,
            customer_name: profile.full_name(),
            phone: phone.to_string(),
            email: profile.email.clone(),
            tax_id,
            product_name: fresh.name.clone(),
            size: fresh.code.clone(),
            quantity,
            unit_price,
            total_price,
            status: ReservationStatus::Pending,
            created_at: Utc::now(),
        };

        if let Err(error) = self.reservations.append_reservation(&reservation).await {
            // The decrement landed but the ledger row did not; put the
            // stock back so the unit is not stranded.
            if let Err(rollback) =
                self.products.update_stock(&fresh.name, &fresh.code, fresh.stock_total).await
            {
                warn!(
                    event_name = "ledger.reserve.rollback_failed",
                    product = %fresh.name,
                    size = %fresh.code,
                    error = %rollback,
                );
            }
            return Err(error.into());
        }

        info!(
            event_name = "ledger.reserve.committed",
            reference = %reservation.reference,
            product = %reservation.product_name,
            size = %reservation.size,
            quantity,
        );

        Ok(reservation)
    }

    /// Cancels a pending reservation and restocks its units. Only the
    /// customer whose phone matches may cancel; a missing reservation and
    /// someone else's reservation are indistinguishable in the result.
    pub async fn cancel(
        &self,
        phone: &str,
        reference: &str,
    ) -> Result<Reservation, ReservationError> {
        let owned = self
            .owned_reservation(phone, reference)
            .await?
            .ok_or(ReservationError::ReservationNotFound)?;

        let _guard = self.locks.acquire(&owned.product_name, &owned.size).await;

        // Fresh read under the lock; a concurrent cancel of the same
        // reference must see the status the first one wrote.
        let reservation = self
            .owned_reservation(phone, reference)
            .await?
            .ok_or(ReservationError::ReservationNotFound)?;

        if !reservation.can_transition_to(&ReservationStatus::Cancelled) {
            return Err(ReservationError::InvalidState {
                status: reservation.status.as_sheet_value().to_string(),
            });
        }

        // The product row may have been renamed or removed since the
        // reservation was written; the restock is skipped but the
        // cancellation still proceeds.
        let product = self
            .fresh_product(&reservation.product_name, &reservation.size)
            .await?;

        if let Some(ref product) = product {
            let restocked = product.stock_total + i64::from(reservation.quantity);
            self.products.update_stock(&product.name, &product.code, restocked).await?;
        }

        if let Err(error) =
            self.reservations.update_status(reference, &ReservationStatus::Cancelled).await
        {
            if let Some(ref product) = product {
                if let Err(rollback) = self
                    .products
                    .update_stock(&product.name, &product.code, product.stock_total)
                    .await
                {
                    warn!(
                        event_name = "ledger.cancel.rollback_failed",
                        reference,
                        product = %product.name,
                        error = %rollback,
                    );
                }
            }
            return Err(error.into());
        }

        info!(
            event_name = "ledger.cancel.committed",
            reference,
            product = %reservation.product_name,
            quantity = reservation.quantity,
        );

        let mut cancelled = reservation;
        cancelled.status = ReservationStatus::Cancelled;
        Ok(cancelled)
    }

    async fn fresh_product(
        &self,
        name: &str,
        code: &str,
    ) -> Result<Option<Product>, ReservationError> {
        let products = self.products.list_products().await?;
        Ok(products
            .into_iter()
            .find(|product| eq_ci(&product.name, name) && eq_ci(&product.code, code)))
    }

    async fn owned_reservation(
        &self,
        phone: &str,
        reference: &str,
    ) -> Result<Option<Reservation>, ReservationError> {
        let reservations = self.reservations.list_reservations().await?;
        Ok(reservations.into_iter().find(|reservation| {
            reservation.reference == reference && phone_matches(&reservation.phone, phone)
        }))
    }

    async fn unused_reference(&self) -> Result<String, ReservationError> {
        let existing: HashSet<String> = self
            .reservations
            .list_reservations()
            .await?
            .into_iter()
            .map(|reservation| reservation.reference)
            .collect();

        for _ in 0..REFERENCE_ATTEMPTS {
            let candidate = self.references.next_reference();
            if !existing.contains(&candidate) {
                return Ok(candidate);
            }
        }

        Err(ReservationError::ReferenceGeneration { attempts: REFERENCE_ATTEMPTS })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use mostrador_core::domain::customer::{CustomerProfile, CustomerTier};
    use mostrador_core::domain::product::Product;
    use mostrador_core::domain::reservation::ReservationStatus;
    use mostrador_store::{
        InMemoryCustomerStore, InMemoryProductStore, InMemoryReservationStore, ProductStore,
        ReservationStore,
    };

    use crate::catalog::CatalogIndex;
    use crate::directory::CustomerDirectory;
    use crate::reference::{ReferenceSource, StaticReferenceSource};

    use super::{ReservationError, ReservationLedger};

    fn product(name: &str, code: &str, stock: i64) -> Product {
        Product {
            id: "1".to_string(),
            name: name.to_string(),
            code: code.to_string(),
            brand: "Acme".to_string(),
            product_type: "Calzado".to_string(),
            active: true,
            visible_in_sales: true,
            stock_total: stock,
            stock_warehouse: None,
            stock_store: None,
            price_retail: Decimal::new(100, 0),
            price_resale_a: Decimal::new(80, 0),
            price_resale_b: Decimal::new(90, 0),
            description: None,
            image: None,
        }
    }

    fn customer(phone: &str) -> CustomerProfile {
        CustomerProfile {
            phone: phone.to_string(),
            first_name: "Ana".to_string(),
            last_name: "Pérez".to_string(),
            nickname: "Anita".to_string(),
            tier: CustomerTier::ResaleA,
            tier_label: "Reventa A".to_string(),
            email: "ana@example.com".to_string(),
            tax_id: String::new(),
        }
    }

    struct Fixture {
        ledger: ReservationLedger,
        products: Arc<InMemoryProductStore>,
        reservations: Arc<InMemoryReservationStore>,
    }

    fn fixture(products: Vec<Product>, customers: Vec<CustomerProfile>) -> Fixture {
        let product_store = Arc::new(InMemoryProductStore::new(products));
        let customer_store = Arc::new(InMemoryCustomerStore::new(customers));
        let reservation_store = Arc::new(InMemoryReservationStore::default());

        let ledger = ReservationLedger::new(
            CatalogIndex::new(product_store.clone(), "http://localhost:3000"),
            CustomerDirectory::new(customer_store),
            product_store.clone(),
            reservation_store.clone(),
            Arc::new(StaticReferenceSource::new("RES-20250115-A1B2")),
        );

        Fixture { ledger, products: product_store, reservations: reservation_store }
    }

    #[tokio::test]
    async fn reserve_commits_stock_and_ledger_row_at_tier_price() {
        let fx = fixture(
            vec![product("Bota Texana", "38", 5)],
            vec![customer("5493515917952")],
        );

        let reservation = fx
            .ledger
            .reserve("3515917952", "Bota Texana", Some("38"), 2)
            .await
            .expect("reserve should work");

        assert_eq!(reservation.reference, "RES-20250115-A1B2");
        assert_eq!(reservation.customer_name, "Ana Pérez");
        assert_eq!(reservation.unit_price, Decimal::new(80, 0));
        assert_eq!(reservation.total_price, Decimal::new(160, 0));
        assert_eq!(reservation.tax_id, "No especificado");
        assert_eq!(reservation.status, ReservationStatus::Pending);

        let products = fx.products.list_products().await.expect("list should work");
        assert_eq!(products[0].stock_total, 3);

        let rows = fx.reservations.list_reservations().await.expect("list should work");
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn trailing_token_of_the_query_acts_as_size() {
        let fx = fixture(
            vec![product("Bota Texana", "38", 5), product("Bota Texana", "39", 5)],
            vec![customer("3515917952")],
        );

        let reservation = fx
            .ledger
            .reserve("3515917952", "Bota Texana 39", None, 1)
            .await
            .expect("reserve should work");

        assert_eq!(reservation.size, "39");
    }

    #[tokio::test]
    async fn ambiguous_requests_list_candidates_and_write_nothing() {
        let fx = fixture(
            vec![product("Bota Texana", "38", 5), product("Bota Texana", "39", 2)],
            vec![customer("3515917952")],
        );

        match fx.ledger.reserve("3515917952", "Bota", None, 1).await {
            Err(ReservationError::Ambiguous { candidates }) => {
                assert_eq!(candidates.len(), 2);
                // Priced for the resale tier of the caller.
                assert!(candidates.iter().all(|c| c.price == Decimal::new(80, 0)));
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }

        let products = fx.products.list_products().await.expect("list should work");
        assert_eq!(products[0].stock_total, 5);
        assert!(fx.reservations.list_reservations().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn zero_stock_reports_insufficiency_not_absence() {
        let fx = fixture(vec![product("Bota Texana", "38", 0)], vec![customer("3515917952")]);

        match fx.ledger.reserve("3515917952", "Bota Texana", Some("38"), 1).await {
            Err(ReservationError::InsufficientStock { requested, available }) => {
                assert_eq!(requested, 1);
                assert_eq!(available, 0);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_customers_cannot_reserve() {
        let fx = fixture(vec![product("Bota Texana", "38", 5)], vec![customer("3515917952")]);

        match fx.ledger.reserve("3510000000", "Bota Texana", Some("38"), 1).await {
            Err(ReservationError::CustomerNotFound) => {}
            other => panic!("expected CustomerNotFound, got {other:?}"),
        }

        let products = fx.products.list_products().await.expect("list should work");
        assert_eq!(products[0].stock_total, 5);
    }

    #[tokio::test]
    async fn cancel_restocks_and_marks_cancelled() {
        let fx = fixture(vec![product("Bota Texana", "38", 5)], vec![customer("3515917952")]);

        let reservation = fx
            .ledger
            .reserve("3515917952", "Bota Texana", Some("38"), 2)
            .await
            .expect("reserve should work");

        let cancelled = fx
            .ledger
            .cancel("3515917952", &reservation.reference)
            .await
            .expect("cancel should work");
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);

        let products = fx.products.list_products().await.expect("list should work");
        assert_eq!(products[0].stock_total, 5);

        let rows = fx.reservations.list_reservations().await.expect("list should work");
        assert_eq!(rows[0].status, ReservationStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_hides_reservations_of_other_customers() {
        let fx = fixture(vec![product("Bota Texana", "38", 5)], vec![customer("3515917952")]);

        let reservation = fx
            .ledger
            .reserve("3515917952", "Bota Texana", Some("38"), 1)
            .await
            .expect("reserve should work");

        match fx.ledger.cancel("3515160237", &reservation.reference).await {
            Err(ReservationError::ReservationNotFound) => {}
            other => panic!("expected ReservationNotFound, got {other:?}"),
        }

        match fx.ledger.cancel("3515917952", "RES-20250101-ZZZZ").await {
            Err(ReservationError::ReservationNotFound) => {}
            other => panic!("expected ReservationNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_rejects_non_pending_states() {
        let fx = fixture(vec![product("Bota Texana", "38", 5)], vec![customer("3515917952")]);

        let reservation = fx
            .ledger
            .reserve("3515917952", "Bota Texana", Some("38"), 1)
            .await
            .expect("reserve should work");

        fx.reservations
            .update_status(&reservation.reference, &ReservationStatus::Other("Entregada".into()))
            .await
            .expect("status update should work");

        match fx.ledger.cancel("3515917952", &reservation.reference).await {
            Err(ReservationError::InvalidState { status }) => assert_eq!(status, "Entregada"),
            other => panic!("expected InvalidState, got {other:?}"),
        }

        // Stock was not touched by the rejected cancel.
        let products = fx.products.list_products().await.expect("list should work");
        assert_eq!(products[0].stock_total, 4);
    }

    #[tokio::test]
    async fn reference_collisions_exhaust_into_a_typed_error() {
        let fx = fixture(vec![product("Bota Texana", "38", 5)], vec![customer("3515917952")]);

        fx.ledger
            .reserve("3515917952", "Bota Texana", Some("38"), 1)
            .await
            .expect("first reserve should work");

        // The static source now only produces the reference that is taken.
        match fx.ledger.reserve("3515917952", "Bota Texana", Some("38"), 1).await {
            Err(ReservationError::ReferenceGeneration { attempts }) => assert_eq!(attempts, 32),
            other => panic!("expected ReferenceGeneration, got {other:?}"),
        }

        // The failed attempt must not leak a stock decrement.
        let products = fx.products.list_products().await.expect("list should work");
        assert_eq!(products[0].stock_total, 4);
    }

    #[tokio::test]
    async fn references_rotate_until_unused() {
        let fx = {
            let product_store = Arc::new(InMemoryProductStore::new(vec![product(
                "Bota Texana",
                "38",
                5,
            )]));
            let customer_store =
                Arc::new(InMemoryCustomerStore::new(vec![customer("3515917952")]));
            let reservation_store = Arc::new(InMemoryReservationStore::default());
            let rotating: Arc<dyn ReferenceSource> = Arc::new(RotatingSource::default());

            Fixture {
                ledger: ReservationLedger::new(
                    CatalogIndex::new(product_store.clone(), "http://localhost:3000"),
                    CustomerDirectory::new(customer_store),
                    product_store.clone(),
                    reservation_store.clone(),
                    rotating,
                ),
                products: product_store,
                reservations: reservation_store,
            }
        };

        let first = fx
            .ledger
            .reserve("3515917952", "Bota Texana", Some("38"), 1)
            .await
            .expect("reserve should work");
        let second = fx
            .ledger
            .reserve("3515917952", "Bota Texana", Some("38"), 1)
            .await
            .expect("reserve should retry past the collision");

        assert_eq!(first.reference, "RES-20250115-AAAA");
        assert_eq!(second.reference, "RES-20250115-BBBB");
    }

    #[derive(Default)]
    struct RotatingSource {
        calls: std::sync::atomic::AtomicU32,
    }

    impl ReferenceSource for RotatingSource {
        fn next_reference(&self) -> String {
            let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            // Second reservation draws AAAA first (taken), then BBBB.
            match call {
                0 | 1 => "RES-20250115-AAAA".to_string(),
                _ => "RES-20250115-BBBB".to_string(),
            }
        }
    }
}
