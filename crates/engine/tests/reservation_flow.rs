//! Whole-ledger flows over the in-memory backend: racing reservations,
//! write failures mid-commit and the reserve/cancel round trip.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use mostrador_core::domain::customer::{CustomerProfile, CustomerTier};
use mostrador_core::domain::product::Product;
use mostrador_core::domain::reservation::{Reservation, ReservationStatus};
use mostrador_engine::{
    CatalogIndex, CustomerDirectory, ReferenceSource, ReservationError, ReservationLedger,
};
use mostrador_store::{
    InMemoryCustomerStore, InMemoryProductStore, InMemoryReservationStore, ProductStore,
    ReservationStore, StoreError,
};

#[tokio::test]
async fn concurrent_reservations_never_oversell() {
    let fx = fixture(vec![product("Bota Texana", "38", 1)], known_customers());

    let (first, second) = tokio::join!(
        fx.ledger.reserve("3515917952", "Bota Texana", Some("38"), 1),
        fx.ledger.reserve("3515160237", "Bota Texana", Some("38"), 1),
    );

    let successes = [&first, &second].iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(successes, 1, "exactly one of the racing reservations may win");

    let loser = if first.is_err() { first } else { second };
    match loser {
        Err(ReservationError::InsufficientStock { requested, available }) => {
            assert_eq!(requested, 1);
            assert_eq!(available, 0);
        }
        other => panic!("expected InsufficientStock for the loser, got {other:?}"),
    }

    let products = fx.products.list_products().await.expect("list should work");
    assert_eq!(products[0].stock_total, 0, "stock must never go negative");

    let rows = fx.reservations.list_reservations().await.expect("list should work");
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn failed_ledger_append_restores_the_decrement() {
    let products = Arc::new(InMemoryProductStore::new(vec![product("Bota Texana", "38", 5)]));
    let customers = Arc::new(InMemoryCustomerStore::new(vec![
        customer("5493515917952", CustomerTier::Retail, "Final"),
    ]));
    let reservations: Arc<dyn ReservationStore> = Arc::new(RejectingReservationStore);

    let ledger = ReservationLedger::new(
        CatalogIndex::new(products.clone(), "http://localhost:3000"),
        CustomerDirectory::new(customers),
        products.clone(),
        reservations,
        Arc::new(SequentialReferenceSource::default()),
    );

    match ledger.reserve("3515917952", "Bota Texana", Some("38"), 2).await {
        Err(ReservationError::Store(StoreError::Api { status, .. })) => assert_eq!(status, 500),
        other => panic!("expected the store failure to surface, got {other:?}"),
    }

    let snapshot = products.list_products().await.expect("list should work");
    assert_eq!(snapshot[0].stock_total, 5, "the decrement must be compensated");
}

#[tokio::test]
async fn reserve_cancel_reserve_round_trip() {
    let fx = fixture(vec![product("Bota Texana", "38", 2)], known_customers());

    let first = fx
        .ledger
        .reserve("3515917952", "Bota Texana 38", None, 2)
        .await
        .expect("reserve should work");
    assert_eq!(stock(&fx).await, 0);

    // With everything reserved the product is out of reach for new
    // reservations but still reports insufficiency, not absence.
    match fx.ledger.reserve("3515160237", "Bota Texana", Some("38"), 1).await {
        Err(ReservationError::InsufficientStock { available, .. }) => assert_eq!(available, 0),
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    let cancelled = fx
        .ledger
        .cancel("3515917952", &first.reference)
        .await
        .expect("cancel should work");
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(stock(&fx).await, 2);

    // A cancelled reservation cannot be cancelled twice.
    match fx.ledger.cancel("3515917952", &first.reference).await {
        Err(ReservationError::InvalidState { status }) => assert_eq!(status, "Cancelada"),
        other => panic!("expected InvalidState, got {other:?}"),
    }

    let second = fx
        .ledger
        .reserve("3515160237", "Bota Texana", Some("38"), 2)
        .await
        .expect("freed stock should be reservable again");
    assert_ne!(second.reference, first.reference);
    assert_eq!(stock(&fx).await, 0);
}

struct Fixture {
    ledger: ReservationLedger,
    products: Arc<InMemoryProductStore>,
    reservations: Arc<InMemoryReservationStore>,
}

fn known_customers() -> Vec<CustomerProfile> {
    vec![
        customer("5493515917952", CustomerTier::ResaleA, "Reventa A"),
        customer("5493515160237", CustomerTier::Retail, "Final"),
    ]
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
        Arc::new(SequentialReferenceSource::default()),
    );

    Fixture { ledger, products: product_store, reservations: reservation_store }
}

async fn stock(fx: &Fixture) -> i64 {
    fx.products.list_products().await.expect("list should work")[0].stock_total
}

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

fn customer(phone: &str, tier: CustomerTier, tier_label: &str) -> CustomerProfile {
    CustomerProfile {
        phone: phone.to_string(),
        first_name: "Ana".to_string(),
        last_name: "Pérez".to_string(),
        nickname: "Anita".to_string(),
        tier,
        tier_label: tier_label.to_string(),
        email: "ana@example.com".to_string(),
        tax_id: String::new(),
    }
}

/// Distinct reference per call, so collisions never get in the way of the
/// flows under test.
#[derive(Default)]
struct SequentialReferenceSource {
    calls: std::sync::atomic::AtomicU32,
}

impl ReferenceSource for SequentialReferenceSource {
    fn next_reference(&self) -> String {
        let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        format!("RES-20250115-T{call:03}")
    }
}

/// Accepts reads, rejects every append.
struct RejectingReservationStore;

#[async_trait]
impl ReservationStore for RejectingReservationStore {
    async fn list_reservations(&self) -> Result<Vec<Reservation>, StoreError> {
        Ok(Vec::new())
    }

    async fn append_reservation(&self, _reservation: &Reservation) -> Result<(), StoreError> {
        Err(StoreError::Api { status: 500, message: "append rejected".to_string() })
    }

    async fn update_status(
        &self,
        _reference: &str,
        _status: &ReservationStatus,
    ) -> Result<(), StoreError> {
        Err(StoreError::Api { status: 500, message: "update rejected".to_string() })
    }
}
