//! In-memory store backend for tests and local runs.

use tokio::sync::RwLock;

use async_trait::async_trait;

use mostrador_core::matching::eq_ci;
use mostrador_core::{CustomerProfile, Product, Reservation, ReservationStatus};

use crate::{CustomerStore, ProductStore, ReservationStore, StoreError, PRODUCTS_SHEET,
    RESERVATIONS_SHEET};

#[derive(Debug, Default)]
pub struct InMemoryProductStore {
    products: RwLock<Vec<Product>>,
}

impl InMemoryProductStore {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products: RwLock::new(products) }
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        Ok(self.products.read().await.clone())
    }

    async fn update_stock(
        &self,
        name: &str,
        code: &str,
        stock_total: i64,
    ) -> Result<(), StoreError> {
        let mut products = self.products.write().await;
        let product = products
            .iter_mut()
            .find(|product| eq_ci(&product.name, name) && eq_ci(&product.code, code))
            .ok_or_else(|| StoreError::RowNotFound {
                sheet: PRODUCTS_SHEET.to_string(),
                key: format!("{name}|{code}"),
            })?;

        product.stock_total = stock_total;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCustomerStore {
    customers: RwLock<Vec<CustomerProfile>>,
}

impl InMemoryCustomerStore {
    pub fn new(customers: Vec<CustomerProfile>) -> Self {
        Self { customers: RwLock::new(customers) }
    }
}

#[async_trait]
impl CustomerStore for InMemoryCustomerStore {
    async fn list_customers(&self) -> Result<Vec<CustomerProfile>, StoreError> {
        Ok(self.customers.read().await.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryReservationStore {
    reservations: RwLock<Vec<Reservation>>,
}

impl InMemoryReservationStore {
    pub fn new(reservations: Vec<Reservation>) -> Self {
        Self { reservations: RwLock::new(reservations) }
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn list_reservations(&self) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.reservations.read().await.clone())
    }

    async fn append_reservation(&self, reservation: &Reservation) -> Result<(), StoreError> {
        self.reservations.write().await.push(reservation.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        reference: &str,
        status: &ReservationStatus,
    ) -> Result<(), StoreError> {
        let mut reservations = self.reservations.write().await;
        let reservation = reservations
            .iter_mut()
            .find(|reservation| reservation.reference == reference)
            .ok_or_else(|| StoreError::RowNotFound {
                sheet: RESERVATIONS_SHEET.to_string(),
                key: reference.to_string(),
            })?;

        reservation.status = status.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use mostrador_core::{Product, Reservation, ReservationStatus};

    use crate::{ProductStore, ReservationStore, StoreError};

    use super::{InMemoryProductStore, InMemoryReservationStore};

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

    fn reservation(reference: &str) -> Reservation {
        Reservation {
            reference: reference.to_string(),
            customer_name: "Ana Pérez".to_string(),
            phone: "5493515917952".to_string(),
            email: String::new(),
            tax_id: "No especificado".to_string(),
            product_name: "Bota Texana".to_string(),
            size: "38".to_string(),
            quantity: 1,
            unit_price: Decimal::new(100, 0),
            total_price: Decimal::new(100, 0),
            status: ReservationStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn stock_updates_match_by_name_and_code() {
        let store = InMemoryProductStore::new(vec![
            product("Bota Texana", "38", 5),
            product("Bota Texana", "39", 2),
        ]);

        store.update_stock("bota texana", "39", 1).await.expect("update should work");

        let products = store.list_products().await.expect("list should work");
        assert_eq!(products[0].stock_total, 5);
        assert_eq!(products[1].stock_total, 1);
    }

    #[tokio::test]
    async fn missing_product_row_is_reported() {
        let store = InMemoryProductStore::new(vec![product("Bota Texana", "38", 5)]);

        match store.update_stock("Bota Texana", "44", 1).await {
            Err(StoreError::RowNotFound { key, .. }) => assert_eq!(key, "Bota Texana|44"),
            other => panic!("expected RowNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn appended_reservations_are_listed_and_updatable() {
        let store = InMemoryReservationStore::default();
        store
            .append_reservation(&reservation("RES-20250115-A1B2"))
            .await
            .expect("append should work");

        store
            .update_status("RES-20250115-A1B2", &ReservationStatus::Cancelled)
            .await
            .expect("update should work");

        let reservations = store.list_reservations().await.expect("list should work");
        assert_eq!(reservations.len(), 1);
        assert_eq!(reservations[0].status, ReservationStatus::Cancelled);
    }
}
