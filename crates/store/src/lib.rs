//! Storage backends for the catalog, the customer directory and the
//! reservation ledger.
//!
//! The authoritative backend is a spreadsheet reached over the Sheets
//! values REST API ([`SheetsStore`]); the in-memory backend exists for
//! tests and local runs. Both speak the same three traits, so everything
//! above this crate is backend-agnostic.

pub mod memory;
pub mod rows;
pub mod sheets;

use async_trait::async_trait;
use thiserror::Error;

use mostrador_core::{CustomerProfile, Product, Reservation, ReservationStatus};

pub use memory::{InMemoryCustomerStore, InMemoryProductStore, InMemoryReservationStore};
pub use rows::{SheetTable, CUSTOMERS_SHEET, PRODUCTS_SHEET, RESERVATIONS_SHEET};
pub use sheets::SheetsStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store API rejected the request with status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("sheet `{sheet}` is missing or has no header row")]
    MissingSheet { sheet: String },
    #[error("sheet `{sheet}` has no `{column}` column")]
    MissingColumn { sheet: String, column: String },
    #[error("no row in sheet `{sheet}` matches `{key}`")]
    RowNotFound { sheet: String, key: String },
    #[error("could not decode store payload: {0}")]
    Decode(String),
}

/// Read and write access to the product catalog.
///
/// `update_stock` addresses a product by its name and size code, the same
/// pair the catalog treats as the product identity.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    async fn update_stock(&self, name: &str, code: &str, stock_total: i64)
        -> Result<(), StoreError>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn list_customers(&self) -> Result<Vec<CustomerProfile>, StoreError>;
}

/// Append-plus-status-update access to the reservation ledger. Reservation
/// rows are never deleted; a cancellation is a status write.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn list_reservations(&self) -> Result<Vec<Reservation>, StoreError>;

    async fn append_reservation(&self, reservation: &Reservation) -> Result<(), StoreError>;

    async fn update_status(
        &self,
        reference: &str,
        status: &ReservationStatus,
    ) -> Result<(), StoreError>;
}
