//! Inventory reservation engine: catalog search, customer resolution and a
//! reservation ledger that serializes writes per product.
//!
//! Everything here is transport-agnostic. The agent crate maps these
//! operations onto tool calls; the stores behind the trait objects decide
//! whether data lives in a spreadsheet or in memory.

pub mod catalog;
pub mod directory;
pub mod ledger;
pub mod locks;
pub mod reference;

pub use catalog::{CatalogIndex, StockFilter};
pub use directory::CustomerDirectory;
pub use ledger::{Candidate, ReservationError, ReservationLedger};
pub use locks::ProductLocks;
pub use reference::{format_reference, RandomReferenceSource, ReferenceSource};
