use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerTier;

/// One row of the `Inventario` sheet. The size of an item lives in the
/// `Código` column, so `code` doubles as the size code throughout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub code: String,
    pub brand: String,
    pub product_type: String,
    pub active: bool,
    pub visible_in_sales: bool,
    pub stock_total: i64,
    pub stock_warehouse: Option<String>,
    pub stock_store: Option<String>,
    pub price_retail: Decimal,
    pub price_resale_a: Decimal,
    pub price_resale_b: Decimal,
    pub description: Option<String>,
    pub image: Option<String>,
}

impl Product {
    /// Resale tiers map onto their price columns; everything else, including
    /// customers with no resolved profile, pays the retail price.
    pub fn price_for(&self, tier: CustomerTier) -> Decimal {
        match tier {
            CustomerTier::ResaleA => self.price_resale_a,
            CustomerTier::ResaleB => self.price_resale_b,
            CustomerTier::Retail => self.price_retail,
        }
    }
}

/// A product as surfaced to a customer: priced for their tier, with the
/// image reference already rewritten to a fetchable URL.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProductView {
    pub id: String,
    pub name: String,
    pub brand: String,
    pub product_type: String,
    pub size: String,
    pub stock_total: i64,
    pub stock_warehouse: Option<String>,
    pub stock_store: Option<String>,
    pub price: Decimal,
    pub description: Option<String>,
    pub image_url: Option<String>,
}
