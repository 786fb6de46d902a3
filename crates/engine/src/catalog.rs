//! Catalog search over the product store.

use std::sync::Arc;

use mostrador_core::domain::customer::CustomerTier;
use mostrador_core::domain::product::{Product, ProductView};
use mostrador_core::matching::{contains_ci, eq_ci};
use mostrador_store::{ProductStore, StoreError};

/// Whether a search may return products whose total stock is zero or
/// negative. Listing views hide them; price and reservation paths must see
/// them, otherwise "out of stock" is indistinguishable from "no such
/// product".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StockFilter {
    InStockOnly,
    IncludeOutOfStock,
}

#[derive(Clone)]
pub struct CatalogIndex {
    products: Arc<dyn ProductStore>,
    public_base_url: String,
}

impl CatalogIndex {
    pub fn new(products: Arc<dyn ProductStore>, public_base_url: impl Into<String>) -> Self {
        Self {
            products,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Case-insensitive substring search of `term` across the name, size
    /// code, brand and product type columns, optionally narrowed to an
    /// exact size code. Only products with both visibility flags set
    /// participate.
    pub async fn search(
        &self,
        term: &str,
        size: Option<&str>,
        stock: StockFilter,
    ) -> Result<Vec<Product>, StoreError> {
        let products = self.products.list_products().await?;

        Ok(products
            .into_iter()
            .filter(|product| {
                if !product.active || !product.visible_in_sales {
                    return false;
                }
                if stock == StockFilter::InStockOnly && product.stock_total <= 0 {
                    return false;
                }

                let term_matches = contains_ci(&product.name, term)
                    || contains_ci(&product.code, term)
                    || contains_ci(&product.brand, term)
                    || contains_ci(&product.product_type, term);
                if !term_matches {
                    return false;
                }

                match size {
                    Some(size) => eq_ci(&product.code, size),
                    None => true,
                }
            })
            .collect())
    }

    /// A product as a customer sees it: priced for their tier, image
    /// reference rewritten to a fetchable URL.
    pub fn view(&self, product: &Product, tier: CustomerTier) -> ProductView {
        ProductView {
            id: product.id.clone(),
            name: product.name.clone(),
            brand: product.brand.clone(),
            product_type: product.product_type.clone(),
            size: product.code.clone(),
            stock_total: product.stock_total,
            stock_warehouse: product.stock_warehouse.clone(),
            stock_store: product.stock_store.clone(),
            price: product.price_for(tier),
            description: product.description.clone(),
            image_url: product.image.as_deref().map(|image| self.image_url(image)),
        }
    }

    // Absolute references pass through untouched; anything else is treated
    // as a completion-service file id served from our own image route.
    fn image_url(&self, image: &str) -> String {
        if image.starts_with("http") {
            image.to_string()
        } else {
            format!("{}/images/{image}", self.public_base_url)
        }
    }
}
