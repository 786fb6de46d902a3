//! Header-driven codec between sheet rows and domain types.
//!
//! Columns are located by header name at read time, never by fixed
//! position, so re-ordering columns in the spreadsheet does not break the
//! backend. Header matching is case-insensitive and ignores surrounding
//! whitespace.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;

use mostrador_core::domain::customer::{CustomerProfile, CustomerTier};
use mostrador_core::domain::product::Product;
use mostrador_core::domain::reservation::{Reservation, ReservationStatus};
use mostrador_core::matching::eq_ci;

use crate::StoreError;

pub const CUSTOMERS_SHEET: &str = "Clientes";
pub const PRODUCTS_SHEET: &str = "Inventario";
pub const RESERVATIONS_SHEET: &str = "Reservas";

/// A fetched sheet: one header row plus zero or more data rows. Data rows
/// may be ragged because the values API drops trailing empty cells.
#[derive(Clone, Debug)]
pub struct SheetTable {
    sheet: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl SheetTable {
    pub fn from_values(sheet: &str, mut values: Vec<Vec<String>>) -> Result<Self, StoreError> {
        if values.is_empty() {
            return Err(StoreError::MissingSheet { sheet: sheet.to_string() });
        }

        let headers = values.remove(0);
        Ok(Self { sheet: sheet.to_string(), headers, rows: values })
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn column(&self, name: &str) -> Result<usize, StoreError> {
        self.headers
            .iter()
            .position(|header| eq_ci(header.trim(), name.trim()))
            .ok_or_else(|| StoreError::MissingColumn {
                sheet: self.sheet.clone(),
                column: name.to_string(),
            })
    }

    /// Cell access that treats missing trailing cells as empty strings.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }
}

pub fn decode_products(table: &SheetTable) -> Result<Vec<Product>, StoreError> {
    let id = table.column("Id")?;
    let name = table.column("Nombre")?;
    let code = table.column("Código")?;
    let brand = table.column("Proveedor")?;
    let product_type = table.column("Tipo de Producto")?;
    let active = table.column("Activo")?;
    let visible = table.column("Mostrar en Ventas")?;
    let stock_total = table.column("Stock Total")?;
    let stock_warehouse = table.column("Galpon")?;
    let stock_store = table.column("Negocio")?;
    let price_retail = table.column("Precio de Venta")?;
    let price_resale_a = table.column("Reventa A")?;
    let price_resale_b = table.column("Reventa B")?;
    let description = table.column("Descripción")?;
    let image = table.column("Imagen")?;

    let products = (0..table.rows().len())
        .map(|row| Product {
            id: table.cell(row, id).trim().to_string(),
            name: table.cell(row, name).trim().to_string(),
            code: table.cell(row, code).trim().to_string(),
            brand: table.cell(row, brand).trim().to_string(),
            product_type: table.cell(row, product_type).trim().to_string(),
            active: parse_flag(table.cell(row, active)),
            visible_in_sales: parse_flag(table.cell(row, visible)),
            stock_total: parse_int(table.cell(row, stock_total)),
            stock_warehouse: optional(table.cell(row, stock_warehouse)),
            stock_store: optional(table.cell(row, stock_store)),
            price_retail: parse_decimal(table.cell(row, price_retail)),
            price_resale_a: parse_decimal(table.cell(row, price_resale_a)),
            price_resale_b: parse_decimal(table.cell(row, price_resale_b)),
            description: optional(table.cell(row, description)),
            image: optional(table.cell(row, image)),
        })
        .collect();

    Ok(products)
}

pub fn decode_customers(table: &SheetTable) -> Result<Vec<CustomerProfile>, StoreError> {
    let phone = table.column("Celular")?;
    let first_name = table.column("Nombre")?;
    let last_name = table.column("Apellido")?;
    let nickname = table.column("Apodo")?;
    let tier = table.column("Tipo Cliente")?;
    let email = table.column("Mail")?;
    let tax_id = table.column("CUIT")?;

    let customers = (0..table.rows().len())
        .map(|row| {
            let tier_label = table.cell(row, tier).trim().to_string();
            CustomerProfile {
                phone: table.cell(row, phone).trim().to_string(),
                first_name: table.cell(row, first_name).trim().to_string(),
                last_name: table.cell(row, last_name).trim().to_string(),
                nickname: table.cell(row, nickname).trim().to_string(),
                tier: CustomerTier::from_label(&tier_label),
                tier_label,
                email: table.cell(row, email).trim().to_string(),
                tax_id: table.cell(row, tax_id).trim().to_string(),
            }
        })
        .collect();

    Ok(customers)
}

pub fn decode_reservations(table: &SheetTable) -> Result<Vec<Reservation>, StoreError> {
    let created_at = table.column("Fecha")?;
    let customer_name = table.column("Cliente")?;
    let phone = table.column("Telefono")?;
    let email = table.column("Email")?;
    let tax_id = table.column("CUIT")?;
    let total_price = table.column("Precio")?;
    let reference = table.column("Reference")?;
    let product_name = table.column("Producto")?;
    let size = table.column("Medidas")?;
    let quantity = table.column("Cantidad")?;
    let status = table.column("Status")?;

    let reservations = (0..table.rows().len())
        .map(|row| {
            let quantity = parse_quantity(table.cell(row, quantity));
            let total = parse_decimal(table.cell(row, total_price));
            // The sheet stores only the committed total; the per-unit price
            // is derived for display purposes.
            let unit_price =
                if quantity > 0 { total / Decimal::from(quantity) } else { total };

            Reservation {
                reference: table.cell(row, reference).trim().to_string(),
                customer_name: table.cell(row, customer_name).trim().to_string(),
                phone: table.cell(row, phone).trim().to_string(),
                email: table.cell(row, email).trim().to_string(),
                tax_id: table.cell(row, tax_id).trim().to_string(),
                product_name: table.cell(row, product_name).trim().to_string(),
                size: table.cell(row, size).trim().to_string(),
                quantity,
                unit_price,
                total_price: total,
                status: ReservationStatus::from_sheet_value(table.cell(row, status)),
                created_at: parse_timestamp(table.cell(row, created_at)),
            }
        })
        .collect();

    Ok(reservations)
}

/// Encodes a reservation in the column order of the live header row, so an
/// append lines up even after the sheet has been re-ordered.
pub fn reservation_row(
    table: &SheetTable,
    reservation: &Reservation,
) -> Result<Vec<String>, StoreError> {
    let mut row = vec![String::new(); table.headers().len()];

    let fields: [(&str, String); 11] = [
        (
            "Fecha",
            reservation.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        ),
        ("Cliente", reservation.customer_name.clone()),
        ("Telefono", reservation.phone.clone()),
        ("Email", reservation.email.clone()),
        ("CUIT", reservation.tax_id.clone()),
        ("Precio", reservation.total_price.to_string()),
        ("Reference", reservation.reference.clone()),
        ("Producto", reservation.product_name.clone()),
        ("Medidas", reservation.size.clone()),
        ("Cantidad", reservation.quantity.to_string()),
        ("Status", reservation.status.as_sheet_value().to_string()),
    ];

    for (column, value) in fields {
        let index = table.column(column)?;
        row[index] = value;
    }

    Ok(row)
}

pub fn find_product_row(
    table: &SheetTable,
    name: &str,
    code: &str,
) -> Result<Option<usize>, StoreError> {
    let name_column = table.column("Nombre")?;
    let code_column = table.column("Código")?;

    Ok((0..table.rows().len()).find(|&row| {
        eq_ci(table.cell(row, name_column).trim(), name.trim())
            && eq_ci(table.cell(row, code_column).trim(), code.trim())
    }))
}

pub fn find_reservation_row(
    table: &SheetTable,
    reference: &str,
) -> Result<Option<usize>, StoreError> {
    let reference_column = table.column("Reference")?;

    Ok((0..table.rows().len())
        .find(|&row| table.cell(row, reference_column).trim() == reference.trim()))
}

/// Zero-based column index to its A1 letters: 0 is A, 25 is Z, 26 is AA.
pub fn a1_column(index: usize) -> String {
    let mut remaining = index + 1;
    let mut reversed = String::new();

    while remaining > 0 {
        let digit = ((remaining - 1) % 26) as u8;
        reversed.push((b'A' + digit) as char);
        remaining = (remaining - 1) / 26;
    }

    reversed.chars().rev().collect()
}

/// A1 range for a single cell of a data row. Data row 0 is sheet row 2;
/// row 1 holds the headers.
pub fn data_cell_range(sheet: &str, column: usize, data_row: usize) -> String {
    format!("{sheet}!{}{}", a1_column(column), data_row + 2)
}

// `Si` in any case means true; everything else, including blank, is false.
fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("si")
}

fn parse_decimal(value: &str) -> Decimal {
    value.trim().parse().unwrap_or(Decimal::ZERO)
}

fn parse_int(value: &str) -> i64 {
    value.trim().parse().unwrap_or(0)
}

fn parse_quantity(value: &str) -> u32 {
    value.trim().parse().unwrap_or(0)
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    // Unparseable timestamps collapse to the epoch rather than poisoning
    // the whole ledger read.
    DateTime::parse_from_rfc3339(value.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}
