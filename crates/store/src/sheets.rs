//! Spreadsheet backend over the Sheets values REST API.
//!
//! Three endpoints cover everything the stores need: `GET values/{range}`
//! for whole-sheet reads, `PUT values/{range}` for single-cell updates and
//! `POST values/{sheet}:append` for ledger appends. Writes address cells in
//! A1 notation computed from the live header row.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use mostrador_core::{CustomerProfile, Product, Reservation, ReservationStatus};

use crate::rows::{
    self, data_cell_range, SheetTable, CUSTOMERS_SHEET, PRODUCTS_SHEET, RESERVATIONS_SHEET,
};
use crate::{CustomerStore, ProductStore, ReservationStore, StoreError};

pub struct SheetsStore {
    client: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    api_token: SecretString,
}

impl SheetsStore {
    pub fn new(
        base_url: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        api_token: SecretString,
        request_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            api_token,
        })
    }

    fn values_url(&self, range: &str) -> String {
        format!("{}/spreadsheets/{}/values/{range}", self.base_url, self.spreadsheet_id)
    }

    async fn fetch_table(&self, sheet: &str) -> Result<SheetTable, StoreError> {
        let response = self
            .client
            .get(self.values_url(sheet))
            .bearer_auth(self.api_token.expose_secret())
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let payload: ValuesResponse = response.json().await?;
        let values = payload
            .values
            .unwrap_or_default()
            .into_iter()
            .map(|row| row.into_iter().map(coerce_cell).collect())
            .collect();

        let table = SheetTable::from_values(sheet, values)?;
        debug!(event_name = "store.sheets.fetched", sheet, rows = table.rows().len());
        Ok(table)
    }

    async fn update_cell(&self, range: &str, value: &str) -> Result<(), StoreError> {
        let url = format!("{}?valueInputOption=RAW", self.values_url(range));
        let response = self
            .client
            .put(url)
            .bearer_auth(self.api_token.expose_secret())
            .json(&json!({ "range": range, "values": [[value]] }))
            .send()
            .await?;
        ensure_success(response).await?;

        debug!(event_name = "store.sheets.cell_updated", range);
        Ok(())
    }

    async fn append_row(&self, sheet: &str, row: Vec<String>) -> Result<(), StoreError> {
        let url = format!("{}:append?valueInputOption=RAW", self.values_url(sheet));
        let response = self
            .client
            .post(url)
            .bearer_auth(self.api_token.expose_secret())
            .json(&json!({ "values": [row] }))
            .send()
            .await?;
        ensure_success(response).await?;

        debug!(event_name = "store.sheets.row_appended", sheet);
        Ok(())
    }
}

#[async_trait]
impl ProductStore for SheetsStore {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let table = self.fetch_table(PRODUCTS_SHEET).await?;
        rows::decode_products(&table)
    }

    async fn update_stock(
        &self,
        name: &str,
        code: &str,
        stock_total: i64,
    ) -> Result<(), StoreError> {
        let table = self.fetch_table(PRODUCTS_SHEET).await?;
        let row = rows::find_product_row(&table, name, code)?.ok_or_else(|| {
            StoreError::RowNotFound {
                sheet: PRODUCTS_SHEET.to_string(),
                key: format!("{name}|{code}"),
            }
        })?;

        let column = table.column("Stock Total")?;
        let range = data_cell_range(PRODUCTS_SHEET, column, row);
        self.update_cell(&range, &stock_total.to_string()).await
    }
}

#[async_trait]
impl CustomerStore for SheetsStore {
    async fn list_customers(&self) -> Result<Vec<CustomerProfile>, StoreError> {
        let table = self.fetch_table(CUSTOMERS_SHEET).await?;
        rows::decode_customers(&table)
    }
}

#[async_trait]
impl ReservationStore for SheetsStore {
    async fn list_reservations(&self) -> Result<Vec<Reservation>, StoreError> {
        let table = self.fetch_table(RESERVATIONS_SHEET).await?;
        rows::decode_reservations(&table)
    }

    async fn append_reservation(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let table = self.fetch_table(RESERVATIONS_SHEET).await?;
        let row = rows::reservation_row(&table, reservation)?;
        self.append_row(RESERVATIONS_SHEET, row).await
    }

    async fn update_status(
        &self,
        reference: &str,
        status: &ReservationStatus,
    ) -> Result<(), StoreError> {
        let table = self.fetch_table(RESERVATIONS_SHEET).await?;
        let row = rows::find_reservation_row(&table, reference)?.ok_or_else(|| {
            StoreError::RowNotFound {
                sheet: RESERVATIONS_SHEET.to_string(),
                key: reference.to_string(),
            }
        })?;

        let column = table.column("Status")?;
        let range = data_cell_range(RESERVATIONS_SHEET, column, row);
        self.update_cell(&range, status.as_sheet_value()).await
    }
}

#[derive(Debug, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Option<Vec<Vec<Value>>>,
}

// Formatted reads come back as strings, but unformatted numeric cells are
// JSON numbers; both collapse to the string the codec expects.
fn coerce_cell(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = api_message(&body).unwrap_or(body);
    Err(StoreError::Api { status: status.as_u16(), message })
}

fn api_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("error")?.get("message")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::{api_message, coerce_cell, SheetsStore};

    #[test]
    fn value_urls_tolerate_trailing_slash_bases() {
        let store = SheetsStore::new(
            "https://sheets.example.com/v4/",
            "sheet-1",
            "token".to_string().into(),
            Duration::from_secs(5),
        )
        .expect("client should build");

        assert_eq!(
            store.values_url("Inventario"),
            "https://sheets.example.com/v4/spreadsheets/sheet-1/values/Inventario"
        );
        assert_eq!(
            store.values_url("Reservas!K3"),
            "https://sheets.example.com/v4/spreadsheets/sheet-1/values/Reservas!K3"
        );
    }

    #[test]
    fn cells_coerce_to_strings() {
        assert_eq!(coerce_cell(json!("Bota")), "Bota");
        assert_eq!(coerce_cell(json!(38)), "38");
        assert_eq!(coerce_cell(json!(99.5)), "99.5");
        assert_eq!(coerce_cell(json!(null)), "");
    }

    #[test]
    fn api_errors_prefer_the_service_message() {
        let body = json!({
            "error": { "code": 403, "message": "The caller does not have permission" }
        })
        .to_string();

        assert_eq!(api_message(&body).as_deref(), Some("The caller does not have permission"));
        assert_eq!(api_message("not json"), None);
    }
}
