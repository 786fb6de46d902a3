//! Tool-call parsing and execution.
//!
//! The completion service requests tools by name with a raw JSON argument
//! string; this module parses those into a closed [`ToolInvocation`] set and
//! runs them against the catalog and the reservation ledger. Engine failures
//! become `success:false` payloads the model can phrase for the customer.
//! Only an unknown tool name or unusable arguments abort the exchange.

use std::sync::Arc;

use chrono::SecondsFormat;
use futures::future::join_all;
use mostrador_core::domain::customer::{CustomerProfile, CustomerTier};
use mostrador_core::domain::product::ProductView;
use mostrador_core::domain::reservation::Reservation;
use mostrador_engine::{CatalogIndex, ReservationError, ReservationLedger, StockFilter};
use mostrador_store::StoreError;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::assistant::{ToolCallRequest, ToolOutput};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("completion service requested unknown tool {name:?}")]
    UnsupportedTool { name: String },

    #[error("unusable arguments for {tool}: {reason}")]
    InvalidArguments { tool: &'static str, reason: String },
}

/// Who the tools run on behalf of. The profile is whatever the session
/// resolved at creation time; `None` prices at the retail tier.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub phone: String,
    pub profile: Option<CustomerProfile>,
}

impl ToolContext {
    fn tier(&self) -> CustomerTier {
        self.profile.as_ref().map(|profile| profile.tier).unwrap_or_default()
    }

    fn client_type(&self) -> Option<&str> {
        self.profile.as_ref().map(|profile| profile.tier_label.as_str())
    }
}

/// A tool call after validation, ready to execute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolInvocation {
    CheckStock { product: String, size: Option<String> },
    CheckPrice { product: String, size: Option<String> },
    MakeReservation { product: String, size: Option<String>, quantity: u32 },
    Msearch { query: String, size: Option<String> },
    CancelReservation { reference: String },
}

impl ToolInvocation {
    pub fn parse(name: &str, arguments: &str) -> Result<Self, DispatchError> {
        match name {
            "check_stock" => {
                let args = parse_arguments("check_stock", arguments)?;
                Ok(Self::CheckStock {
                    product: required_str(&args, "check_stock", "product")?,
                    size: optional_str(&args, "size"),
                })
            }
            "check_price" => {
                let args = parse_arguments("check_price", arguments)?;
                Ok(Self::CheckPrice {
                    product: required_str(&args, "check_price", "product")?,
                    size: optional_str(&args, "size"),
                })
            }
            "make_reservation" => {
                let args = parse_arguments("make_reservation", arguments)?;
                Ok(Self::MakeReservation {
                    product: required_str(&args, "make_reservation", "product")?,
                    size: optional_str(&args, "size"),
                    quantity: required_quantity(&args, "make_reservation")?,
                })
            }
            "msearch" => {
                let args = parse_arguments("msearch", arguments)?;
                Ok(Self::Msearch {
                    query: required_str(&args, "msearch", "query")?,
                    size: optional_str(&args, "size"),
                })
            }
            "cancel_reservation" => {
                let args = parse_arguments("cancel_reservation", arguments)?;
                Ok(Self::CancelReservation {
                    reference: required_str(&args, "cancel_reservation", "reference")?,
                })
            }
            other => Err(DispatchError::UnsupportedTool { name: other.to_string() }),
        }
    }
}

pub struct ToolDispatcher {
    catalog: CatalogIndex,
    ledger: Arc<ReservationLedger>,
}

impl ToolDispatcher {
    pub fn new(catalog: CatalogIndex, ledger: Arc<ReservationLedger>) -> Self {
        Self { catalog, ledger }
    }

    /// Runs one tool call to completion. The returned value is the tool
    /// output payload, including `success:false` payloads for engine
    /// failures.
    pub async fn dispatch(
        &self,
        context: &ToolContext,
        call: &ToolCallRequest,
    ) -> Result<Value, DispatchError> {
        let invocation = ToolInvocation::parse(&call.name, &call.arguments)?;
        debug!(event_name = "run.tool_dispatched", call_id = %call.id, tool = %call.name);
        Ok(self.execute(context, invocation).await)
    }

    /// Runs a whole `requires_action` batch concurrently and pairs each
    /// output with its call id, in call order.
    pub async fn dispatch_batch(
        &self,
        context: &ToolContext,
        calls: &[ToolCallRequest],
    ) -> Result<Vec<ToolOutput>, DispatchError> {
        let results = join_all(calls.iter().map(|call| self.dispatch(context, call))).await;

        calls
            .iter()
            .zip(results)
            .map(|(call, result)| {
                result.map(|value| ToolOutput {
                    tool_call_id: call.id.clone(),
                    output: value.to_string(),
                })
            })
            .collect()
    }

    pub async fn execute(&self, context: &ToolContext, invocation: ToolInvocation) -> Value {
        match invocation {
            ToolInvocation::CheckStock { product, size } => {
                self.check_stock(context, &product, size.as_deref()).await
            }
            ToolInvocation::CheckPrice { product, size } => {
                self.check_price(context, &product, size.as_deref()).await
            }
            ToolInvocation::MakeReservation { product, size, quantity } => {
                self.make_reservation(context, &product, size.as_deref(), quantity).await
            }
            ToolInvocation::Msearch { query, size } => {
                self.msearch(context, &query, size.as_deref()).await
            }
            ToolInvocation::CancelReservation { reference } => {
                self.cancel_reservation(context, &reference).await
            }
        }
    }

    async fn check_stock(&self, context: &ToolContext, product: &str, size: Option<&str>) -> Value {
        match self.catalog.search(product, size, StockFilter::IncludeOutOfStock).await {
            Ok(products) if products.is_empty() => Value::Null,
            Ok(products) => Value::Array(
                products
                    .iter()
                    .map(|product| stock_payload(&self.catalog.view(product, context.tier())))
                    .collect(),
            ),
            Err(error) => catalog_error_payload(&error),
        }
    }

    async fn check_price(&self, context: &ToolContext, product: &str, size: Option<&str>) -> Value {
        match self.catalog.search(product, size, StockFilter::IncludeOutOfStock).await {
            Ok(products) if products.is_empty() => Value::Null,
            Ok(products) => Value::Array(
                products
                    .iter()
                    .map(|product| {
                        price_payload(
                            &self.catalog.view(product, context.tier()),
                            context.client_type(),
                        )
                    })
                    .collect(),
            ),
            Err(error) => catalog_error_payload(&error),
        }
    }

    async fn msearch(&self, context: &ToolContext, query: &str, size: Option<&str>) -> Value {
        match self.catalog.search(query, size, StockFilter::InStockOnly).await {
            Ok(products) => Value::Array(
                products
                    .iter()
                    .map(|product| listing_payload(&self.catalog.view(product, context.tier())))
                    .collect(),
            ),
            Err(error) => catalog_error_payload(&error),
        }
    }

    async fn make_reservation(
        &self,
        context: &ToolContext,
        product: &str,
        size: Option<&str>,
        quantity: u32,
    ) -> Value {
        match self.ledger.reserve(&context.phone, product, size, quantity).await {
            Ok(reservation) => json!({
                "success": true,
                "reference": reservation.reference,
                "reservationDetails": reservation_details(&reservation),
            }),
            Err(ReservationError::ProductNotFound) => {
                json!({ "success": false, "message": "Producto no encontrado" })
            }
            Err(ReservationError::Ambiguous { candidates }) => json!({
                "success": false,
                "message": "Múltiples productos encontrados",
                "products": candidates,
                "requiresSpecification": true,
            }),
            Err(ReservationError::InsufficientStock { .. }) => {
                json!({ "success": false, "message": "No hay suficiente stock disponible" })
            }
            Err(ReservationError::CustomerNotFound) => {
                json!({ "success": false, "message": "Usuario no encontrado" })
            }
            Err(error) => json!({
                "success": false,
                "message": "Error al procesar la reserva",
                "error": error.to_string(),
            }),
        }
    }

    async fn cancel_reservation(&self, context: &ToolContext, reference: &str) -> Value {
        match self.ledger.cancel(&context.phone, reference).await {
            Ok(reservation) => json!({
                "success": true,
                "message": "Reserva cancelada exitosamente",
                "details": {
                    "reference": reservation.reference,
                    "product": reservation.product_name,
                    "size": reservation.size,
                    "quantity": reservation.quantity,
                    "status": reservation.status.as_sheet_value(),
                },
            }),
            Err(ReservationError::ReservationNotFound) => json!({
                "success": false,
                "message": "Reserva no encontrada o no pertenece a este usuario",
            }),
            Err(ReservationError::InvalidState { status }) => json!({
                "success": false,
                "message": format!(
                    "La reserva no puede ser cancelada porque su estado es: {status}"
                ),
            }),
            Err(error) => json!({
                "success": false,
                "message": "Error al cancelar la reserva",
                "error": error.to_string(),
            }),
        }
    }
}

/// The function schema advertised to the completion service on every run.
/// Wire-format contract: names, descriptions and required lists must stay
/// stable or deployed assistant prompts stop matching.
pub fn tool_schema() -> Value {
    json!([
        {
            "type": "function",
            "function": {
                "name": "check_stock",
                "description": "Consulta el stock disponible de un producto",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "product": {
                            "type": "string",
                            "description": "Nombre del producto"
                        },
                        "size": {
                            "type": "string",
                            "description": "Medida o código del producto"
                        }
                    },
                    "required": ["product", "size"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "check_price",
                "description": "Consulta el precio de un producto",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "product": {
                            "type": "string",
                            "description": "Nombre del producto"
                        },
                        "size": {
                            "type": "string",
                            "description": "Medida o código del producto"
                        }
                    },
                    "required": ["product", "size"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "make_reservation",
                "description": "Realiza una reserva de producto",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "product": {
                            "type": "string",
                            "description": "Nombre del producto"
                        },
                        "size": {
                            "type": "string",
                            "description": "Medida o código del producto"
                        },
                        "quantity": {
                            "type": "number",
                            "description": "Cantidad a reservar"
                        }
                    },
                    "required": ["product", "size", "quantity"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "msearch",
                "description": "Busca productos por nombre o medida",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Término de búsqueda"
                        },
                        "size": {
                            "type": "string",
                            "description": "Medida o código del producto (opcional)"
                        }
                    },
                    "required": ["query"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "cancel_reservation",
                "description": "Cancela una reserva existente y devuelve el stock",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "reference": {
                            "type": "string",
                            "description": "Código de referencia de la reserva (formato: RES-YYYYMMDD-XXXX)"
                        }
                    },
                    "required": ["reference"]
                }
            }
        }
    ])
}

fn stock_payload(view: &ProductView) -> Value {
    json!({
        "product": view.name,
        "brand": view.brand,
        "size": view.size,
        "stock": {
            "total": view.stock_total,
            "warehouse": view.stock_warehouse.as_deref().unwrap_or("No especificado"),
            "store": view.stock_store.as_deref().unwrap_or("No especificado"),
        },
        "imageUrl": view.image_url,
    })
}

fn price_payload(view: &ProductView, client_type: Option<&str>) -> Value {
    let mut item = json!({
        "product": view.name,
        "brand": view.brand,
        "size": view.size,
        "price": view.price,
        "stock": view.stock_total,
        "imageUrl": view.image_url,
    });
    // Anonymous customers get no clientType key at all, matching how an
    // absent tier serialized before.
    if let Some(client_type) = client_type {
        item["clientType"] = Value::String(client_type.to_string());
    }
    item
}

fn listing_payload(view: &ProductView) -> Value {
    json!({
        "id": view.id,
        "product": view.name,
        "brand": view.brand,
        "type": view.product_type,
        "size": view.size,
        "stock": view.stock_total,
        "price": view.price,
        "description": view.description,
        "warehouse": view.stock_warehouse,
        "store": view.stock_store,
        "imageUrl": view.image_url,
    })
}

fn reservation_details(reservation: &Reservation) -> Value {
    json!({
        "Fecha": reservation.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        "Cliente": reservation.customer_name,
        "Telefono": reservation.phone,
        "Email": reservation.email,
        "CUIT": reservation.tax_id,
        "Precio": reservation.total_price,
        "Reference": reservation.reference,
        "Producto": reservation.product_name,
        "Medidas": reservation.size,
        "Cantidad": reservation.quantity,
        "Status": reservation.status.as_sheet_value(),
        "message": format!(
            "Reserva creada exitosamente. Tu código de referencia es: {}",
            reservation.reference
        ),
    })
}

fn catalog_error_payload(error: &StoreError) -> Value {
    json!({
        "success": false,
        "message": "Error al consultar el inventario",
        "error": error.to_string(),
    })
}

fn parse_arguments(tool: &'static str, raw: &str) -> Result<Value, DispatchError> {
    serde_json::from_str(raw).map_err(|error| DispatchError::InvalidArguments {
        tool,
        reason: format!("arguments are not valid JSON: {error}"),
    })
}

fn required_str(
    args: &Value,
    tool: &'static str,
    field: &'static str,
) -> Result<String, DispatchError> {
    match args.get(field).and_then(Value::as_str).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(DispatchError::InvalidArguments {
            tool,
            reason: format!("missing required field {field:?}"),
        }),
    }
}

fn optional_str(args: &Value, field: &str) -> Option<String> {
    args.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn required_quantity(args: &Value, tool: &'static str) -> Result<u32, DispatchError> {
    let quantity = args.get("quantity").and_then(coerce_quantity);
    match quantity {
        Some(quantity) if quantity >= 1 => u32::try_from(quantity).map_err(|_| {
            DispatchError::InvalidArguments {
                tool,
                reason: "\"quantity\" is out of range".to_string(),
            }
        }),
        _ => Err(DispatchError::InvalidArguments {
            tool,
            reason: "\"quantity\" must be a positive integer".to_string(),
        }),
    }
}

// Models write quantities as integers, floats with a zero fraction, or
// quoted digits; all of them mean the same count.
fn coerce_quantity(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0 && *float >= 0.0)
                .map(|float| float as u64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
