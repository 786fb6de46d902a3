use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use mostrador_store::CustomerStore;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    customers: Arc<dyn CustomerStore>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub store: HealthCheck,
    pub checked_at: String,
}

pub fn router(customers: Arc<dyn CustomerStore>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { customers })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let store = store_check(state.customers.as_ref()).await;
    let ready = store.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "mostrador-server runtime initialized".to_string(),
        },
        store,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

/// Probes the customer sheet. It is the cheapest of the three sheets and a
/// read there exercises the same credentials and transport as the rest.
async fn store_check(customers: &dyn CustomerStore) -> HealthCheck {
    match customers.list_customers().await {
        Ok(_) => {
            HealthCheck { status: "ready", detail: "customer sheet read succeeded".to_string() }
        }
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("customer sheet read failed: {error}"),
        },
    }
}
