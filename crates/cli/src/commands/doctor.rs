use std::time::Duration;

use mostrador_core::config::{AppConfig, LoadOptions, StoreBackend};
use mostrador_store::{CustomerStore, SheetsStore};
use serde::Serialize;

use crate::commands::CommandResult;

const SHEETS_PROBE_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_assistant_credentials(&config));
            checks.push(check_store_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "assistant_credentials",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "store_connectivity",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_assistant_credentials(config: &AppConfig) -> DoctorCheck {
    let key_set = config.assistant.api_key.is_some();
    let id_set = config.assistant.assistant_id.is_some();

    if key_set && id_set {
        DoctorCheck {
            name: "assistant_credentials",
            status: CheckStatus::Pass,
            details: "api key and assistant id are configured".to_string(),
        }
    } else {
        DoctorCheck {
            name: "assistant_credentials",
            status: CheckStatus::Fail,
            details: format!("api key set: {key_set}, assistant id set: {id_set}"),
        }
    }
}

fn check_store_connectivity(config: &AppConfig) -> DoctorCheck {
    if config.store.backend == StoreBackend::Memory {
        return DoctorCheck {
            name: "store_connectivity",
            status: CheckStatus::Pass,
            details: "memory backend needs no connectivity".to_string(),
        };
    }

    let (Some(spreadsheet_id), Some(api_token)) =
        (config.store.spreadsheet_id.clone(), config.store.api_token.clone())
    else {
        return DoctorCheck {
            name: "store_connectivity",
            status: CheckStatus::Fail,
            details: "sheets backend is missing spreadsheet id or api token".to_string(),
        };
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "store_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let base_url = config.store.base_url.clone();
    let result = runtime.block_on(async move {
        let store = SheetsStore::new(
            base_url,
            spreadsheet_id,
            api_token,
            Duration::from_secs(SHEETS_PROBE_TIMEOUT_SECS),
        )
        .map_err(|error| format!("failed to build the sheets client: {error}"))?;

        store
            .list_customers()
            .await
            .map_err(|error| format!("failed to read the customer sheet: {error}"))?;

        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "store_connectivity",
            status: CheckStatus::Pass,
            details: format!("customer sheet read using `{}`", config.store.base_url),
        },
        Err(error) => {
            DoctorCheck { name: "store_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
