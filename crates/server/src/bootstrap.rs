use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mostrador_agent::{
    AssistantClient, AssistantError, HttpAssistantClient, RunOrchestrator, SessionRegistry,
    ToolDispatcher,
};
use mostrador_channel::{
    ChannelHandler, ChannelRunner, NoopTransport, ReconnectPolicy, SenderAllowList,
};
use mostrador_core::config::{AppConfig, ConfigError, LoadOptions, StoreBackend};
use mostrador_core::domain::reply::ReplySegment;
use mostrador_engine::{CatalogIndex, CustomerDirectory, RandomReferenceSource, ReservationLedger};
use mostrador_store::{
    CustomerStore, InMemoryCustomerStore, InMemoryProductStore, InMemoryReservationStore,
    ProductStore, ReservationStore, SheetsStore, StoreError,
};
use thiserror::Error;
use tracing::info;

/// The row store config carries no timeout knob of its own; every sheet call
/// shares this bound.
const STORE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fully wired application, ready for the HTTP listener and the channel
/// runner to take over.
pub struct Application {
    pub config: AppConfig,
    pub orchestrator: Arc<RunOrchestrator>,
    pub assistant: Arc<dyn AssistantClient>,
    pub customers: Arc<dyn CustomerStore>,
    pub sessions: Arc<SessionRegistry>,
    pub channel_runner: Option<ChannelRunner>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("row store client failed to start: {0}")]
    Store(#[from] StoreError),
    #[error("completion client failed to start: {0}")]
    Assistant(#[from] AssistantError),
    #[error("configuration is missing `{key}`")]
    MissingSetting { key: &'static str },
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        backend = ?config.store.backend,
        "starting application bootstrap"
    );

    let (products, customers, reservations) = build_stores(&config)?;

    let catalog = CatalogIndex::new(products.clone(), config.server.public_base_url.as_str());
    let directory = CustomerDirectory::new(customers.clone());
    let ledger = Arc::new(ReservationLedger::new(
        catalog.clone(),
        directory.clone(),
        products,
        reservations,
        Arc::new(RandomReferenceSource),
    ));

    let api_key = config
        .assistant
        .api_key
        .clone()
        .ok_or(BootstrapError::MissingSetting { key: "assistant.api_key" })?;
    let assistant_id = config
        .assistant
        .assistant_id
        .clone()
        .ok_or(BootstrapError::MissingSetting { key: "assistant.assistant_id" })?;
    let assistant: Arc<dyn AssistantClient> = Arc::new(HttpAssistantClient::new(
        &config.assistant.base_url,
        api_key,
        assistant_id,
        Duration::from_secs(config.assistant.request_timeout_secs),
    )?);
    info!(
        event_name = "system.bootstrap.assistant_ready",
        base_url = %config.assistant.base_url,
        "completion client configured"
    );

    let sessions = Arc::new(SessionRegistry::new());
    let orchestrator = Arc::new(RunOrchestrator::new(
        assistant.clone(),
        ToolDispatcher::new(catalog, ledger),
        directory,
        sessions.clone(),
        Duration::from_millis(config.assistant.poll_interval_ms),
        Duration::from_secs(config.assistant.run_timeout_secs),
    ));

    let channel_runner = config.channel.enabled.then(|| {
        ChannelRunner::new(
            Arc::new(NoopTransport),
            Arc::new(OrchestratorHandler { orchestrator: orchestrator.clone() }),
            SenderAllowList::new(config.channel.allowed_senders.iter().cloned()),
            config.channel.country_prefix.clone(),
            ReconnectPolicy::default(),
        )
    });

    info!(
        event_name = "system.bootstrap.ready",
        channel_enabled = config.channel.enabled,
        "application bootstrap complete"
    );

    Ok(Application { config, orchestrator, assistant, customers, sessions, channel_runner })
}

fn build_stores(
    config: &AppConfig,
) -> Result<
    (Arc<dyn ProductStore>, Arc<dyn CustomerStore>, Arc<dyn ReservationStore>),
    BootstrapError,
> {
    match config.store.backend {
        StoreBackend::Sheets => {
            let spreadsheet_id = config
                .store
                .spreadsheet_id
                .clone()
                .ok_or(BootstrapError::MissingSetting { key: "store.spreadsheet_id" })?;
            let api_token = config
                .store
                .api_token
                .clone()
                .ok_or(BootstrapError::MissingSetting { key: "store.api_token" })?;
            // One client serves all three sheets; the traits share its pool.
            let sheets = Arc::new(SheetsStore::new(
                config.store.base_url.as_str(),
                spreadsheet_id,
                api_token,
                STORE_REQUEST_TIMEOUT,
            )?);
            Ok((sheets.clone(), sheets.clone(), sheets))
        }
        StoreBackend::Memory => Ok((
            Arc::new(InMemoryProductStore::default()),
            Arc::new(InMemoryCustomerStore::default()),
            Arc::new(InMemoryReservationStore::default()),
        )),
    }
}

/// Bridges channel traffic into the orchestrator. The runner only sees reply
/// segments; session bookkeeping stays behind the orchestrator.
struct OrchestratorHandler {
    orchestrator: Arc<RunOrchestrator>,
}

#[async_trait]
impl ChannelHandler for OrchestratorHandler {
    async fn handle(&self, identity: &str, text: &str) -> anyhow::Result<Vec<ReplySegment>> {
        let reply = self.orchestrator.handle_message(identity, text).await?;
        Ok(reply.segments)
    }
}

#[cfg(test)]
mod tests {
    use mostrador_core::config::{AppConfig, ConfigOverrides, LoadOptions, StoreBackend};

    use crate::bootstrap::{bootstrap, bootstrap_with_config, BootstrapError};

    #[tokio::test]
    async fn bootstrap_fails_fast_without_an_assistant_api_key() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                store_backend: Some(StoreBackend::Memory),
                assistant_id: Some("asst_test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("assistant.api_key"));
    }

    #[tokio::test]
    async fn bootstrap_wires_the_memory_backend_end_to_end() {
        let app = bootstrap(valid_overrides())
            .await
            .expect("bootstrap should succeed with valid overrides");

        assert!(app.channel_runner.is_none(), "channel is disabled by default");
        assert!(app.sessions.is_empty().await, "no sessions exist before traffic");
        assert!(app.customers.list_customers().await.expect("memory store lists").is_empty());
    }

    #[tokio::test]
    async fn bootstrap_builds_a_channel_runner_when_enabled() {
        let mut config = AppConfig::default();
        config.store.backend = StoreBackend::Memory;
        config.assistant.api_key = Some("sk-test".to_string().into());
        config.assistant.assistant_id = Some("asst_test".to_string());
        config.channel.enabled = true;
        config.channel.allowed_senders = vec!["1144445555".to_string()];

        let app = bootstrap_with_config(config)
            .await
            .expect("bootstrap should succeed with the channel enabled");

        assert!(app.channel_runner.is_some());
    }

    #[tokio::test]
    async fn unvalidated_configs_still_surface_missing_settings() {
        let mut config = AppConfig::default();
        config.store.backend = StoreBackend::Memory;
        config.assistant.api_key = Some("sk-test".to_string().into());

        let result = bootstrap_with_config(config).await;

        match result {
            Err(BootstrapError::MissingSetting { key }) => {
                assert_eq!(key, "assistant.assistant_id");
            }
            other => panic!("expected MissingSetting, got {:?}", other.map(|_| "application")),
        }
    }

    fn valid_overrides() -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                store_backend: Some(StoreBackend::Memory),
                assistant_api_key: Some("sk-test".to_string()),
                assistant_id: Some("asst_test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }
}
