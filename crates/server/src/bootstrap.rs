use std::sync::Arc;

use anyhow::{Context, Result};

use opsgate_agent::{HttpLlmClient, PromptInterpreter};
use opsgate_core::config::AppConfig;
use opsgate_core::{default_catalog, CommandCatalog};

use crate::forward::HttpExecutionBackend;
use crate::payments::StripeGateway;
use crate::state::{AppState, TracingAuditSink};
use crate::storage::HttpObjectStore;

pub struct App {
    pub config: AppConfig,
    pub state: AppState,
}

fn load_catalog(config: &AppConfig) -> Result<CommandCatalog> {
    match &config.catalog_path {
        Some(path) => {
            let document = std::fs::read_to_string(path)
                .with_context(|| format!("could not read catalog file {}", path.display()))?;
            CommandCatalog::from_toml_str(&document)
                .with_context(|| format!("invalid catalog file {}", path.display()))
        }
        None => Ok(default_catalog()),
    }
}

/// Wire the real collaborators from configuration. Tests build an `AppState`
/// directly with scripted doubles instead.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<App> {
    let http = reqwest::Client::builder().build().context("could not build http client")?;

    let catalog = Arc::new(load_catalog(&config)?);
    let llm = Arc::new(HttpLlmClient::new(http.clone(), &config.llm));
    let interpreter = Arc::new(PromptInterpreter::new(llm, config.llm.max_prompt_bytes));
    let backend = Arc::new(HttpExecutionBackend::new(http.clone(), &config.backend));
    let payments = Arc::new(StripeGateway::new(http.clone(), &config.payments));
    let store = Arc::new(HttpObjectStore::new(http, &config.storage));

    tracing::info!(
        event_name = "system.bootstrap.completed",
        correlation_id = "bootstrap",
        catalog_commands = catalog.len(),
        "opsgate collaborators wired"
    );

    let state = AppState {
        catalog,
        interpreter,
        backend,
        payments,
        store,
        audit: Arc::new(TracingAuditSink),
        webhook_secret: config.payments.webhook_secret.clone(),
        webhook_tolerance_secs: config.payments.webhook_tolerance_secs,
    };

    Ok(App { config, state })
}
