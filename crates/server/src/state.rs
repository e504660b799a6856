use std::sync::Arc;

use secrecy::SecretString;

use opsgate_agent::PromptInterpreter;
use opsgate_core::audit::{AuditEvent, AuditSink};
use opsgate_core::{CommandCatalog, ExecutionBackend};

use crate::payments::PaymentGateway;
use crate::storage::ObjectStore;

/// Everything a handler needs, injected rather than ambient so tests can
/// substitute alternate catalogs and scripted collaborators.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CommandCatalog>,
    pub interpreter: Arc<PromptInterpreter>,
    pub backend: Arc<dyn ExecutionBackend>,
    pub payments: Arc<dyn PaymentGateway>,
    pub store: Arc<dyn ObjectStore>,
    pub audit: Arc<dyn AuditSink>,
    pub webhook_secret: SecretString,
    pub webhook_tolerance_secs: u64,
}

/// Audit sink that writes structured tracing events, so router decisions land
/// in the operational log stream alongside request logs.
#[derive(Clone, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        tracing::info!(
            event_name = %event.event_type,
            correlation_id = %event.correlation_id,
            category = ?event.category,
            actor = %event.actor,
            action = event.action.as_deref().unwrap_or("unknown"),
            outcome = ?event.outcome,
            "router decision"
        );
    }
}
