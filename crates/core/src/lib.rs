pub mod action;
pub mod audit;
pub mod authorize;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod identity;

pub use action::{ActionRequest, ExecutionBackend, ForwardResult};
pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use authorize::{authorize, AuthzRejection};
pub use catalog::{default_catalog, CatalogError, CommandCatalog, CommandSpec};
pub use errors::{RouterError, UpstreamError};
pub use identity::CallerIdentity;
